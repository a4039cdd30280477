//! # Store Module
//!
//! Holds the bundles of one query.
//!
//! - `load` replaces the working set, it never merges
//! - No validation: a bundle missing `events` or `weight` is kept as-is
//! - No deduplication: identical bundles are kept twice

use crate::Bundle;

/// The working set of bundles for one query.
///
/// Bundles are addressed by their position, which is stable until the next
/// `load`.
#[derive(Debug, Clone, Default)]
pub struct BundleStore {
    bundles: Vec<Bundle>,
}

impl BundleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given bundles.
    #[must_use]
    pub fn from_bundles(bundles: impl IntoIterator<Item = Bundle>) -> Self {
        Self {
            bundles: bundles.into_iter().collect(),
        }
    }

    /// Replace the working set.
    ///
    /// Returns the number of bundles now held.
    pub fn load(&mut self, bundles: impl IntoIterator<Item = Bundle>) -> usize {
        self.bundles.clear();
        self.bundles.extend(bundles);
        self.bundles.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Get a bundle by position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Bundle> {
        self.bundles.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Bundle] {
        &self.bundles
    }

    /// Sum of all weights, missing weights counting as zero.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.bundles.iter().map(Bundle::weight_or_zero).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================

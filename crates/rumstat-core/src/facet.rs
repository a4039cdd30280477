//! # Facet Module
//!
//! Grouping dimensions: a facet maps a bundle to zero, one or many keys.
//!
//! Any closure `Fn(&Bundle) -> I` where `I` iterates items convertible into
//! [`FacetKey`] is a facet, so `Option<String>`, `Vec<String>` and
//! `Vec<FacetKey>` returning closures all work. Keys must be owned.

use crate::registry::Registry;
use crate::{Bundle, FacetKey};

/// A named grouping dimension.
pub trait Facet {
    /// Keys this bundle contributes to. Duplicates are allowed; the engine
    /// counts each distinct key once per bundle.
    fn keys(&self, bundle: &Bundle) -> Vec<FacetKey>;
}

impl<F, I> Facet for F
where
    F: Fn(&Bundle) -> I,
    I: IntoIterator,
    I::Item: Into<FacetKey>,
{
    fn keys(&self, bundle: &Bundle) -> Vec<FacetKey> {
        self(bundle).into_iter().map(Into::into).collect()
    }
}

/// Facet extractors registered on one engine.
pub type FacetRegistry = Registry<dyn Facet>;

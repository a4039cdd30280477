//! # Series Module
//!
//! Numeric measurements: a series maps a bundle to a number, or to `None`
//! when the bundle does not contribute.
//!
//! Any closure `Fn(&Bundle) -> Option<f64>` is a series.

use crate::Bundle;
use crate::registry::Registry;

/// A named numeric measurement.
pub trait Series {
    /// Value this bundle contributes, `None` for no contribution.
    fn value(&self, bundle: &Bundle) -> Option<f64>;
}

impl<F> Series for F
where
    F: Fn(&Bundle) -> Option<f64>,
{
    fn value(&self, bundle: &Bundle) -> Option<f64> {
        self(bundle)
    }
}

/// Series extractors registered on one engine.
pub type SeriesRegistry = Registry<dyn Series>;

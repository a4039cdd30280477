//! # rumstat-core
//!
//! The aggregation engine for real-user-monitoring bundles - THE LOGIC.
//!
//! A bundle is one weighted page-view sample with its event trace. This
//! crate groups bundles by named facets, folds named numeric series into
//! `{sum, count, min, max}` aggregates per facet value, and scores A/B
//! results with Welch's t-test.
//!
//! ## Layout
//!
//! - `types` → bundles, keys, aggregates, errors
//! - `store`, `registry`, `facet`, `series`, `cruncher` → the engine
//! - `confidence` → significance scoring, independent of the engine
//! - `builtin`, `reports`, `query` → consumers built on the engine
//!
//! ## Constraints
//!
//! - Pure in-memory computation: no async, no I/O, no network
//! - One engine per query; engines are never shared between queries
//! - Extractors are trusted code: their panics are not caught

// =============================================================================
// MODULES
// =============================================================================

pub mod builtin;
pub mod confidence;
pub mod cruncher;
pub mod facet;
pub mod primitives;
pub mod query;
pub mod registry;
pub mod reports;
pub mod series;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Aggregate, Bundle, BundleTime, Event, FacetKey, FacetValue, KEY_ESCAPE, KEY_SEPARATOR,
    RumError,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use cruncher::Cruncher;
pub use facet::{Facet, FacetRegistry};
pub use registry::Registry;
pub use series::{Series, SeriesRegistry};
pub use store::BundleStore;

// =============================================================================
// RE-EXPORTS: Statistics and Reports
// =============================================================================

pub use confidence::{
    SIGNIFICANCE_THRESHOLD, WelchTest, calculate_confidence, is_significant, welch_t_test,
};
pub use query::{FacetQuery, FacetResult, Report, ReportKind, ReportOptions, run_facets, run_report};

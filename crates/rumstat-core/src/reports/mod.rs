//! # Reports Module
//!
//! Domain reports built on the aggregation engine. Each handler owns one
//! [`Cruncher`](crate::Cruncher), registers its facets and series, loads the
//! bundles, and reshapes the computed facets into a serializable report.
//!
//! - `experiment` - per-variant views, interactions and confidence
//! - `rageclick` - pages where visitors click one element repeatedly
//! - `url_groups` - web-vitals percentiles per URL pattern and device

pub mod experiment;
pub mod rageclick;
pub mod url_groups;

pub use experiment::{ExperimentInsight, ExperimentOptions, ExperimentReport, VariantInsight};
pub use rageclick::{RageClickMetric, RageClickOptions, RageClickPage};
pub use url_groups::{CwvMetrics, DeviceMetrics, UrlGroupRow, UrlPattern};

use std::cmp::Ordering;

/// Normalize a free-text name the way block class names are written:
/// lowercase, runs of non-alphanumerics collapsed to `-`, no leading or
/// trailing `-`.
#[must_use]
pub fn to_class_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Descending by weight, ties broken by label ascending.
pub(crate) fn by_weight_desc(a: (f64, &str), b: (f64, &str)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

//! # Built-in Extractors
//!
//! Named facets and series that callers can register without writing
//! closures, used by the CLI and the HTTP `facets` endpoint.

use crate::facet::Facet;
use crate::primitives::{
    CLICK_CHECKPOINT, CWV_METRICS, CWV_PREFIX, ENTER_CHECKPOINT, METRIC_CHECKPOINTS,
};
use crate::series::Series;
use crate::{Bundle, Cruncher, RumError};
use std::collections::BTreeSet;

/// Names accepted by [`facet_by_name`].
pub const FACET_NAMES: [&str; 5] = ["url", "checkpoint", "deviceType", "source", "target"];

/// Names accepted by [`series_by_name`].
pub const SERIES_NAMES: [&str; 9] = [
    "pageViews",
    "clicks",
    "enters",
    "conversions",
    "events",
    "lcp",
    "cls",
    "inp",
    "ttfb",
];

/// Look up a built-in facet.
#[must_use]
pub fn facet_by_name(name: &str) -> Option<Box<dyn Facet>> {
    let facet: Box<dyn Facet> = match name {
        "url" => Box::new(|b: &Bundle| (!b.url.is_empty()).then(|| b.url.clone())),
        "checkpoint" => Box::new(|b: &Bundle| {
            b.events
                .iter()
                .filter(|e| !e.checkpoint.is_empty())
                .map(|e| e.checkpoint.clone())
                .collect::<BTreeSet<_>>()
        }),
        "deviceType" => Box::new(|b: &Bundle| b.device_type().map(str::to_string)),
        "source" => Box::new(|b: &Bundle| {
            b.events
                .iter()
                .filter_map(|e| e.source.clone())
                .collect::<BTreeSet<_>>()
        }),
        "target" => Box::new(|b: &Bundle| {
            b.events
                .iter()
                .filter_map(|e| e.target.clone())
                .collect::<BTreeSet<_>>()
        }),
        _ => return None,
    };
    Some(facet)
}

/// Look up a built-in series.
#[must_use]
pub fn series_by_name(name: &str) -> Option<Box<dyn Series>> {
    let series: Box<dyn Series> = match name {
        "pageViews" => Box::new(|b: &Bundle| b.weight),
        "clicks" => Box::new(|b: &Bundle| weight_if(b, |b| b.has_checkpoint(CLICK_CHECKPOINT))),
        "enters" => Box::new(|b: &Bundle| weight_if(b, |b| b.has_checkpoint(ENTER_CHECKPOINT))),
        "conversions" => Box::new(|b: &Bundle| {
            weight_if(b, |b| {
                METRIC_CHECKPOINTS
                    .iter()
                    .filter(|c| **c != CLICK_CHECKPOINT)
                    .any(|c| b.has_checkpoint(c))
            })
        }),
        "events" => Box::new(|b: &Bundle| Some(b.events.len() as f64)),
        metric if CWV_METRICS.contains(&metric) => {
            let checkpoint = format!("{CWV_PREFIX}{metric}");
            Box::new(move |b: &Bundle| cwv_value(b, &checkpoint))
        }
        _ => return None,
    };
    Some(series)
}

fn weight_if(bundle: &Bundle, predicate: impl Fn(&Bundle) -> bool) -> Option<f64> {
    predicate(bundle).then(|| bundle.weight_or_zero())
}

/// Value of the first event carrying `checkpoint` that has one.
#[must_use]
pub fn cwv_value(bundle: &Bundle, checkpoint: &str) -> Option<f64> {
    bundle.events_with(checkpoint).find_map(|e| e.value)
}

/// Register built-in facets and series on an engine by name.
///
/// Returns `RumError::InvalidInput` naming the first unknown name.
pub fn register<'a>(
    engine: &mut Cruncher,
    facets: impl IntoIterator<Item = &'a str>,
    series: impl IntoIterator<Item = &'a str>,
) -> Result<(), RumError> {
    for name in facets {
        let facet = facet_by_name(name)
            .ok_or_else(|| RumError::InvalidInput(format!("unknown facet '{name}'")))?;
        engine.add_facet_boxed(name, facet)?;
    }
    for name in series {
        let extractor = series_by_name(name)
            .ok_or_else(|| RumError::InvalidInput(format!("unknown series '{name}'")))?;
        engine.add_series_boxed(name, extractor)?;
    }
    Ok(())
}

// =============================================================================
// URL NORMALIZATION
// =============================================================================

/// Censor path segments that carry ids, hashes or encoded data, so that
/// `/product/123456` and `/product/987654` read as the same page.
///
/// Segment rules, first match wins:
/// - 5+ digits → `<number>`
/// - 8+ hex digits → `<hex>`
/// - more than 32 base64 characters → `<base64>`
/// - 24+ hex digits and dashes → `<uuid>`
/// - 60+ characters → `...`
///
/// Scheme, host, query and fragment are kept as they are.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let (head, rest) = match url.find("://") {
        Some(i) => {
            let authority_start = i + 3;
            match url[authority_start..].find('/') {
                Some(j) => url.split_at(authority_start + j),
                None => return url.to_string(),
            }
        }
        None => ("", url),
    };
    let path_end = rest.find(['?', '#']).unwrap_or(rest.len());
    let (path, tail) = rest.split_at(path_end);

    let path = path.split('/').map(censor_segment).collect::<Vec<_>>().join("/");
    format!("{head}{path}{tail}")
}

fn censor_segment(segment: &str) -> &str {
    let len = segment.len();
    let all = |accept: fn(char) -> bool| segment.chars().all(accept);

    if len >= 5 && all(|c| c.is_ascii_digit()) {
        "<number>"
    } else if len >= 8 && all(|c| c.is_ascii_hexdigit()) {
        "<hex>"
    } else if len > 32 && all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '=')) {
        "<base64>"
    } else if len >= 24 && all(|c| c.is_ascii_hexdigit() || c == '-') {
        "<uuid>"
    } else if len >= 60 {
        "..."
    } else {
        segment
    }
}

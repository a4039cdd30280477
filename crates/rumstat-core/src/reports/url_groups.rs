//! URL-group report.
//!
//! Buckets pages into named URL patterns and reports web-vitals percentiles
//! per pattern and device type, next to one row per measured URL.
//!
//! URLs pass through [`normalize_url`] first, so pattern matching and URL
//! rows both see pages with their ids and hashes censored.

use crate::builtin::{normalize_url, series_by_name};
use crate::primitives::{CWV_METRICS, CWV_PERCENTILE};
use crate::reports::by_weight_desc;
use crate::{Bundle, Cruncher, FacetKey, FacetValue, RumError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const URL_FACET: &str = "url";
const GROUP_FACET: &str = "patternDevice";
const UNKNOWN_DEVICE: &str = "unknown";

/// A named URL pattern. `*` matches any substring, everything else is
/// literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    pub name: String,
    pub pattern: String,
}

impl UrlPattern {
    /// Create a named pattern.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }

    /// Compile to an anchored regular expression.
    pub fn compile(&self) -> Result<Regex, RumError> {
        let body = self
            .pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^{body}$"))
            .map_err(|_| RumError::InvalidPattern(self.pattern.clone()))
    }
}

/// Web-vitals at the 75th percentile with their sample counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwvMetrics {
    pub lcp: Option<f64>,
    pub lcp_count: usize,
    pub cls: Option<f64>,
    pub cls_count: usize,
    pub inp: Option<f64>,
    pub inp_count: usize,
    pub ttfb: Option<f64>,
    pub ttfb_count: usize,
}

impl CwvMetrics {
    fn from_facet(value: &FacetValue) -> Self {
        let read = |metric: &str| {
            value.metric(metric).map_or((None, 0), |agg| {
                (agg.percentile(CWV_PERCENTILE), agg.count)
            })
        };
        let (lcp, lcp_count) = read("lcp");
        let (cls, cls_count) = read("cls");
        let (inp, inp_count) = read("inp");
        let (ttfb, ttfb_count) = read("ttfb");
        Self {
            lcp,
            lcp_count,
            cls,
            cls_count,
            inp,
            inp_count,
            ttfb,
            ttfb_count,
        }
    }

    /// Whether any metric was measured.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.lcp_count + self.cls_count + self.inp_count + self.ttfb_count > 0
    }
}

/// Web-vitals of one device class within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetrics {
    pub device_type: String,
    pub pageviews: f64,
    #[serde(flatten)]
    pub metrics: CwvMetrics,
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UrlGroupRow {
    Group {
        name: String,
        pattern: String,
        pageviews: f64,
        metrics: Vec<DeviceMetrics>,
    },
    Url {
        url: String,
        pageviews: f64,
        metrics: CwvMetrics,
    },
}

impl UrlGroupRow {
    #[must_use]
    pub fn pageviews(&self) -> f64 {
        match self {
            Self::Group { pageviews, .. } | Self::Url { pageviews, .. } => *pageviews,
        }
    }

    /// Group name or URL.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Group { name, .. } => name,
            Self::Url { url, .. } => url,
        }
    }
}

/// Build the URL-group report, busiest rows first.
///
/// Returns `RumError::InvalidPattern` when a pattern does not compile.
pub fn build(
    bundles: impl IntoIterator<Item = Bundle>,
    patterns: &[UrlPattern],
) -> Result<Vec<UrlGroupRow>, RumError> {
    let compiled = patterns
        .iter()
        .map(|p| Ok((p.pattern.clone(), p.compile()?)))
        .collect::<Result<Vec<(String, Regex)>, RumError>>()?;

    let mut engine = Cruncher::new();
    engine
        .add_facet(URL_FACET, |b: &Bundle| Some(b.url.clone()))?
        .add_facet(GROUP_FACET, move |b: &Bundle| {
            compiled
                .iter()
                .find(|(_, regex)| regex.is_match(&b.url))
                .map(|(pattern, _)| {
                    [
                        pattern.clone(),
                        b.device_type().unwrap_or(UNKNOWN_DEVICE).to_string(),
                    ]
                })
                .map(FacetKey::new)
        })?;
    for metric in CWV_METRICS {
        if let Some(series) = series_by_name(metric) {
            engine.add_series_boxed(metric, series)?.retain_values(metric)?;
        }
    }
    engine.load(bundles.into_iter().map(|mut bundle| {
        bundle.url = normalize_url(&bundle.url);
        bundle
    }));

    let mut groups: BTreeMap<&str, (f64, Vec<DeviceMetrics>)> = BTreeMap::new();
    for value in engine.facet(GROUP_FACET) {
        let [pattern, device] = value.value.parts() else {
            continue;
        };
        let group = groups.entry(pattern.as_str()).or_default();
        group.0 += value.weight;
        group.1.push(DeviceMetrics {
            device_type: device.clone(),
            pageviews: value.weight,
            metrics: CwvMetrics::from_facet(value),
        });
    }

    let mut rows: Vec<UrlGroupRow> = Vec::new();
    for (pattern, (pageviews, metrics)) in groups {
        let name = patterns
            .iter()
            .find(|p| p.pattern == pattern)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        rows.push(UrlGroupRow::Group {
            name,
            pattern: pattern.to_string(),
            pageviews,
            metrics,
        });
    }

    rows.extend(engine.facet(URL_FACET).iter().filter_map(|value| {
        let metrics = CwvMetrics::from_facet(value);
        metrics.has_data().then(|| UrlGroupRow::Url {
            url: value.value.encode(),
            pageviews: value.weight,
            metrics,
        })
    }));

    rows.sort_by(|a, b| {
        by_weight_desc((a.pageviews(), a.label()), (b.pageviews(), b.label()))
    });
    tracing::debug!(rows = rows.len(), "url-group report built");
    Ok(rows)
}

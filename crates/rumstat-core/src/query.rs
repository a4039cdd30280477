//! # Query Module
//!
//! Report dispatch for the CLI and the HTTP API.
//!
//! - Map a report name to a handler (`ReportKind`)
//! - Run ad-hoc facet queries over built-in extractors (`FacetQuery`)

use crate::reports::{
    ExperimentOptions, ExperimentReport, RageClickOptions, RageClickPage, UrlGroupRow,
    UrlPattern, experiment, rageclick, url_groups,
};
use crate::{Aggregate, Bundle, Cruncher, FacetValue, RumError, builtin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Report handlers available by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    Experiment,
    #[serde(rename = "rageclick")]
    RageClick,
    UrlGroups,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [Self::Experiment, Self::RageClick, Self::UrlGroups];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Experiment => "experiment",
            Self::RageClick => "rageclick",
            Self::UrlGroups => "url-groups",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = RumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| RumError::InvalidInput(format!("unknown report '{s}'")))
    }
}

/// Options for every report handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub experiment: ExperimentOptions,
    pub rageclick: RageClickOptions,
    pub url_groups: Vec<UrlPattern>,
}

/// Output of one report handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Experiment(ExperimentReport),
    RageClick(Vec<RageClickPage>),
    UrlGroups(Vec<UrlGroupRow>),
}

impl Report {
    #[must_use]
    pub fn kind(&self) -> ReportKind {
        match self {
            Self::Experiment(_) => ReportKind::Experiment,
            Self::RageClick(_) => ReportKind::RageClick,
            Self::UrlGroups(_) => ReportKind::UrlGroups,
        }
    }

    /// Top-level entries: pages, or rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Experiment(r) => r.len(),
            Self::RageClick(r) => r.len(),
            Self::UrlGroups(r) => r.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run one report over a bundle set.
pub fn run_report(
    kind: ReportKind,
    bundles: impl IntoIterator<Item = Bundle>,
    options: &ReportOptions,
) -> Result<Report, RumError> {
    let report = match kind {
        ReportKind::Experiment => {
            Report::Experiment(experiment::build(bundles, &options.experiment)?)
        }
        ReportKind::RageClick => Report::RageClick(rageclick::build(bundles, &options.rageclick)?),
        ReportKind::UrlGroups => {
            Report::UrlGroups(url_groups::build(bundles, &options.url_groups)?)
        }
    };
    tracing::info!(report = %kind, entries = report.len(), "report complete");
    Ok(report)
}

// =============================================================================
// AD-HOC FACET QUERIES
// =============================================================================

/// Built-in facets and series to compute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetQuery {
    pub facets: Vec<String>,
    pub series: Vec<String>,
}

/// Computed facets plus totals over every bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetResult {
    pub bundles: usize,
    pub facets: BTreeMap<String, Vec<FacetValue>>,
    pub totals: BTreeMap<String, Aggregate>,
}

/// Run an ad-hoc facet query. Facet values are ordered by weight, heaviest
/// first.
///
/// Returns `RumError::InvalidInput` for an unknown facet or series name.
pub fn run_facets(
    bundles: impl IntoIterator<Item = Bundle>,
    query: &FacetQuery,
) -> Result<FacetResult, RumError> {
    let mut engine = Cruncher::new();
    builtin::register(
        &mut engine,
        query.facets.iter().map(String::as_str),
        query.series.iter().map(String::as_str),
    )?;
    engine.load(bundles);

    let mut facets = engine.facets().clone();
    for values in facets.values_mut() {
        values.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.value.cmp(&b.value))
        });
    }

    Ok(FacetResult {
        bundles: engine.bundles().len(),
        facets,
        totals: engine.totals().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, FacetKey};

    #[test]
    fn report_kind_round_trips_names() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.as_str().parse::<ReportKind>().ok(), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).expect("ser"),
                serde_json::Value::from(kind.as_str())
            );
        }
        assert!("cwv".parse::<ReportKind>().is_err());
    }

    #[test]
    fn dispatches_to_handler() {
        let bundles = vec![
            Bundle::new("https://a.com/", 1.0)
                .with_event(Event::new("experiment").with_source("exp").with_target("control")),
        ];
        let report =
            run_report(ReportKind::Experiment, bundles, &ReportOptions::default()).expect("report");

        assert_eq!(report.kind(), ReportKind::Experiment);
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn empty_input_gives_empty_reports() {
        for kind in ReportKind::ALL {
            let report = run_report(kind, Vec::new(), &ReportOptions::default()).expect("report");
            assert!(report.is_empty());
        }
    }

    #[test]
    fn facet_query_orders_by_weight() {
        let bundles = vec![
            Bundle::new("https://a.com/", 1.0),
            Bundle::new("https://b.com/", 10.0),
            Bundle::new("https://b.com/", 10.0),
        ];
        let query = FacetQuery {
            facets: vec!["url".to_string()],
            series: vec!["pageViews".to_string()],
        };
        let result = run_facets(bundles, &query).expect("facets");

        assert_eq!(result.bundles, 3);
        assert_eq!(result.facets["url"][0].value, FacetKey::from("https://b.com/"));
        assert_eq!(result.totals["pageViews"].sum, 21.0);
    }

    #[test]
    fn facet_query_rejects_unknown_names() {
        let query = FacetQuery {
            facets: vec!["nope".to_string()],
            series: Vec::new(),
        };
        assert!(run_facets(Vec::new(), &query).is_err());
    }
}

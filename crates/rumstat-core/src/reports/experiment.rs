//! Experiment report.
//!
//! Only bundles carrying an `experiment` checkpoint take part. The first such
//! event names the experiment (`source`) and the variant (`target`).
//! Interaction events are counted once per bundle and source, and each
//! non-control variant is scored against the control variant of the same
//! experiment on the same page.

use crate::confidence::{SIGNIFICANCE_THRESHOLD, welch_t_test};
use crate::primitives::{ANY_SOURCE, CONTROL_VARIANT, EXPERIMENT_CHECKPOINT, METRIC_CHECKPOINTS};
use crate::reports::to_class_name;
use crate::{Bundle, Cruncher, FacetKey, RumError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const VARIANT_FACET: &str = "variant";
const METRIC_FACET: &str = "variantMetric";
const VIEWS_SERIES: &str = "views";
const INTERACTIONS_SERIES: &str = "interactions";

/// Options for [`build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentOptions {
    /// Variant every other variant is compared against.
    pub control_variant: String,
    /// Confidence at or above which a variant is flagged significant.
    pub significance_threshold: f64,
}

impl Default for ExperimentOptions {
    fn default() -> Self {
        Self {
            control_variant: CONTROL_VARIANT.to_string(),
            significance_threshold: SIGNIFICANCE_THRESHOLD,
        }
    }
}

/// Per-page experiment insights, keyed by URL.
pub type ExperimentReport = BTreeMap<String, Vec<ExperimentInsight>>;

/// One experiment seen on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentInsight {
    pub experiment: String,
    pub variants: Vec<VariantInsight>,
}

/// Exposure and interaction totals of one variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantInsight {
    pub name: String,
    /// Sum of weights of the exposed bundles.
    pub views: f64,
    /// Weight per click source; `*` covers any source.
    pub click: BTreeMap<String, f64>,
    pub convert: BTreeMap<String, f64>,
    pub formsubmit: BTreeMap<String, f64>,
    /// Weight of exposed bundles with any interaction event.
    pub interactions_count: f64,
    /// Against the control; absent on the control and without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// False when the test has no p-value, even at confidence 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significant: Option<bool>,
}

impl VariantInsight {
    fn checkpoint_mut(&mut self, checkpoint: &str) -> Option<&mut BTreeMap<String, f64>> {
        match checkpoint {
            "click" => Some(&mut self.click),
            "convert" => Some(&mut self.convert),
            "formsubmit" => Some(&mut self.formsubmit),
            _ => None,
        }
    }
}

/// `(url, experiment, variant)` of a bundle exposed to an experiment.
fn exposure(bundle: &Bundle) -> Option<[String; 3]> {
    let event = bundle.events_with(EXPERIMENT_CHECKPOINT).next()?;
    Some([
        bundle.url.clone(),
        to_class_name(event.source.as_deref().unwrap_or_default()),
        event.target.clone().unwrap_or_default(),
    ])
}

fn has_interaction(bundle: &Bundle) -> bool {
    bundle
        .events
        .iter()
        .any(|e| METRIC_CHECKPOINTS.contains(&e.checkpoint.as_str()))
}

fn metric_keys(bundle: &Bundle) -> Vec<FacetKey> {
    let Some(base) = exposure(bundle) else {
        return Vec::new();
    };

    let mut keys = Vec::new();
    for checkpoint in METRIC_CHECKPOINTS {
        let mut sources: BTreeSet<&str> = BTreeSet::new();
        let mut any = false;
        for event in bundle.events_with(checkpoint) {
            any = true;
            if let Some(source) = event.source.as_deref() {
                sources.insert(source);
            }
        }
        if any {
            sources.insert(ANY_SOURCE);
        }
        keys.extend(sources.into_iter().map(|source| {
            FacetKey::new(base.iter().map(String::as_str).chain([checkpoint, source]))
        }));
    }
    keys
}

/// Build the experiment report.
pub fn build(
    bundles: impl IntoIterator<Item = Bundle>,
    options: &ExperimentOptions,
) -> Result<ExperimentReport, RumError> {
    let mut engine = Cruncher::new();
    engine
        .add_facet(VARIANT_FACET, |b: &Bundle| exposure(b).map(FacetKey::new))?
        .add_facet(METRIC_FACET, metric_keys)?
        .add_series(VIEWS_SERIES, |b: &Bundle| Some(b.weight_or_zero()))?
        .add_series(INTERACTIONS_SERIES, |b: &Bundle| {
            has_interaction(b).then(|| b.weight_or_zero())
        })?;
    engine.load(bundles);

    let mut report = ExperimentReport::new();

    for value in engine.facet(VARIANT_FACET) {
        let [url, experiment, variant] = value.value.parts() else {
            continue;
        };
        let insights = report.entry(url.clone()).or_default();
        let insight = experiment_mut(insights, experiment);
        insight.variants.push(VariantInsight {
            name: variant.clone(),
            views: value.sum(VIEWS_SERIES),
            interactions_count: value.sum(INTERACTIONS_SERIES),
            ..VariantInsight::default()
        });
    }

    for value in engine.facet(METRIC_FACET) {
        let [url, experiment, variant, checkpoint, source] = value.value.parts() else {
            continue;
        };
        let target = report
            .get_mut(url)
            .and_then(|insights| insights.iter_mut().find(|i| &i.experiment == experiment))
            .and_then(|insight| insight.variants.iter_mut().find(|v| &v.name == variant))
            .and_then(|v| v.checkpoint_mut(checkpoint));
        if let Some(sources) = target {
            sources.insert(source.clone(), value.sum(VIEWS_SERIES));
        }
    }

    for insight in report.values_mut().flatten() {
        score_variants(insight, options);
    }

    tracing::debug!(pages = report.len(), "experiment report built");
    Ok(report)
}

fn experiment_mut<'a>(insights: &'a mut Vec<ExperimentInsight>, name: &str) -> &'a mut ExperimentInsight {
    let index = match insights.iter().position(|i| i.experiment == name) {
        Some(index) => index,
        None => {
            insights.push(ExperimentInsight {
                experiment: name.to_string(),
                variants: Vec::new(),
            });
            insights.len() - 1
        }
    };
    &mut insights[index]
}

fn score_variants(insight: &mut ExperimentInsight, options: &ExperimentOptions) {
    let Some(control) = insight
        .variants
        .iter()
        .find(|v| v.name == options.control_variant)
        .map(|v| (v.interactions_count, v.views))
    else {
        return;
    };

    for variant in insight
        .variants
        .iter_mut()
        .filter(|v| v.name != options.control_variant)
    {
        let test = welch_t_test(
            control.0,
            control.1,
            variant.interactions_count,
            variant.views,
        );
        variant.confidence = Some(test.map_or(0.0, |t| t.confidence));
        variant.significant =
            Some(test.is_some_and(|t| t.reaches(options.significance_threshold)));
    }
}

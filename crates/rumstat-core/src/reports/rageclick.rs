//! Rage-click report.
//!
//! A bundle rage-clicks a selector when it holds at least `click_threshold`
//! click events on that selector. Pages below `min_page_views` are dropped.
//!
//! A selector is kept when it has at least `min_samples` rage-clicking
//! samples making up at least `min_percentage` of the page's samples, or
//! when it has `samples_override` rage-clicking samples at any share.

use crate::primitives::{
    CLICK_CHECKPOINT, DEFAULT_PAGE_VIEW_THRESHOLD, DEFAULT_RAGE_CLICK_MIN_SAMPLES,
    DEFAULT_RAGE_CLICK_PERCENT_THRESHOLD, DEFAULT_RAGE_CLICK_SAMPLES_OVERRIDE,
    DEFAULT_RAGE_CLICK_THRESHOLD,
};
use crate::reports::by_weight_desc;
use crate::{Bundle, Cruncher, FacetKey, RumError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PAGE_FACET: &str = "page";
const SELECTOR_FACET: &str = "rageSelector";

/// Options for [`build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RageClickOptions {
    /// Clicks on one selector within one bundle that make a rage click.
    pub click_threshold: usize,
    /// Share of a page's samples, in percent, a selector needs.
    pub min_percentage: f64,
    /// Rage-clicking samples needed before `min_percentage` is considered.
    pub min_samples: usize,
    /// Rage-clicking samples that keep a selector regardless of its share.
    pub samples_override: usize,
    /// Weighted page views below which a page is skipped.
    pub min_page_views: f64,
    /// Selectors never reported.
    pub ignore_selectors: Vec<String>,
}

impl RageClickOptions {
    fn keeps(&self, metric: &RageClickMetric) -> bool {
        (metric.samples >= self.min_samples && metric.percentage >= self.min_percentage)
            || metric.samples >= self.samples_override
    }
}

impl Default for RageClickOptions {
    fn default() -> Self {
        Self {
            click_threshold: DEFAULT_RAGE_CLICK_THRESHOLD,
            min_percentage: DEFAULT_RAGE_CLICK_PERCENT_THRESHOLD,
            min_samples: DEFAULT_RAGE_CLICK_MIN_SAMPLES,
            samples_override: DEFAULT_RAGE_CLICK_SAMPLES_OVERRIDE,
            min_page_views: DEFAULT_PAGE_VIEW_THRESHOLD,
            ignore_selectors: [
                ".product-list-page",
                ".product-details-verb",
                ".product-details",
                ".accordion",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// One reported page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RageClickPage {
    pub page: String,
    /// Sum of bundle weights.
    pub page_views: f64,
    /// Bundles seen for the page.
    pub samples: usize,
    /// Mean of the reported selectors' percentages.
    pub average_percentage: f64,
    pub metrics: Vec<RageClickMetric>,
}

/// One rage-clicked selector of a page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RageClickMetric {
    pub selector: String,
    /// Click count per click target.
    pub targets: BTreeMap<String, usize>,
    /// Clicks on the selector across rage-clicking samples.
    pub value: usize,
    /// Bundles rage-clicking the selector.
    pub samples: usize,
    /// `samples` as a percent of the page's samples.
    pub percentage: f64,
    /// Rage-clicking bundles whose user agent mentions `mobile`.
    pub mobile_samples: usize,
    pub desktop_samples: usize,
}

/// Per-selector clicks of one bundle.
#[derive(Debug, Default)]
struct SelectorClicks {
    value: usize,
    targets: BTreeMap<String, usize>,
}

fn clicks_by_selector(bundle: &Bundle, ignore: &[String]) -> BTreeMap<String, SelectorClicks> {
    let mut selectors: BTreeMap<String, SelectorClicks> = BTreeMap::new();
    for event in bundle.events_with(CLICK_CHECKPOINT) {
        let Some(source) = event.source.as_deref() else {
            continue;
        };
        if ignore.iter().any(|s| s == source) {
            continue;
        }
        let entry = selectors.entry(source.to_string()).or_default();
        entry.value += 1;
        if let Some(target) = &event.target {
            *entry.targets.entry(target.clone()).or_default() += 1;
        }
    }
    selectors
}

fn rage_selectors(
    bundle: &Bundle,
    threshold: usize,
    ignore: &[String],
) -> BTreeMap<String, SelectorClicks> {
    let mut selectors = clicks_by_selector(bundle, ignore);
    selectors.retain(|_, clicks| clicks.value >= threshold);
    selectors
}

fn is_mobile(bundle: &Bundle) -> bool {
    bundle
        .user_agent
        .as_deref()
        .is_some_and(|ua| ua.contains("mobile"))
}

/// Build the rage-click report, busiest pages first.
pub fn build(
    bundles: impl IntoIterator<Item = Bundle>,
    options: &RageClickOptions,
) -> Result<Vec<RageClickPage>, RumError> {
    let threshold = options.click_threshold;
    let ignore = options.ignore_selectors.clone();

    let mut engine = Cruncher::new();
    engine
        .add_facet(PAGE_FACET, |b: &Bundle| Some(b.url.clone()))?
        .add_facet(SELECTOR_FACET, move |b: &Bundle| {
            rage_selectors(b, threshold, &ignore)
                .into_keys()
                .map(|selector| FacetKey::new([b.url.clone(), selector]))
                .collect::<Vec<_>>()
        })?;
    engine.load(bundles);

    let mut per_page: BTreeMap<&str, Vec<RageClickMetric>> = BTreeMap::new();
    for value in engine.facet(SELECTOR_FACET) {
        let [url, selector] = value.value.parts() else {
            continue;
        };
        let mut metric = RageClickMetric {
            selector: selector.clone(),
            samples: value.count,
            ..RageClickMetric::default()
        };
        for bundle in engine.bundles_for(SELECTOR_FACET, &value.value) {
            let mut clicks = clicks_by_selector(bundle, &options.ignore_selectors);
            let Some(clicks) = clicks.remove(selector) else {
                continue;
            };
            metric.value += clicks.value;
            for (target, count) in clicks.targets {
                *metric.targets.entry(target).or_default() += count;
            }
            if is_mobile(bundle) {
                metric.mobile_samples += 1;
            } else {
                metric.desktop_samples += 1;
            }
        }
        per_page.entry(url.as_str()).or_default().push(metric);
    }

    let mut pages = Vec::new();
    for (url, metrics) in per_page {
        let Some(page) = engine.facet_value(PAGE_FACET, &FacetKey::from(url)) else {
            continue;
        };
        if page.weight < options.min_page_views {
            continue;
        }

        let metrics: Vec<RageClickMetric> = metrics
            .into_iter()
            .map(|mut m| {
                m.percentage = m.samples as f64 / page.count as f64 * 100.0;
                m
            })
            .filter(|m| options.keeps(m))
            .collect();
        if metrics.is_empty() {
            continue;
        }

        let average_percentage =
            metrics.iter().map(|m| m.percentage).sum::<f64>() / metrics.len() as f64;
        pages.push(RageClickPage {
            page: url.to_string(),
            page_views: page.weight,
            samples: page.count,
            average_percentage,
            metrics,
        });
    }

    pages.sort_by(|a, b| {
        by_weight_desc((a.page_views, a.page.as_str()), (b.page_views, b.page.as_str()))
    });
    tracing::debug!(pages = pages.len(), "rage-click report built");
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;

    fn rage(url: &str, selector: &str, clicks: usize, weight: f64) -> Bundle {
        Bundle::new(url, weight).with_events(
            (0..clicks).map(|_| Event::new("click").with_source(selector).with_target("/cart")),
        )
    }

    fn options() -> RageClickOptions {
        RageClickOptions {
            min_page_views: 100.0,
            min_samples: 1,
            ..RageClickOptions::default()
        }
    }

    #[test]
    fn reports_selectors_over_threshold() {
        let bundles = vec![
            rage("https://a.com/", ".buy", 12, 100.0).with_user_agent("mobile:ios"),
            rage("https://a.com/", ".buy", 10, 100.0).with_user_agent("desktop:windows"),
            rage("https://a.com/", ".buy", 3, 100.0),
            rage("https://a.com/", ".menu", 2, 100.0),
        ];
        let pages = build(bundles, &options()).expect("report");

        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert_eq!(page.page_views, 400.0);
        assert_eq!(page.samples, 4);
        assert_eq!(page.metrics.len(), 1);

        let buy = &page.metrics[0];
        assert_eq!(buy.selector, ".buy");
        assert_eq!(buy.samples, 2);
        assert_eq!(buy.value, 22);
        assert_eq!(buy.targets.get("/cart"), Some(&22));
        assert_eq!(buy.percentage, 50.0);
        assert_eq!((buy.mobile_samples, buy.desktop_samples), (1, 1));
        assert_eq!(page.average_percentage, 50.0);
    }

    #[test]
    fn drops_quiet_pages() {
        let pages = build(
            vec![rage("https://a.com/", ".buy", 20, 10.0)],
            &RageClickOptions::default(),
        )
        .expect("report");
        assert!(pages.is_empty());
    }

    #[test]
    fn drops_rare_selectors_and_ignored_ones() {
        let mut bundles = vec![rage("https://a.com/", ".buy", 15, 10.0)];
        bundles.extend((0..30).map(|_| Bundle::new("https://a.com/", 10.0)));
        bundles.push(rage("https://b.com/", ".accordion", 15, 500.0));

        let pages = build(bundles, &options()).expect("report");
        assert!(pages.is_empty());
    }

    #[test]
    fn many_samples_report_a_selector_at_any_share() {
        let mut bundles: Vec<_> = (0..150)
            .map(|_| rage("https://busy.com/", ".buy", 10, 1.0))
            .collect();
        bundles.extend((0..9850).map(|_| Bundle::new("https://busy.com/", 1.0)));

        let options = RageClickOptions {
            min_page_views: 1000.0,
            ..RageClickOptions::default()
        };
        let pages = build(bundles, &options).expect("report");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_views, 10000.0);
        assert_eq!(pages[0].metrics[0].samples, 150);
        assert!((pages[0].metrics[0].percentage - 1.5).abs() < 1e-9);
    }

    #[test]
    fn few_samples_are_dropped_at_any_share() {
        let mut bundles: Vec<_> = (0..2)
            .map(|_| rage("https://thin.com/", ".buy", 10, 1.0))
            .collect();
        bundles.extend((0..18).map(|_| Bundle::new("https://thin.com/", 1.0)));

        let defaults = RageClickOptions {
            min_page_views: 0.0,
            ..RageClickOptions::default()
        };
        assert!(build(bundles.clone(), &defaults).expect("report").is_empty());

        let lowered = RageClickOptions {
            min_samples: 2,
            ..defaults
        };
        let pages = build(bundles, &lowered).expect("report");
        assert!((pages[0].metrics[0].percentage - 10.0).abs() < 1e-9);
    }

    #[test]
    fn busiest_page_first() {
        let bundles = vec![
            rage("https://small.com/", ".x", 10, 200.0),
            rage("https://big.com/", ".x", 10, 900.0),
        ];
        let pages = build(bundles, &options()).expect("report");
        let order: Vec<_> = pages.iter().map(|p| p.page.as_str()).collect();
        assert_eq!(order, vec!["https://big.com/", "https://small.com/"]);
    }
}

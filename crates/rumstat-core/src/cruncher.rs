//! # Cruncher Module
//!
//! The aggregation engine: facets × series over one set of bundles.
//!
//! ## Evaluation
//!
//! Everything is computed eagerly inside [`Cruncher::load`], in a single pass:
//! each series extractor runs once per bundle, each facet extractor runs once
//! per bundle, and the per-bundle series values are folded into every facet
//! value the bundle belongs to. Reads after `load` are plain lookups and
//! return identical results until the next `load`.
//!
//! Because results are materialized at load time, registering a facet or a
//! series after the first `load` is rejected with
//! [`RumError::RegistrationAfterLoad`] instead of silently returning stale
//! results.
//!
//! ## Percentiles
//!
//! Aggregates keep only `{sum, count, min, max}` unless the series was
//! marked with [`Cruncher::retain_values`], in which case every facet value
//! and the total also keep the contributed values for
//! [`Aggregate::percentile`].
//!
//! ## Ordering
//!
//! Facet values are returned ordered by key. Callers that need another order
//! (e.g. by weight) sort the slice themselves.
//!
//! ## Extractor failures
//!
//! Extractors are trusted code supplied by the caller. A panic inside one
//! propagates out of `load`.

use crate::facet::{Facet, FacetRegistry};
use crate::series::{Series, SeriesRegistry};
use crate::store::BundleStore;
use crate::{Aggregate, Bundle, FacetKey, FacetValue, RumError};
use std::collections::{BTreeMap, BTreeSet};

/// One engine instance: registries, the loaded bundles, and the computed
/// facets.
///
/// Each logical query owns its own `Cruncher`. It is not shared between
/// concurrent queries.
#[derive(Debug, Default)]
pub struct Cruncher {
    facets: FacetRegistry,
    series: SeriesRegistry,
    store: BundleStore,
    retained: BTreeSet<String>,
    loaded: bool,
    computed: BTreeMap<String, Vec<FacetValue>>,
    totals: BTreeMap<String, Aggregate>,
}

impl Cruncher {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register a facet closure. The last registration for a name wins.
    pub fn add_facet<F, I>(&mut self, name: impl Into<String>, facet: F) -> Result<&mut Self, RumError>
    where
        F: Fn(&Bundle) -> I + 'static,
        I: IntoIterator,
        I::Item: Into<FacetKey>,
    {
        self.add_facet_boxed(name, Box::new(facet))
    }

    /// Register a boxed facet extractor.
    pub fn add_facet_boxed(
        &mut self,
        name: impl Into<String>,
        facet: Box<dyn Facet>,
    ) -> Result<&mut Self, RumError> {
        let name = name.into();
        self.ensure_not_loaded("facet", &name)?;
        self.facets.register(name, facet);
        Ok(self)
    }

    /// Register a series closure. The last registration for a name wins.
    pub fn add_series<F>(&mut self, name: impl Into<String>, series: F) -> Result<&mut Self, RumError>
    where
        F: Fn(&Bundle) -> Option<f64> + 'static,
    {
        self.add_series_boxed(name, Box::new(series))
    }

    /// Register a boxed series extractor.
    pub fn add_series_boxed(
        &mut self,
        name: impl Into<String>,
        series: Box<dyn Series>,
    ) -> Result<&mut Self, RumError> {
        let name = name.into();
        self.ensure_not_loaded("series", &name)?;
        self.series.register(name, series);
        Ok(self)
    }

    /// Keep every value of a series so its aggregates can answer
    /// percentiles. Applies to the series registered under `series`, before
    /// or after this call.
    pub fn retain_values(&mut self, series: impl Into<String>) -> Result<&mut Self, RumError> {
        let series = series.into();
        self.ensure_not_loaded("series", &series)?;
        self.retained.insert(series);
        Ok(self)
    }

    fn ensure_not_loaded(&self, kind: &'static str, name: &str) -> Result<(), RumError> {
        if self.loaded {
            return Err(RumError::RegistrationAfterLoad {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Names of the registered facets, in order.
    pub fn facet_names(&self) -> impl Iterator<Item = &str> {
        self.facets.names()
    }

    /// Names of the registered series, in order.
    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.names()
    }

    // =========================================================================
    // LOADING
    // =========================================================================

    /// Replace the working set and compute every facet and series.
    ///
    /// A second call discards everything computed from the first.
    pub fn load(&mut self, bundles: impl IntoIterator<Item = Bundle>) -> &mut Self {
        let count = self.store.load(bundles);
        self.loaded = true;
        self.compute();

        tracing::debug!(
            bundles = count,
            facets = self.facets.len(),
            series = self.series.len(),
            facet_values = self.computed.values().map(Vec::len).sum::<usize>(),
            "bundles loaded"
        );

        self
    }

    fn compute(&mut self) {
        let series_names: Vec<&str> = self.series.names().collect();

        let mut totals: BTreeMap<String, Aggregate> = series_names
            .iter()
            .map(|name| ((*name).to_string(), empty_aggregate(&self.retained, name)))
            .collect();
        let mut grouped: BTreeMap<&str, BTreeMap<FacetKey, FacetValue>> = self
            .facets
            .names()
            .map(|name| (name, BTreeMap::new()))
            .collect();

        for (index, bundle) in self.store.iter().enumerate() {
            // NaN is treated as "no contribution".
            let values: Vec<Option<f64>> = self
                .series
                .iter()
                .map(|(_, series)| series.value(bundle).filter(|v| !v.is_nan()))
                .collect();

            for (name, value) in series_names.iter().zip(&values) {
                if let (Some(v), Some(total)) = (value, totals.get_mut(*name)) {
                    total.add(*v);
                }
            }

            for (facet_name, facet) in self.facets.iter() {
                let keys: BTreeSet<FacetKey> = facet
                    .keys(bundle)
                    .into_iter()
                    .filter(|k| !k.is_blank())
                    .collect();
                let Some(entries) = grouped.get_mut(facet_name) else {
                    continue;
                };

                for key in keys {
                    let entry = entries
                        .entry(key)
                        .or_insert_with_key(|k| {
                            new_facet_value(k, &series_names, &self.retained)
                        });
                    entry.weight += bundle.weight_or_zero();
                    entry.count += 1;
                    entry.bundles.push(index);

                    for (name, value) in series_names.iter().zip(&values) {
                        if let (Some(v), Some(agg)) = (value, entry.metrics.get_mut(*name)) {
                            agg.add(*v);
                        }
                    }
                }
            }
        }

        self.computed = grouped
            .into_iter()
            .map(|(name, entries)| (name.to_string(), entries.into_values().collect()))
            .collect();
        self.totals = totals;
    }

    // =========================================================================
    // READING
    // =========================================================================

    /// Every registered facet with its values, ordered by facet name.
    ///
    /// Empty until the first `load`.
    #[must_use]
    pub fn facets(&self) -> &BTreeMap<String, Vec<FacetValue>> {
        &self.computed
    }

    /// Values of one facet; empty when the facet is not registered.
    #[must_use]
    pub fn facet(&self, name: &str) -> &[FacetValue] {
        self.computed.get(name).map_or(&[], Vec::as_slice)
    }

    /// One value of one facet.
    #[must_use]
    pub fn facet_value(&self, name: &str, key: &FacetKey) -> Option<&FacetValue> {
        let values = self.facet(name);
        values
            .binary_search_by(|fv| fv.value.cmp(key))
            .ok()
            .and_then(|i| values.get(i))
    }

    /// Bundles that produced `key` for facet `name`, in load order.
    pub fn bundles_for<'a>(
        &'a self,
        name: &str,
        key: &FacetKey,
    ) -> impl Iterator<Item = &'a Bundle> + use<'a> {
        let indices = self
            .facet_value(name, key)
            .map_or(&[][..], |fv| fv.bundles.as_slice());
        indices.iter().filter_map(|&i| self.store.get(i))
    }

    /// Per-series aggregate over every loaded bundle.
    #[must_use]
    pub fn totals(&self) -> &BTreeMap<String, Aggregate> {
        &self.totals
    }

    /// Aggregate over every loaded bundle for one series.
    #[must_use]
    pub fn total(&self, series: &str) -> Option<&Aggregate> {
        self.totals.get(series)
    }

    /// The loaded bundles.
    #[must_use]
    pub fn bundles(&self) -> &BundleStore {
        &self.store
    }

    /// Whether `load` has been called.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

fn empty_aggregate(retained: &BTreeSet<String>, series: &str) -> Aggregate {
    if retained.contains(series) {
        Aggregate::retaining()
    } else {
        Aggregate::new()
    }
}

fn new_facet_value(key: &FacetKey, series_names: &[&str], retained: &BTreeSet<String>) -> FacetValue {
    let mut value = FacetValue::new(key.clone());
    value.metrics = series_names
        .iter()
        .map(|name| ((*name).to_string(), empty_aggregate(retained, name)))
        .collect();
    value
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Event;

    fn views_engine() -> Cruncher {
        let mut engine = Cruncher::new();
        engine
            .add_facet("url", |b: &Bundle| Some(b.url.clone()))
            .expect("facet");
        engine
            .add_series("views", |b: &Bundle| b.weight)
            .expect("series");
        engine
    }

    #[test]
    fn same_key_folds_both_bundles() {
        let mut engine = views_engine();
        engine.load(vec![
            Bundle::new("https://a.com/", 3.0),
            Bundle::new("https://a.com/", 5.0),
        ]);

        let values = engine.facet("url");
        assert_eq!(values.len(), 1);

        let views = values[0].metric("views").expect("views");
        assert_eq!(views.sum, 8.0);
        assert_eq!(views.count, 2);
        assert_eq!(views.min, Some(3.0));
        assert_eq!(views.max, Some(5.0));
        assert_eq!(values[0].weight, 8.0);
        assert_eq!(values[0].count, 2);
    }

    #[test]
    fn blank_keys_are_ignored() {
        let mut engine = views_engine();
        engine.load(vec![
            Bundle::new("", 10.0),
            Bundle::new("https://a.com/", 1.0),
        ]);

        let values = engine.facet("url");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, FacetKey::from("https://a.com/"));
        assert!(engine.facet_value("url", &FacetKey::from("")).is_none());
        assert_eq!(engine.total("views").map(|a| a.count), Some(2));
    }

    #[test]
    fn only_retained_series_answer_percentiles() {
        let mut engine = views_engine();
        engine
            .add_series("lcp", |b: &Bundle| b.weight.map(|w| w * 100.0))
            .expect("series")
            .retain_values("lcp")
            .expect("retain");
        engine.load((1..=4).map(|i| Bundle::new("https://a.com/", f64::from(i))));

        let value = &engine.facet("url")[0];
        assert_eq!(value.metric("lcp").and_then(|a| a.percentile(75.0)), Some(300.0));
        assert_eq!(value.metric("views").and_then(|a| a.percentile(75.0)), None);
        assert!(value.metric("views").is_some_and(|a| a.values().is_empty()));
        assert_eq!(engine.total("lcp").map(|a| a.values().len()), Some(4));
    }

    #[test]
    fn retain_after_load_is_refused() {
        let mut engine = views_engine();
        engine.load(Vec::new());
        assert!(matches!(
            engine.retain_values("views"),
            Err(RumError::RegistrationAfterLoad { kind: "series", .. })
        ));
    }

    #[test]
    fn absent_values_do_not_count() {
        let mut engine = views_engine();
        let mut no_weight = Bundle::new("https://a.com/", 1.0);
        no_weight.weight = None;
        engine.load(vec![Bundle::new("https://a.com/", 4.0), no_weight]);

        let value = &engine.facet("url")[0];
        assert_eq!(value.count, 2);
        assert_eq!(value.metric("views").map(|a| a.count), Some(1));
    }

    #[test]
    fn duplicate_keys_from_one_bundle_count_once() {
        let mut engine = Cruncher::new();
        engine
            .add_facet("checkpoint", |b: &Bundle| {
                b.events
                    .iter()
                    .map(|e| e.checkpoint.clone())
                    .collect::<Vec<_>>()
            })
            .expect("facet");
        engine
            .add_series("views", |b: &Bundle| b.weight)
            .expect("series");

        let bundle = Bundle::new("https://a.com/", 10.0).with_events([
            Event::new("click"),
            Event::new("click"),
            Event::new("enter"),
        ]);
        engine.load(vec![bundle]);

        let click = engine
            .facet_value("checkpoint", &FacetKey::from("click"))
            .expect("click");
        assert_eq!(click.count, 1);
        assert_eq!(click.sum("views"), 10.0);
        assert_eq!(engine.facet("checkpoint").len(), 2);
    }

    #[test]
    fn bundle_may_belong_to_several_values() {
        let mut engine = Cruncher::new();
        engine
            .add_facet("source", |b: &Bundle| {
                b.events
                    .iter()
                    .filter_map(|e| e.source.clone())
                    .collect::<Vec<_>>()
            })
            .expect("facet");
        engine.load(vec![Bundle::new("https://a.com/", 1.0).with_events([
            Event::new("click").with_source(".a"),
            Event::new("click").with_source(".b"),
        ])]);

        let a = engine.bundles_for("source", &FacetKey::from(".a")).count();
        let b = engine.bundles_for("source", &FacetKey::from(".b")).count();
        assert_eq!((a, b), (1, 1));
    }

    #[test]
    fn unknown_names_are_empty() {
        let mut engine = views_engine();
        engine.load(vec![Bundle::new("https://a.com/", 1.0)]);

        assert!(engine.facet("nope").is_empty());
        assert!(engine.total("nope").is_none());
        assert!(engine.facet("url")[0].metric("nope").is_none());
        assert_eq!(engine.bundles_for("nope", &FacetKey::from("x")).count(), 0);
    }

    #[test]
    fn registration_after_load_is_rejected() {
        let mut engine = views_engine();
        engine.load(Vec::new());

        let err = engine.add_series("late", |_: &Bundle| Some(1.0));
        assert!(matches!(err, Err(RumError::RegistrationAfterLoad { .. })));
        let err = engine.add_facet("late", |_: &Bundle| None::<String>);
        assert!(matches!(err, Err(RumError::RegistrationAfterLoad { .. })));
    }

    #[test]
    fn empty_load_yields_empty_facets() {
        let mut engine = views_engine();
        engine.load(Vec::new());

        assert_eq!(engine.facets().len(), 1);
        assert!(engine.facet("url").is_empty());
        assert_eq!(engine.total("views").map(|a| a.count), Some(0));
    }

    #[test]
    fn second_load_replaces_first() {
        let mut engine = views_engine();
        engine.load(vec![Bundle::new("https://a.com/", 100.0)]);
        engine.load(vec![Bundle::new("https://b.com/", 1.0)]);

        let values = engine.facet("url");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, FacetKey::from("https://b.com/"));
        assert_eq!(engine.total("views").map(|a| a.sum), Some(1.0));
    }

    #[test]
    fn rereading_is_stable() {
        let mut engine = views_engine();
        engine.load(vec![
            Bundle::new("https://b.com/", 2.0),
            Bundle::new("https://a.com/", 1.0),
        ]);

        let first = engine.facets().clone();
        let second = engine.facets().clone();
        assert_eq!(first, second);

        let keys: Vec<_> = engine.facet("url").iter().map(|v| v.value.encode()).collect();
        assert_eq!(keys, vec!["https://a.com/", "https://b.com/"]);
    }

    #[test]
    fn composite_keys_do_not_collide() {
        let mut engine = Cruncher::new();
        engine
            .add_facet("pair", |b: &Bundle| {
                Some(FacetKey::new([
                    b.url.clone(),
                    b.device_type().unwrap_or_default().to_string(),
                ]))
            })
            .expect("facet");
        engine.load(vec![
            Bundle::new("a|b", 1.0).with_user_agent("c"),
            Bundle::new("a", 1.0).with_user_agent("b|c"),
        ]);

        assert_eq!(engine.facet("pair").len(), 2);
    }

    #[test]
    fn nan_is_no_contribution() {
        let mut engine = Cruncher::new();
        engine
            .add_facet("url", |b: &Bundle| Some(b.url.clone()))
            .expect("facet");
        engine
            .add_series("nan", |_: &Bundle| Some(f64::NAN))
            .expect("series");
        engine.load(vec![Bundle::new("https://a.com/", 1.0)]);

        assert_eq!(engine.facet("url")[0].metric("nan").map(|a| a.count), Some(0));
    }

    #[test]
    #[allow(clippy::panic)]
    #[should_panic(expected = "extractor bug")]
    fn extractor_panics_propagate() {
        let mut engine = Cruncher::new();
        engine
            .add_series("boom", |_: &Bundle| -> Option<f64> { panic!("extractor bug") })
            .expect("series");
        engine.load(vec![Bundle::new("https://a.com/", 1.0)]);
    }
}

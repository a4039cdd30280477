//! # Core Type Definitions
//!
//! This module contains all core types for the rumstat aggregation engine:
//! - Input records (`Bundle`, `Event`, `BundleTime`)
//! - Grouping keys (`FacetKey`)
//! - Output structures (`Aggregate`, `FacetValue`)
//! - Error types (`RumError`)
//!
//! ## Input Tolerance
//!
//! Bundles arrive from the RUM collector as loosely-shaped JSON. Every field
//! is optional, `null` collapses to the default, and numeric text fields
//! (`id`, `checkpoint`, `source`, `target`, ...) are kept as their decimal
//! text. A field of an unexpected shape reads as absent, and so does an event
//! that is not an object. A bundle object is never rejected for the shape of
//! its fields.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// LENIENT DESERIALIZATION HELPERS
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientText {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Other(IgnoredAny),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<LenientText>::deserialize(deserializer)?;
    Ok(match raw {
        Some(LenientText::Text(s)) => Some(s),
        Some(LenientText::Int(i)) => Some(i.to_string()),
        Some(LenientText::Float(f)) => Some(f.to_string()),
        Some(LenientText::Bool(b)) => Some(b.to_string()),
        Some(LenientText::Other(_)) | None => None,
    })
}

/// Like [`lenient_string`], with absent text read as `""`.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientTime {
    Time(BundleTime),
    Other(IgnoredAny),
}

fn lenient_time<'de, D>(deserializer: D) -> Result<Option<BundleTime>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LenientTime>::deserialize(deserializer)? {
        Some(LenientTime::Time(time)) => Some(time),
        Some(LenientTime::Other(_)) | None => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientEvent {
    Event(Event),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientEvents {
    List(Vec<LenientEvent>),
    Other(IgnoredAny),
}

fn lenient_events<'de, D>(deserializer: D) -> Result<Vec<Event>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<LenientEvents>::deserialize(deserializer)? {
        Some(LenientEvents::List(events)) => events
            .into_iter()
            .filter_map(|e| match e {
                LenientEvent::Event(event) => Some(event),
                LenientEvent::Other(_) => None,
            })
            .collect(),
        Some(LenientEvents::Other(_)) | None => Vec::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<LenientNumber>::deserialize(deserializer)?;
    Ok(match raw {
        Some(LenientNumber::Number(n)) => Some(n),
        Some(LenientNumber::Text(s)) => s.trim().parse().ok(),
        Some(LenientNumber::Other(_)) | None => None,
    })
}

// =============================================================================
// EVENT
// =============================================================================

/// One entry of a bundle's event trace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Checkpoint name (`click`, `enter`, `experiment`, `cwv-lcp`, ...).
    #[serde(default, deserialize_with = "lenient_text")]
    pub checkpoint: String,
    /// CSS selector or experiment name, depending on the checkpoint.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub source: Option<String>,
    /// Link target, variant name or resource, depending on the checkpoint.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<String>,
    /// Measured value, present on web-vitals checkpoints.
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<f64>,
    /// Milliseconds since the page view started.
    #[serde(
        default,
        rename = "timeDelta",
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_delta: Option<f64>,
}

impl Event {
    /// Create an event with only a checkpoint.
    #[must_use]
    pub fn new(checkpoint: impl Into<String>) -> Self {
        Self {
            checkpoint: checkpoint.into(),
            ..Self::default()
        }
    }

    /// Set the event source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the event target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the measured value.
    #[must_use]
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Check the checkpoint name.
    #[must_use]
    pub fn is(&self, checkpoint: &str) -> bool {
        self.checkpoint == checkpoint
    }
}

// =============================================================================
// BUNDLE
// =============================================================================

/// Observation time as delivered by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleTime {
    /// ISO-8601 timestamp.
    Iso(String),
    /// Milliseconds since the Unix epoch.
    Epoch(f64),
}

/// A Bundle is one weighted observation of a page view.
///
/// A bundle stands for `weight` real visits. Bundles are immutable inputs;
/// the engine only ever reads them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bundle {
    /// Collector-assigned id, not unique across page views.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: String,
    #[serde(
        default,
        deserialize_with = "lenient_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<BundleTime>,
    /// Number of real visits this sample stands for.
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub weight: Option<f64>,
    /// Device class and platform, e.g. `mobile:ios`.
    #[serde(
        default,
        rename = "userAgent",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_agent: Option<String>,
    #[serde(default, deserialize_with = "lenient_events")]
    pub events: Vec<Event>,
}

impl Bundle {
    /// Create a bundle for a URL with a sampling weight.
    #[must_use]
    pub fn new(url: impl Into<String>, weight: f64) -> Self {
        Self {
            url: url.into(),
            weight: Some(weight),
            ..Self::default()
        }
    }

    /// Append one event to the trace.
    #[must_use]
    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Append events to the trace.
    #[must_use]
    pub fn with_events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.events.extend(events);
        self
    }

    /// Set the device class, e.g. `mobile:ios`.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the observation time.
    #[must_use]
    pub fn with_time(mut self, time: BundleTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Weight, with a missing weight counting as zero visits.
    #[must_use]
    pub fn weight_or_zero(&self) -> f64 {
        self.weight.unwrap_or(0.0)
    }

    /// Check whether any event carries the given checkpoint.
    #[must_use]
    pub fn has_checkpoint(&self, checkpoint: &str) -> bool {
        self.events.iter().any(|e| e.is(checkpoint))
    }

    /// Iterate the events carrying the given checkpoint, in trace order.
    pub fn events_with<'a>(&'a self, checkpoint: &'a str) -> impl Iterator<Item = &'a Event> {
        self.events.iter().filter(move |e| e.is(checkpoint))
    }

    /// Device class: the `userAgent` prefix before the first `:`.
    #[must_use]
    pub fn device_type(&self) -> Option<&str> {
        self.user_agent
            .as_deref()
            .and_then(|ua| ua.split(':').next())
            .filter(|d| !d.is_empty())
    }
}

// =============================================================================
// FACET KEY
// =============================================================================

/// Separator used in the textual form of a multi-part key.
pub const KEY_SEPARATOR: char = '|';

/// Escape character used in the textual form of a multi-part key.
pub const KEY_ESCAPE: char = '\\';

/// A grouping key: an ordered tuple of string parts.
///
/// Equality and ordering are defined on the parts, so `("a|b", "c")` and
/// `("a", "b|c")` are distinct keys. The textual form (see [`FacetKey::encode`])
/// escapes separators inside parts and is reversed exactly by
/// [`FacetKey::parse`].
///
/// A blank key (no parts, or only empty parts) is "no key": the engine
/// ignores it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FacetKey(Vec<String>);

impl FacetKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Build a one-part key.
    #[must_use]
    pub fn single(part: impl Into<String>) -> Self {
        Self(vec![part.into()])
    }

    /// The parts, in order.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// One part by position.
    #[must_use]
    pub fn part(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Number of parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for zero parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check for zero parts or only empty parts.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(String::is_empty)
    }

    /// Render the key as text, escaping `\` and `|` inside parts.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(KEY_SEPARATOR);
            }
            for c in part.chars() {
                if c == KEY_SEPARATOR || c == KEY_ESCAPE {
                    out.push(KEY_ESCAPE);
                }
                out.push(c);
            }
        }
        out
    }

    /// Parse the textual form produced by [`FacetKey::encode`].
    ///
    /// Returns `RumError::InvalidInput` on a dangling escape or an escape of
    /// anything other than `\` or `|`.
    pub fn parse(text: &str) -> Result<Self, RumError> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            match c {
                KEY_ESCAPE => match chars.next() {
                    Some(escaped @ (KEY_ESCAPE | KEY_SEPARATOR)) => current.push(escaped),
                    Some(other) => {
                        return Err(RumError::InvalidInput(format!(
                            "invalid escape '\\{}' in facet key",
                            other
                        )));
                    }
                    None => {
                        return Err(RumError::InvalidInput(
                            "dangling escape at end of facet key".to_string(),
                        ));
                    }
                },
                KEY_SEPARATOR => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        parts.push(current);

        Ok(Self(parts))
    }
}

impl fmt::Display for FacetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.encode())
    }
}

impl From<String> for FacetKey {
    fn from(s: String) -> Self {
        Self::single(s)
    }
}

impl From<&str> for FacetKey {
    fn from(s: &str) -> Self {
        Self::single(s)
    }
}

impl From<&String> for FacetKey {
    fn from(s: &String) -> Self {
        Self::single(s.clone())
    }
}

impl From<Vec<String>> for FacetKey {
    fn from(parts: Vec<String>) -> Self {
        Self(parts)
    }
}

// One-part keys serialize as a plain string, multi-part keys as an array.
impl Serialize for FacetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0.as_slice() {
            [single] => serializer.serialize_str(single),
            parts => parts.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FacetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Single(String),
            Parts(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Single(s) => Self::single(s),
            Repr::Parts(parts) => Self(parts),
        })
    }
}

// =============================================================================
// AGGREGATE
// =============================================================================

/// Running `{sum, count, min, max}` summary of one series.
///
/// `min` and `max` are `None` while `count == 0`. Contributed values are
/// kept only by aggregates built with [`Aggregate::retaining`], which is what
/// [`Aggregate::percentile`] reads. They are never serialized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Aggregate {
    pub sum: f64,
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(skip)]
    retain: bool,
    #[serde(skip)]
    values: Vec<f64>,
}

impl Aggregate {
    /// Create an empty aggregate that keeps no values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty aggregate that keeps every value for percentiles.
    #[must_use]
    pub fn retaining() -> Self {
        Self {
            retain: true,
            ..Self::default()
        }
    }

    /// Fold one value into the aggregate.
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        if self.retain {
            self.values.push(value);
        }
    }

    /// Check whether nothing was folded in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the contributed values.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Nearest-rank percentile (`p` in `[0, 100]`) of the contributed values.
    ///
    /// `None` when empty or when values are not retained.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let rank = ((p.clamp(0.0, 100.0) / 100.0) * n as f64).ceil() as usize;
        let index = rank.clamp(1, n) - 1;
        sorted.get(index).copied()
    }

    /// Contributed values in fold order; empty unless retaining.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

// =============================================================================
// FACET VALUE
// =============================================================================

/// One distinct value of a facet together with its per-series aggregates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FacetValue {
    /// The distinct key.
    pub value: FacetKey,
    /// Sum of the weights of the contributing bundles.
    pub weight: f64,
    /// Number of contributing bundles.
    pub count: usize,
    /// Aggregate per registered series name.
    pub metrics: BTreeMap<String, Aggregate>,
    /// Indices of the contributing bundles in the store.
    #[serde(skip)]
    pub(crate) bundles: Vec<usize>,
}

impl FacetValue {
    pub(crate) fn new(value: FacetKey) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Aggregate for a series, `None` when the series is not registered.
    #[must_use]
    pub fn metric(&self, series: &str) -> Option<&Aggregate> {
        self.metrics.get(series)
    }

    /// Sum of a series, zero when the series is not registered.
    #[must_use]
    pub fn sum(&self, series: &str) -> f64 {
        self.metrics.get(series).map_or(0.0, |a| a.sum)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in rumstat.
///
/// Malformed bundles are never an error. Extractor panics are not caught
/// and surface to the caller unchanged.
#[derive(Debug, Error)]
pub enum RumError {
    /// A facet or series was registered after bundles were loaded.
    #[error("Cannot register {kind} '{name}' after bundles were loaded")]
    RegistrationAfterLoad { kind: &'static str, name: String },

    /// A URL group pattern could not be compiled.
    #[error("Invalid URL pattern '{0}'")]
    InvalidPattern(String),

    /// A caller-supplied value is outside what the operation accepts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_folds_values() {
        let mut agg = Aggregate::new();
        agg.add(3.0);
        agg.add(5.0);

        assert_eq!(agg.sum, 8.0);
        assert_eq!(agg.count, 2);
        assert_eq!(agg.min, Some(3.0));
        assert_eq!(agg.max, Some(5.0));
        assert_eq!(agg.mean(), Some(4.0));
    }

    #[test]
    fn empty_aggregate_has_no_bounds() {
        let agg = Aggregate::new();
        assert!(agg.is_empty());
        assert_eq!(agg.min, None);
        assert_eq!(agg.max, None);
        assert_eq!(agg.mean(), None);
        assert_eq!(agg.percentile(75.0), None);
    }

    #[test]
    fn percentile_nearest_rank() {
        let mut agg = Aggregate::retaining();
        for v in [40.0, 10.0, 30.0, 20.0] {
            agg.add(v);
        }
        assert_eq!(agg.percentile(75.0), Some(30.0));
        assert_eq!(agg.percentile(100.0), Some(40.0));
        assert_eq!(agg.percentile(0.0), Some(10.0));
        assert_eq!(agg.percentile(50.0), Some(20.0));
    }

    #[test]
    fn plain_aggregate_keeps_no_values() {
        let mut agg = Aggregate::new();
        agg.add(10.0);
        agg.add(20.0);

        assert_eq!(agg.count, 2);
        assert!(agg.values().is_empty());
        assert_eq!(agg.percentile(75.0), None);
    }

    #[test]
    fn blank_keys() {
        assert!(FacetKey::default().is_blank());
        assert!(FacetKey::single("").is_blank());
        assert!(FacetKey::new(["", ""]).is_blank());
        assert!(!FacetKey::new(["", "mobile"]).is_blank());
        assert!(!FacetKey::single("https://a.com/").is_blank());
    }

    #[test]
    fn facet_key_encode_escapes_separator() {
        let key = FacetKey::new(["https://a.com/?x=1|2", "mobile"]);
        assert_eq!(key.encode(), "https://a.com/?x=1\\|2|mobile");
        assert_eq!(FacetKey::parse(&key.encode()).expect("parse"), key);
    }

    #[test]
    fn facet_key_parts_do_not_collide() {
        let a = FacetKey::new(["a|b", "c"]);
        let b = FacetKey::new(["a", "b|c"]);
        assert_ne!(a, b);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn facet_key_parse_rejects_bad_escape() {
        assert!(FacetKey::parse("abc\\").is_err());
        assert!(FacetKey::parse("a\\nb").is_err());
    }

    #[test]
    fn facet_key_serializes_single_part_as_string() {
        let single = serde_json::to_string(&FacetKey::single("x")).expect("ser");
        assert_eq!(single, "\"x\"");

        let multi = serde_json::to_string(&FacetKey::new(["x", "y"])).expect("ser");
        assert_eq!(multi, "[\"x\",\"y\"]");
    }

    #[test]
    fn bundle_tolerates_missing_fields() {
        let bundle: Bundle = serde_json::from_str(r#"{"url":"https://a.com/"}"#).expect("parse");
        assert!(bundle.events.is_empty());
        assert_eq!(bundle.weight, None);
        assert_eq!(bundle.weight_or_zero(), 0.0);
    }

    #[test]
    fn bundle_tolerates_null_events_and_numeric_targets() {
        let json = r#"{
            "id": "BSX",
            "url": "https://a.com/",
            "time": "2024-05-26T05:00:02.706Z",
            "weight": 100,
            "userAgent": "mobile:ios",
            "events": [
                {"checkpoint": "loadresource", "target": 4, "source": "https://a.com/nav.html"},
                {"checkpoint": "cwv-lcp", "value": "1234.5"}
            ]
        }"#;
        let bundle: Bundle = serde_json::from_str(json).expect("parse");
        assert_eq!(bundle.events[0].target.as_deref(), Some("4"));
        assert_eq!(bundle.events[1].value, Some(1234.5));
        assert_eq!(bundle.device_type(), Some("mobile"));
        assert_eq!(
            bundle.time,
            Some(BundleTime::Iso("2024-05-26T05:00:02.706Z".to_string()))
        );

        let nulls: Bundle =
            serde_json::from_str(r#"{"url":null,"events":null,"weight":null}"#).expect("parse");
        assert!(nulls.url.is_empty());
        assert!(nulls.events.is_empty());
    }

    #[test]
    fn bundle_field_names_round_trip() {
        let bundle = Bundle::new("https://a.com/", 10.0)
            .with_user_agent("desktop:windows")
            .with_event(Event::new("click").with_source(".btn"));
        let json = serde_json::to_value(&bundle).expect("ser");

        assert_eq!(json["url"], "https://a.com/");
        assert_eq!(json["weight"], 10.0);
        assert_eq!(json["userAgent"], "desktop:windows");
        assert_eq!(json["events"][0]["checkpoint"], "click");
        assert_eq!(json["events"][0]["source"], ".btn");
    }

    #[test]
    fn bundle_fields_of_odd_shape_read_as_absent() {
        let bundle: Bundle = serde_json::from_str(
            r#"{"id":12345,"url":"https://a.com/","time":true,"weight":10,
                "events":[{"checkpoint":5},"junk",{"checkpoint":"click"}]}"#,
        )
        .expect("parse");

        assert_eq!(bundle.id.as_deref(), Some("12345"));
        assert_eq!(bundle.time, None);
        assert_eq!(bundle.events.len(), 2);
        assert_eq!(bundle.events[0].checkpoint, "5");
        assert!(bundle.events[1].is("click"));

        let object_time: Bundle =
            serde_json::from_str(r#"{"time":{"ms":1},"events":{"not":"a list"}}"#).expect("parse");
        assert_eq!(object_time.time, None);
        assert!(object_time.events.is_empty());

        let epoch: Bundle = serde_json::from_str(r#"{"time":1716699602706}"#).expect("parse");
        assert_eq!(epoch.time, Some(BundleTime::Epoch(1716699602706.0)));
    }
}

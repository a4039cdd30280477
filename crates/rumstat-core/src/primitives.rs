//! # Primitives
//!
//! Fixed checkpoint names and default thresholds shared by the engine,
//! the built-in extractors and the report handlers.
//!
//! Thresholds here are defaults only. Report options and the application
//! configuration may override every one of them.

// =============================================================================
// CHECKPOINTS
// =============================================================================

/// Checkpoint emitted when a visitor is exposed to an experiment variant.
/// `source` names the experiment, `target` names the variant.
pub const EXPERIMENT_CHECKPOINT: &str = "experiment";

/// Interaction checkpoints counted by the experiment report.
pub const METRIC_CHECKPOINTS: [&str; 3] = ["click", "convert", "formsubmit"];

/// Click checkpoint.
pub const CLICK_CHECKPOINT: &str = "click";

/// Page entry checkpoint.
pub const ENTER_CHECKPOINT: &str = "enter";

/// Prefix of web-vitals checkpoints (`cwv-lcp`, `cwv-cls`, ...).
pub const CWV_PREFIX: &str = "cwv-";

/// Web-vitals metrics tracked by the URL-group report.
pub const CWV_METRICS: [&str; 4] = ["lcp", "cls", "inp", "ttfb"];

/// Variant name treated as the baseline when scoring experiments.
pub const CONTROL_VARIANT: &str = "control";

/// Aggregate key used for "any source" within a checkpoint.
pub const ANY_SOURCE: &str = "*";

// =============================================================================
// REPORT DEFAULTS
// =============================================================================

/// Clicks on one selector within one bundle that make a rage click.
pub const DEFAULT_RAGE_CLICK_THRESHOLD: usize = 10;

/// Minimum share (percent) of a page's samples showing the rage click.
pub const DEFAULT_RAGE_CLICK_PERCENT_THRESHOLD: f64 = 5.0;

/// Minimum weighted page views for a page to be reported.
pub const DEFAULT_PAGE_VIEW_THRESHOLD: f64 = 5000.0;

/// Rage-clicking samples a selector needs before its share counts.
pub const DEFAULT_RAGE_CLICK_MIN_SAMPLES: usize = 10;

/// Rage-clicking samples that report a selector whatever its share.
pub const DEFAULT_RAGE_CLICK_SAMPLES_OVERRIDE: usize = 100;

/// Percentile reported for web-vitals metrics.
pub const CWV_PERCENTILE: f64 = 75.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cwv_checkpoints_are_prefixed() {
        for metric in CWV_METRICS {
            let checkpoint = format!("{}{}", CWV_PREFIX, metric);
            assert!(checkpoint.starts_with("cwv-"));
        }
    }

    #[test]
    fn experiment_checkpoint_is_not_a_metric() {
        assert!(!METRIC_CHECKPOINTS.contains(&EXPERIMENT_CHECKPOINT));
    }
}

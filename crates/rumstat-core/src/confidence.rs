//! # Confidence Module
//!
//! Two-sample significance for A/B results (Welch's t-test).
//!
//! - Inputs are two binomial samples `(conversions, samples)`
//! - Output is a confidence percentage in `[0, 100]`
//! - Insufficient data yields `0`, never an error
//! - Zero variance in both arms yields `100` with no p-value; that means no
//!   detectable difference, so it is never reported as significant
//!
//! Stateless and independent of the aggregation engine.

use serde::Serialize;

/// Confidence at or above which a difference is reported as significant.
pub const SIGNIFICANCE_THRESHOLD: f64 = 95.0;

/// Full result of one Welch's t-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelchTest {
    pub control_rate: f64,
    pub test_rate: f64,
    /// `0.0` on the zero-variance branch.
    pub t_stat: f64,
    /// `None` on the zero-variance branch.
    pub degrees_of_freedom: Option<f64>,
    /// Two-tailed p-value, `None` on the zero-variance branch.
    pub p_value: Option<f64>,
    /// `(1 - p) * 100`, rounded to two decimals and clamped to `[0, 100]`.
    pub confidence: f64,
}

impl WelchTest {
    /// Check whether the test found a difference at `threshold` percent.
    ///
    /// Always false on the zero-variance branch, where no p-value exists.
    #[must_use]
    pub fn reaches(&self, threshold: f64) -> bool {
        self.p_value.is_some() && self.confidence >= threshold
    }

    /// [`WelchTest::reaches`] at [`SIGNIFICANCE_THRESHOLD`].
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.reaches(SIGNIFICANCE_THRESHOLD)
    }
}

/// Check a bare confidence percentage against [`SIGNIFICANCE_THRESHOLD`].
///
/// Prefer [`WelchTest::is_significant`], which also rejects the
/// zero-variance score of `100`.
#[must_use]
pub fn is_significant(confidence: f64) -> bool {
    confidence >= SIGNIFICANCE_THRESHOLD
}

/// Confidence that the test rate differs from the control rate.
///
/// Returns `0` when either arm has at most one sample or a negative
/// conversion count. Returns `100` when both arms have zero variance.
///
/// ```
/// use rumstat_core::calculate_confidence;
///
/// assert_eq!(calculate_confidence(1.0, 1.0, 5.0, 50.0), 0.0);
/// assert_eq!(calculate_confidence(0.0, 10.0, 0.0, 10.0), 100.0);
/// assert!(calculate_confidence(50.0, 100.0, 50.0, 100.0) < 1.0);
/// ```
#[must_use]
pub fn calculate_confidence(
    control_conversions: f64,
    control_samples: f64,
    test_conversions: f64,
    test_samples: f64,
) -> f64 {
    welch_t_test(control_conversions, control_samples, test_conversions, test_samples)
        .map_or(0.0, |test| test.confidence)
}

/// Run Welch's t-test on two binomial samples.
///
/// `None` on insufficient data (same guard as [`calculate_confidence`]).
#[must_use]
pub fn welch_t_test(
    control_conversions: f64,
    control_samples: f64,
    test_conversions: f64,
    test_samples: f64,
) -> Option<WelchTest> {
    let usable = control_samples > 1.0
        && test_samples > 1.0
        && control_conversions >= 0.0
        && test_conversions >= 0.0;
    if !usable {
        return None;
    }

    let control_rate = control_conversions / control_samples;
    let test_rate = test_conversions / test_samples;

    let control_var = control_rate * (1.0 - control_rate) / control_samples;
    let test_var = test_rate * (1.0 - test_rate) / test_samples;
    let combined_se = (control_var + test_var).sqrt();

    if combined_se == 0.0 {
        return Some(WelchTest {
            control_rate,
            test_rate,
            t_stat: 0.0,
            degrees_of_freedom: None,
            p_value: None,
            confidence: 100.0,
        });
    }

    let t_stat = (test_rate - control_rate) / combined_se;
    let df = (control_var + test_var).powi(2)
        / (control_var.powi(2) / (control_samples - 1.0)
            + test_var.powi(2) / (test_samples - 1.0));
    let p_value = student_t_two_tailed(t_stat, df);

    Some(WelchTest {
        control_rate,
        test_rate,
        t_stat,
        degrees_of_freedom: Some(df),
        p_value: Some(p_value),
        confidence: to_confidence(p_value),
    })
}

// NaN maps to 0 through `max`.
fn to_confidence(p_value: f64) -> f64 {
    let raw = (1.0 - p_value) * 100.0;
    ((raw * 100.0).round() / 100.0).max(0.0).min(100.0)
}

// =============================================================================
// STUDENT'S T DISTRIBUTION
// =============================================================================

/// Two-tailed p-value of Student's t-distribution: `P(|T| >= |t|)`.
fn student_t_two_tailed(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x)
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection.
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS_COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS_COEFFICIENTS[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

/// Regularized incomplete beta `I_x(a, b)`.
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();

    // The continued fraction converges fast only below this point.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

const CF_MAX_ITERATIONS: usize = 300;
const CF_EPSILON: f64 = 1e-15;
const CF_TINY: f64 = 1e-300;

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let not_tiny = |v: f64| if v.abs() < CF_TINY { CF_TINY } else { v };

    let mut c = 1.0;
    let mut d = 1.0 / not_tiny(1.0 - (a + b) * x / (a + 1.0));
    let mut h = d;

    for m in 1..=CF_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((a - 1.0 + m2) * (a + m2));
        d = 1.0 / not_tiny(1.0 + even * d);
        c = not_tiny(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + m2) * (a + 1.0 + m2));
        d = 1.0 / not_tiny(1.0 + odd * d);
        c = not_tiny(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPSILON {
            break;
        }
    }
    h
}

// =============================================================================
// TESTS
// =============================================================================

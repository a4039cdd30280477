//! # API Request/Response Types
//!
//! JSON bodies for the HTTP API. Report and facet requests take bundles in
//! either accepted shape (see [`crate::input::BundlesPayload`]).

use crate::input::BundlesPayload;
use rumstat_core::{FacetQuery, Report, ReportKind, WelchTest};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// REPORT RESPONSE
// =============================================================================

/// Result of `POST /report/{kind}`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub kind: ReportKind,
    pub entries: usize,
    pub report: Report,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self {
            kind: report.kind(),
            entries: report.len(),
            report,
        }
    }
}

// =============================================================================
// FACETS REQUEST
// =============================================================================

/// Body of `POST /facets`.
#[derive(Debug, Clone, Deserialize)]
pub struct FacetsRequest {
    pub bundles: BundlesPayload,
    #[serde(default)]
    pub facets: Vec<String>,
    #[serde(default)]
    pub series: Vec<String>,
}

impl FacetsRequest {
    /// Split into the bundle set and the query.
    #[must_use]
    pub fn into_parts(self) -> (BundlesPayload, FacetQuery) {
        (
            self.bundles,
            FacetQuery {
                facets: self.facets,
                series: self.series,
            },
        )
    }
}

// =============================================================================
// CONFIDENCE REQUEST/RESPONSE
// =============================================================================

/// Body of `POST /confidence`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceRequest {
    pub control_conversions: f64,
    pub control_samples: f64,
    pub test_conversions: f64,
    pub test_samples: f64,
}

/// Body of `POST /confidence`.
///
/// `significant` follows [`WelchTest::is_significant`].
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceResponse {
    pub confidence: f64,
    pub significant: bool,
    /// Absent when either arm has too few samples.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<WelchTest>,
}

impl From<Option<WelchTest>> for ConfidenceResponse {
    fn from(details: Option<WelchTest>) -> Self {
        let confidence = details.map_or(0.0, |t| t.confidence);
        Self {
            confidence,
            significant: details.is_some_and(|t| t.is_significant()),
            details,
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

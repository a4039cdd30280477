//! Unit tests for API types serialization/deserialization.

#![allow(clippy::unwrap_used, clippy::panic)]

use rumstat::api::{
    ConfidenceRequest, ConfidenceResponse, ErrorResponse, FacetsRequest, HealthResponse,
    ReportResponse,
};
use rumstat_core::{Report, ReportKind, welch_t_test};
use serde_json::json;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let health: HealthResponse =
        serde_json::from_str(r#"{"status":"healthy","version":"1.0.0"}"#).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

// =============================================================================
// REPORT RESPONSE
// =============================================================================

#[test]
fn test_report_response_counts_entries() {
    let response = ReportResponse::from(Report::RageClick(Vec::new()));
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(response.kind, ReportKind::RageClick);
    assert_eq!(json["kind"], "rageclick");
    assert_eq!(json["entries"], 0);
    assert_eq!(json["report"], json!([]));
}

// =============================================================================
// FACETS REQUEST
// =============================================================================

#[test]
fn test_facets_request_defaults_to_no_names() {
    let request: FacetsRequest =
        serde_json::from_value(json!({ "bundles": [{ "url": "https://a.com/" }] })).unwrap();
    let (payload, query) = request.into_parts();

    assert_eq!(payload.into_bundles().len(), 1);
    assert!(query.facets.is_empty());
    assert!(query.series.is_empty());
}

#[test]
fn test_facets_request_accepts_envelope() {
    let request: FacetsRequest = serde_json::from_value(json!({
        "bundles": { "rumBundles": [{ "url": "https://a.com/" }, { "url": "https://b.com/" }] },
        "facets": ["url"],
        "series": ["pageViews", "lcp"]
    }))
    .unwrap();
    let (payload, query) = request.into_parts();

    assert_eq!(payload.into_bundles().len(), 2);
    assert_eq!(query.facets, vec!["url"]);
    assert_eq!(query.series, vec!["pageViews", "lcp"]);
}

#[test]
fn test_facets_request_requires_bundles() {
    let result = serde_json::from_value::<FacetsRequest>(json!({ "facets": ["url"] }));
    assert!(result.is_err());
}

// =============================================================================
// CONFIDENCE REQUEST/RESPONSE
// =============================================================================

#[test]
fn test_confidence_request_uses_camel_case() {
    let request: ConfidenceRequest = serde_json::from_value(json!({
        "controlConversions": 5,
        "controlSamples": 100,
        "testConversions": 9.5,
        "testSamples": 100
    }))
    .unwrap();

    assert_eq!(request.control_conversions, 5.0);
    assert_eq!(request.test_conversions, 9.5);
}

#[test]
fn test_confidence_request_missing_field() {
    let result =
        serde_json::from_value::<ConfidenceRequest>(json!({ "controlConversions": 5 }));
    assert!(result.is_err());
}

#[test]
fn test_confidence_response_zero_variance() {
    let response = ConfidenceResponse::from(welch_t_test(0.0, 10.0, 0.0, 10.0));
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(response.confidence, 100.0);
    assert!(!response.significant);
    assert!(json["details"]["pValue"].is_null());
    assert!(json["details"]["degreesOfFreedom"].is_null());
}

#[test]
fn test_confidence_response_without_details() {
    let response = ConfidenceResponse::from(None);
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json, json!({ "confidence": 0.0, "significant": false }));
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

#[test]
fn test_error_response_roundtrip() {
    let error = ErrorResponse::new("Invalid input: unknown facet 'x'");
    let json = serde_json::to_string(&error).unwrap();
    let back: ErrorResponse = serde_json::from_str(&json).unwrap();
    assert_eq!(back.error, error.error);
}

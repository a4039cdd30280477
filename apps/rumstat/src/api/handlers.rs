//! # API Endpoint Handlers
//!
//! Every request builds its own engine; nothing is shared between requests
//! apart from the configuration. Report work runs on the blocking pool.

use super::{
    AppState,
    types::{
        ConfidenceRequest, ConfidenceResponse, ErrorResponse, FacetsRequest, HealthResponse,
        ReportResponse,
    },
};
use crate::input::BundlesPayload;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rumstat_core::{ReportKind, RumError, run_facets, run_report, welch_t_test};

// =============================================================================
// ERROR MAPPING
// =============================================================================

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (status, Json(ErrorResponse::new(error.to_string()))).into_response()
}

fn status_for(error: &RumError) -> StatusCode {
    match error {
        RumError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

async fn blocking<T, F>(work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RumError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(status_for(&e), e)),
        Err(e) => {
            tracing::error!(error = %e, "blocking task failed");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
            ))
        }
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// REPORT HANDLER
// =============================================================================

/// Run a named report over the posted bundles.
pub async fn report_handler(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(payload): Json<BundlesPayload>,
) -> Response {
    let kind = match kind.parse::<ReportKind>() {
        Ok(kind) => kind,
        Err(e) => return error_response(StatusCode::NOT_FOUND, e),
    };

    let options = state.config.report_options();
    let bundles = payload.into_bundles();
    tracing::debug!(report = %kind, bundles = bundles.len(), "report requested");

    match blocking(move || run_report(kind, bundles, &options)).await {
        Ok(report) => (StatusCode::OK, Json(ReportResponse::from(report))).into_response(),
        Err(response) => response,
    }
}

// =============================================================================
// FACETS HANDLER
// =============================================================================

/// Compute built-in facets and series over the posted bundles.
pub async fn facets_handler(Json(request): Json<FacetsRequest>) -> Response {
    let (payload, query) = request.into_parts();
    let bundles = payload.into_bundles();

    match blocking(move || run_facets(bundles, &query)).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(response) => response,
    }
}

// =============================================================================
// CONFIDENCE HANDLER
// =============================================================================

/// Score two conversion samples.
pub async fn confidence_handler(Json(request): Json<ConfidenceRequest>) -> impl IntoResponse {
    let details = welch_t_test(
        request.control_conversions,
        request.control_samples,
        request.test_conversions,
        request.test_samples,
    );
    Json(ConfidenceResponse::from(details))
}

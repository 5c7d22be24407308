//! Liveness and metrics endpoints.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::{ApiResponse, AppState, HealthStatus};

/// `GET /api/health`
///
/// Reports 503 when the database does not answer.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthStatus {
            status: if database { "ok" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime: state.start_time.elapsed().as_secs(),
            database,
        })),
    )
        .into_response()
}

/// `GET /api/metrics`
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state.prometheus_handle.as_ref().map_or_else(
        || {
            (
                StatusCode::NOT_FOUND,
                "Metrics not enabled or failed to initialize",
            )
                .into_response()
        },
        |handle| handle.render().into_response(),
    )
}

//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::WebResult;
use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use seatlock_core::LockStore;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK while the process is serving. Does not touch the store.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Whether the lock store answered a ping
    pub store: bool,
}

/// Readiness check endpoint.
///
/// Pings the lock store. 200 when it answers, 503 otherwise.
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
///
/// # Errors
///
/// Returns a 503 [`AppError`] when the store does not answer.
pub async fn readiness_check<S: LockStore>(
    State(state): State<AppState<S>>,
) -> WebResult<Json<ReadinessResponse>> {
    state.store.ping().await.map_err(|e| {
        AppError::unavailable("Lock store unreachable").with_source(anyhow::Error::new(e))
    })?;
    Ok(Json(ReadinessResponse {
        ready: true,
        store: true,
    }))
}

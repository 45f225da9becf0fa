//! Monitoring and administrative endpoints.
//!
//! - `GET    /api/events/:event_id/locks` - currently locked seats
//! - `GET    /api/events/:event_id/queue` - queue length, worker state, wait estimate
//! - `DELETE /api/events/:event_id/queue` - drop all waiting requests
//! - `GET    /api/events/:event_id/load`  - admission load and status

use crate::WebResult;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use seatlock_core::{LoadStats, LockStore, LockedSeat, QueueStats};
use serde::Serialize;

/// Seats currently locked for an event, sorted by seat id.
pub async fn list_locks<S: LockStore>(
    Path(event_id): Path<String>,
    State(state): State<AppState<S>>,
) -> WebResult<Json<Vec<LockedSeat>>> {
    let seats = state.controller.manager().list_locked(&event_id).await?;
    Ok(Json(seats))
}

/// Queue snapshot for an event.
pub async fn queue_stats<S: LockStore>(
    Path(event_id): Path<String>,
    State(state): State<AppState<S>>,
) -> WebResult<Json<QueueStats>> {
    let stats = state.controller.queue().queue_stats(&event_id).await?;
    Ok(Json(stats))
}

/// Response of the queue clearing endpoint.
#[derive(Debug, Serialize)]
pub struct ClearQueueResponse {
    /// Event whose queue was cleared
    pub event_id: String,
    /// Requests that were waiting
    pub cleared: u64,
}

/// Drop every waiting request of an event.
///
/// Callers polling for those requests will see 404 until they give up.
pub async fn clear_queue<S: LockStore>(
    Path(event_id): Path<String>,
    State(state): State<AppState<S>>,
) -> WebResult<Json<ClearQueueResponse>> {
    let cleared = state.controller.queue().clear_queue(&event_id).await?;
    Ok(Json(ClearQueueResponse { event_id, cleared }))
}

/// Admission load for an event.
pub async fn load_stats<S: LockStore>(
    Path(event_id): Path<String>,
    State(state): State<AppState<S>>,
) -> WebResult<Json<LoadStats>> {
    let stats = state.controller.get_load_stats(&event_id).await?;
    Ok(Json(stats))
}

//! Seat lock endpoints.
//!
//! - `POST   /api/events/:event_id/seats/:seat_id/lock` - lock
//! - `PUT    /api/events/:event_id/seats/:seat_id/lock` - extend
//! - `DELETE /api/events/:event_id/seats/:seat_id/lock` - release
//! - `GET    /api/events/:event_id/seats/:seat_id`      - inspect
//!
//! Lock, extend and release go through admission control. The status code
//! tells the caller which path was taken:
//!
//! | Outcome                     | Status |
//! |-----------------------------|--------|
//! | Applied, succeeded          | 200    |
//! | Queued                      | 202    |
//! | Applied, refused            | 409    |
//! | Missing field or bad action | 400    |

use crate::WebResult;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use seatlock_core::{AdmissionOutcome, LockAction, LockRequest, LockStatus, LockStore};
use serde::{Deserialize, Serialize};

/// Body of lock, extend and release requests.
///
/// A missing or unreadable body counts as empty, so admission reports the
/// missing `user_id` instead of the extractor rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct SeatActionBody {
    /// Acting user
    pub user_id: Option<String>,
}

/// Response to a lock, extend or release request.
///
/// `queued` tells whether the outcome is already known (`false`) or must be
/// polled for with `request_id` (`true`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatActionResponse {
    /// Whether the action took effect (`true` for accepted queued requests)
    pub success: bool,
    /// Whether the action was deferred to the queue
    pub queued: bool,
    /// Outcome message (direct path and rejections)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Action applied (direct path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<LockAction>,
    /// Fields that were missing (rejections)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    /// Correlation id to poll (queued path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Queue position after enqueue (queued path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    /// Rough wait estimate in milliseconds (queued path)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_ms: Option<u64>,
}

impl SeatActionResponse {
    /// HTTP status for an admission outcome.
    #[must_use]
    pub const fn status_for(outcome: &AdmissionOutcome) -> StatusCode {
        match outcome {
            AdmissionOutcome::Rejected { .. }
            | AdmissionOutcome::Applied {
                action: LockAction::Other(_),
                ..
            } => StatusCode::BAD_REQUEST,
            AdmissionOutcome::Queued { .. } => StatusCode::ACCEPTED,
            AdmissionOutcome::Applied { success: true, .. } => StatusCode::OK,
            AdmissionOutcome::Applied { success: false, .. } => StatusCode::CONFLICT,
        }
    }
}

impl From<AdmissionOutcome> for SeatActionResponse {
    fn from(outcome: AdmissionOutcome) -> Self {
        let empty = Self {
            success: false,
            queued: false,
            message: None,
            action: None,
            missing_fields: Vec::new(),
            request_id: None,
            queue_position: None,
            estimated_wait_ms: None,
        };
        match outcome {
            AdmissionOutcome::Rejected {
                message,
                missing_fields,
            } => Self {
                message: Some(message),
                missing_fields,
                ..empty
            },
            AdmissionOutcome::Applied {
                success,
                message,
                action,
            } => Self {
                success,
                message: Some(message),
                action: Some(action),
                ..empty
            },
            AdmissionOutcome::Queued {
                request_id,
                queue_position,
                estimated_wait_ms,
            } => Self {
                success: true,
                queued: true,
                request_id: Some(request_id),
                queue_position: Some(queue_position),
                estimated_wait_ms: Some(estimated_wait_ms),
                ..empty
            },
        }
    }
}

async fn submit<S: LockStore>(
    state: &AppState<S>,
    event_id: String,
    seat_id: String,
    body: Option<Json<SeatActionBody>>,
    action: LockAction,
) -> WebResult<(StatusCode, Json<SeatActionResponse>)> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let request = LockRequest {
        event_id: Some(event_id),
        seat_id: Some(seat_id),
        user_id: body.user_id,
        action: Some(action.as_str().to_string()),
    };
    let outcome = state.controller.process_request(request).await?;
    let status = SeatActionResponse::status_for(&outcome);
    Ok((status, Json(outcome.into())))
}

/// Lock a seat for the user.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/20/seats/A1/lock \
///   -H 'Content-Type: application/json' -d '{"user_id":"alice"}'
/// # {"success":true,"queued":false,"message":"Seat locked","action":"lock"}
/// ```
pub async fn lock_seat<S: LockStore>(
    Path((event_id, seat_id)): Path<(String, String)>,
    State(state): State<AppState<S>>,
    body: Option<Json<SeatActionBody>>,
) -> WebResult<(StatusCode, Json<SeatActionResponse>)> {
    submit(&state, event_id, seat_id, body, LockAction::Lock).await
}

/// Extend the user's lock to the checkout TTL.
pub async fn extend_lock<S: LockStore>(
    Path((event_id, seat_id)): Path<(String, String)>,
    State(state): State<AppState<S>>,
    body: Option<Json<SeatActionBody>>,
) -> WebResult<(StatusCode, Json<SeatActionResponse>)> {
    submit(&state, event_id, seat_id, body, LockAction::Extend).await
}

/// Release the user's lock.
pub async fn release_lock<S: LockStore>(
    Path((event_id, seat_id)): Path<(String, String)>,
    State(state): State<AppState<S>>,
    body: Option<Json<SeatActionBody>>,
) -> WebResult<(StatusCode, Json<SeatActionResponse>)> {
    submit(&state, event_id, seat_id, body, LockAction::Release).await
}

/// Current lock state of a seat. Never modifies it.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/api/events/20/seats/A1
/// # {"locked":true,"owner_user_id":"alice","acquired_at":"...","ttl_remaining":57}
/// ```
pub async fn get_seat_status<S: LockStore>(
    Path((event_id, seat_id)): Path<(String, String)>,
    State(state): State<AppState<S>>,
) -> WebResult<Json<LockStatus>> {
    let status = state.controller.manager().inspect(&event_id, &seat_id).await?;
    Ok(Json(status))
}

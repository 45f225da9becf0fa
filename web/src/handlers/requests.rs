//! Queued request results.
//!
//! - `GET /api/requests/:request_id`              - current result, 404 if not there yet
//! - `GET /api/requests/:request_id?wait_secs=N`  - block up to N seconds, 408 on timeout
//!
//! A 404 cannot tell "still queued" from "result expired".

use crate::WebResult;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use seatlock_core::{LockStore, RequestResult};
use serde::Deserialize;
use std::time::Duration;

/// Query parameters of the result endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ResultQuery {
    /// Seconds to wait for the result; capped by the configured poll timeout
    pub wait_secs: Option<u64>,
}

/// Fetch (or wait for) the outcome of a queued request.
///
/// # Example
///
/// ```bash
/// curl 'http://localhost:8080/api/requests/5f0c...?wait_secs=10'
/// # {"request_id":"5f0c...","success":true,"message":"Seat locked",...}
/// ```
pub async fn get_request_result<S: LockStore>(
    Path(request_id): Path<String>,
    Query(query): Query<ResultQuery>,
    State(state): State<AppState<S>>,
) -> WebResult<Json<RequestResult>> {
    let queue = state.controller.queue();

    match query.wait_secs.filter(|secs| *secs > 0) {
        Some(secs) => {
            let budget = Duration::from_secs(secs).min(state.max_result_wait());
            Ok(Json(queue.wait_for_result(&request_id, budget).await?))
        }
        None => queue
            .get_result(&request_id)
            .await?
            .map(Json)
            .ok_or_else(|| AppError::not_found("Request", &request_id)),
    }
}

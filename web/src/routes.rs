//! Router configuration.

use crate::handlers::{health, monitoring, requests, seats};
use crate::middleware::request_tracking_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use seatlock_core::LockStore;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Health checks sit at the root; everything else is nested under `/api`.
/// The metrics endpoint is served by the binary, not here.
pub fn build_router<S: LockStore>(state: AppState<S>) -> Router {
    let api_routes = Router::new()
        // Seat leases
        .route(
            "/events/:event_id/seats/:seat_id/lock",
            post(seats::lock_seat::<S>)
                .put(seats::extend_lock::<S>)
                .delete(seats::release_lock::<S>),
        )
        .route(
            "/events/:event_id/seats/:seat_id",
            get(seats::get_seat_status::<S>),
        )
        // Monitoring
        .route("/events/:event_id/locks", get(monitoring::list_locks::<S>))
        .route(
            "/events/:event_id/queue",
            get(monitoring::queue_stats::<S>).delete(monitoring::clear_queue::<S>),
        )
        .route("/events/:event_id/load", get(monitoring::load_stats::<S>))
        // Queued results
        .route(
            "/requests/:request_id",
            get(requests::get_request_result::<S>),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check::<S>))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(request_tracking_layer())
}

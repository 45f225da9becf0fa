//! Axum HTTP surface for seat leases.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** path ids and the JSON body
//! 3. **Admit** through the `AdmissionController` (direct or queued)
//! 4. **Map** the outcome to a status code and JSON body
//!
//! # Example
//!
//! ```ignore
//! use seatlock_core::LockConfig;
//! use seatlock_runtime::AdmissionController;
//! use seatlock_testing::InMemoryLockStore;
//! use seatlock_web::{AppState, build_router};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryLockStore::new());
//! let controller = AdmissionController::from_store(Arc::clone(&store), LockConfig::default());
//! let app = build_router(AppState::new(controller, store));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, request_tracking_layer};
pub use routes::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

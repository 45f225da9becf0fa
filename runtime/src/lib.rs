//! # Seatlock Runtime
//!
//! Lease coordination over a [`LockStore`](seatlock_core::LockStore).
//!
//! ## Core Components
//!
//! - **Seat Lock Manager** ([`SeatLockManager`]): acquire, inspect, extend and release seat leases
//! - **Request Queue** ([`RequestQueue`]): per-event FIFO with one self-managing worker per event
//! - **Admission Controller** ([`AdmissionController`]): applies directly or queues based on load
//!
//! ## Example
//!
//! ```ignore
//! use seatlock_core::{LockConfig, LockRequest};
//! use seatlock_runtime::AdmissionController;
//! use seatlock_testing::InMemoryLockStore;
//! use std::sync::Arc;
//!
//! let controller = AdmissionController::from_store(
//!     Arc::new(InMemoryLockStore::new()),
//!     LockConfig::default(),
//! );
//!
//! let outcome = controller
//!     .process_request(LockRequest::new("20", "A1", "alice", "lock"))
//!     .await?;
//!
//! if let Some(request_id) = outcome.request_id() {
//!     let result = controller
//!         .queue()
//!         .wait_for_result(request_id, std::time::Duration::from_secs(30))
//!         .await?;
//! }
//! ```

/// Load-adaptive routing between the direct path and the queue
pub mod admission;

/// Seat lease operations
pub mod lock_manager;

/// Prometheus metrics for observability
pub mod metrics;

/// Per-event request queue and its workers
pub mod queue;

/// Per-event worker registry
pub mod worker;

pub use admission::{AdmissionController, should_queue};
pub use lock_manager::SeatLockManager;
pub use queue::{EnqueueReceipt, RequestQueue};
pub use worker::WorkerSupervisor;

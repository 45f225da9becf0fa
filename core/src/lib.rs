//! # Seatlock Core
//!
//! Core types and traits for time-bounded, single-owner seat leases.
//!
//! This crate has no I/O of its own. It defines what the runtime components
//! operate on and what they require of the backing store.
//!
//! ## Core Concepts
//!
//! - **Lease** ([`SeatLock`]): an exclusive claim on `(event, seat)` that the store expires by TTL
//! - **Queue item** ([`QueueItem`]): a deferred lock/extend/release action, processed FIFO per event
//! - **Request result** ([`RequestResult`]): the short-lived outcome of a queued action
//! - **Store** ([`LockStore`]): atomic conditional writes, expiry and blocking list pops
//!
//! ## Error Taxonomy
//!
//! - Validation failures of `process_request` are structured outcomes ([`AdmissionOutcome::Rejected`])
//! - Contention (seat held, wrong owner, key vanished) is a `false`, not an error
//! - Store failures and polling timeouts are [`LockError`]s

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::LockConfig;
pub use error::{LockError, Result};
pub use store::{KeyTtl, LockStore};
pub use types::{
    AdmissionOutcome, DispatchOutcome, LoadStats, LoadStatus, LockAction, LockRequest,
    LockStatus, LockedSeat, QueueItem, QueueStats, RequestResult, SeatCommand, SeatKey, SeatLock,
};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Lease timestamps and `processed_at` stamps are taken from the clock;
    /// expiry itself is always the store's job.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

//! HTTP request handlers.
//!
//! - [`seats`]: lock, extend, release and inspect seats
//! - [`requests`]: poll queued request results
//! - [`monitoring`]: lock listings, queue and load statistics, queue clearing
//! - [`health`]: liveness and readiness

pub mod health;
pub mod monitoring;
pub mod requests;
pub mod seats;

pub use health::{health_check, readiness_check};

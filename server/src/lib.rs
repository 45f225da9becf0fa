//! Seatlock server: configuration and wiring for the `seatlock-server` binary.

pub mod config;

pub use config::{Config, StoreBackend};

//! Error types for seat lease operations.
//!
//! Only failures that the caller cannot treat as a normal outcome are errors.
//! A seat that is already held, an ownership mismatch, or a key that expired
//! between a read and a conditional write are reported as `false` or as a
//! structured result, never through [`LockError`].

use std::time::Duration;
use thiserror::Error;

/// Result type alias for seat lease operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Failure modes that propagate to the caller boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    // ═══════════════════════════════════════════════════════════
    // Input Errors
    // ═══════════════════════════════════════════════════════════

    /// A required identifier was empty or not usable as a key segment.
    #[error("Invalid argument: {field} is empty or contains a reserved character")]
    InvalidArgument {
        /// Name of the offending field
        field: &'static str,
    },

    // ═══════════════════════════════════════════════════════════
    // Backing Store Errors
    // ═══════════════════════════════════════════════════════════

    /// The key-value store rejected or failed a command.
    #[error("Store error: {0}")]
    Store(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ═══════════════════════════════════════════════════════════
    // Waiting
    // ═══════════════════════════════════════════════════════════

    /// A polling caller gave up before the request was processed.
    ///
    /// The queued work is unaffected and keeps running.
    #[error("Timed out after {0:?} waiting for request result")]
    Timeout(Duration),
}

impl LockError {
    /// Returns `true` if this error was caused by caller input.
    ///
    /// # Examples
    ///
    /// ```
    /// # use seatlock_core::LockError;
    /// assert!(LockError::InvalidArgument { field: "seat_id" }.is_user_error());
    /// assert!(!LockError::Store("connection refused".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns `true` if the backing store is the source of the failure.
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Serialization(_))
    }
}

impl From<serde_json::Error> for LockError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

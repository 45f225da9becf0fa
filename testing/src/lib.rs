//! # Seatlock Testing
//!
//! Test doubles and the local-development store for seat lease coordination.
//!
//! This crate provides:
//! - [`InMemoryLockStore`]: a TTL-faithful, single-process [`LockStore`](seatlock_core::LockStore)
//! - [`SlowStore`] and [`FaultyStore`]: wrappers that inject latency and failures
//! - [`FixedClock`]: deterministic time for lease timestamps
//!
//! ## Example
//!
//! ```ignore
//! use seatlock_testing::InMemoryLockStore;
//! use seatlock_runtime::SeatLockManager;
//!
//! #[tokio::test]
//! async fn test_double_booking() {
//!     let manager = SeatLockManager::new(Arc::new(InMemoryLockStore::new()), LockConfig::default());
//!     assert!(manager.acquire("20", "A1", "alice").await.unwrap());
//!     assert!(!manager.acquire("20", "A1", "bob").await.unwrap());
//! }
//! ```

pub mod faults;
pub mod memory_store;

pub use faults::{FaultyStore, SlowStore};
pub use memory_store::InMemoryLockStore;

use chrono::{DateTime, Utc};
use seatlock_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use seatlock_testing::mocks::FixedClock;
    /// use seatlock_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

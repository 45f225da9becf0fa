//! Tunables for leases, the request queue and admission control.
//!
//! Loads from environment variables with the defaults below.

use std::env;
use std::time::Duration;

/// Floor for the result poll interval; shorter values would spin on the store.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lease, queue and admission settings shared by the runtime components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Lease length after `acquire` (seat selection)
    pub lock_ttl: Duration,
    /// Lease length after `extend` (checkout/payment)
    pub extended_lock_ttl: Duration,
    /// How long a queued request's result stays readable
    pub result_ttl: Duration,
    /// Length of the fixed load-counting window
    pub load_window: Duration,
    /// Requests per window above which admission switches to the queue
    pub load_threshold: u64,
    /// How long a worker blocks on an empty queue before checking whether to exit
    pub queue_pop_timeout: Duration,
    /// Interval between result polls in `wait_for_result`
    pub poll_interval: Duration,
    /// Default overall budget for `wait_for_result`
    pub poll_timeout: Duration,
    /// Per-item processing estimate used for wait-time estimates
    pub estimated_processing_time: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(60),
            extended_lock_ttl: Duration::from_secs(600),
            result_ttl: Duration::from_secs(60),
            load_window: Duration::from_secs(60),
            load_threshold: 100,
            queue_pop_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1000),
            poll_timeout: Duration::from_secs(30),
            estimated_processing_time: Duration::from_millis(100),
        }
    }
}

impl LockConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to [`LockConfig::default`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// The poll interval is raised to at least [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());
        let secs = |name: &str, default: Duration| parse(name).map_or(default, Duration::from_secs);
        let millis = |name: &str, default: Duration| parse(name).map_or(default, Duration::from_millis);

        Self {
            lock_ttl: secs("SEAT_LOCK_TTL_SECS", defaults.lock_ttl),
            extended_lock_ttl: secs("SEAT_LOCK_EXTENDED_TTL_SECS", defaults.extended_lock_ttl),
            result_ttl: secs("REQUEST_RESULT_TTL_SECS", defaults.result_ttl),
            load_window: secs("LOAD_WINDOW_SECS", defaults.load_window),
            load_threshold: parse("LOAD_THRESHOLD").unwrap_or(defaults.load_threshold),
            queue_pop_timeout: secs("QUEUE_POP_TIMEOUT_SECS", defaults.queue_pop_timeout),
            poll_interval: millis("RESULT_POLL_INTERVAL_MS", defaults.poll_interval)
                .max(MIN_POLL_INTERVAL),
            poll_timeout: secs("RESULT_POLL_TIMEOUT_SECS", defaults.poll_timeout),
            estimated_processing_time: millis(
                "QUEUE_ESTIMATED_PROCESSING_MS",
                defaults.estimated_processing_time,
            ),
        }
    }

    /// Builder-style override of the admission threshold.
    #[must_use]
    pub const fn with_load_threshold(mut self, threshold: u64) -> Self {
        self.load_threshold = threshold;
        self
    }

    /// Builder-style override of both lease lengths.
    #[must_use]
    pub const fn with_lock_ttls(mut self, lock_ttl: Duration, extended_lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self.extended_lock_ttl = extended_lock_ttl;
        self
    }

    /// Builder-style override of the result expiry.
    #[must_use]
    pub const fn with_result_ttl(mut self, result_ttl: Duration) -> Self {
        self.result_ttl = result_ttl;
        self
    }

    /// Builder-style override of the worker's blocking-pop timeout.
    #[must_use]
    pub const fn with_queue_pop_timeout(mut self, timeout: Duration) -> Self {
        self.queue_pop_timeout = timeout;
        self
    }
}

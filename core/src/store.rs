//! Key-value store abstraction backing every seat lease component.
//!
//! The store is the only shared mutable resource. All cross-request safety
//! rests on the atomicity of its individual commands: a conditional set either
//! happens or it doesn't, and no component holds an in-process lock across a
//! call into the store.
//!
//! # Implementations
//!
//! - `RedisLockStore` (`seatlock-redis`) - production, shared across processes
//! - `InMemoryLockStore` (`seatlock-testing`) - single process, for tests and local development
//!
//! # Key Namespaces
//!
//! Each component owns a disjoint prefix and is its only writer:
//!
//! | Prefix | Owner |
//! |--------|-------|
//! | `seat:lock:{event}:{seat}` | Seat lock manager |
//! | `seat:queue:{event}` | Request queue |
//! | `seat:result:{request}` | Request queue |
//! | `seat:load:{event}` | Admission controller |

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Remaining lifetime of a key, mirroring the Redis `TTL` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyTtl {
    /// Key expires in this many seconds
    Expires(u64),
    /// Key exists without an expiry (`-1`)
    Persistent,
    /// Key does not exist (`-2`)
    Missing,
}

impl KeyTtl {
    /// Interpret a raw `TTL` reply.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        match raw {
            -1 => Self::Persistent,
            secs if secs >= 0 => Self::Expires(secs.unsigned_abs()),
            _ => Self::Missing,
        }
    }

    /// Raw `TTL` reply: seconds, `-1` or `-2`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)] // Safe: TTLs are far below i64::MAX
    pub const fn as_raw(self) -> i64 {
        match self {
            Self::Expires(secs) => secs as i64,
            Self::Persistent => -1,
            Self::Missing => -2,
        }
    }

    /// Seconds remaining, if the key expires.
    #[must_use]
    pub const fn remaining(self) -> Option<u64> {
        match self {
            Self::Expires(secs) => Some(secs),
            Self::Persistent | Self::Missing => None,
        }
    }
}

/// Operations required of the backing key-value store.
///
/// Every method is a single atomic command. TTLs are whole seconds; a zero
/// duration is rounded up to one second by implementations.
///
/// # Example
///
/// ```no_run
/// use seatlock_core::store::LockStore;
/// use std::time::Duration;
///
/// # async fn example(store: impl LockStore) -> seatlock_core::Result<()> {
/// let created = store
///     .set_if_absent("seat:lock:20:A1", "alice:1700000000000", Duration::from_secs(60))
///     .await?;
/// assert!(created);
/// # Ok(())
/// # }
/// ```
pub trait LockStore: Send + Sync + 'static {
    /// Create `key` with `value` and `ttl` only if it does not exist (`SET NX EX`).
    ///
    /// Returns `true` iff the key was created.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Overwrite `key` with `value` and a fresh `ttl` only if it exists (`SET XX EX`).
    ///
    /// Returns `true` iff the key existed and was overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn set_if_present(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Unconditionally set `key` with an expiry (`SETEX`).
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read a string value.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Delete `key`, returning the number of keys removed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn delete(&self, key: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Remaining lifetime of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn ttl(&self, key: &str) -> impl Future<Output = Result<KeyTtl>> + Send;

    /// All keys matching a glob `pattern` (`*` and `?`).
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn keys_matching(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Append `value` to the list at `list_key` (`RPUSH`), returning the new length.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn push_tail(&self, list_key: &str, value: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Pop the head of `list_key`, waiting up to `timeout` for an item (`BLPOP`).
    ///
    /// Returns `None` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn blocking_pop_head(
        &self,
        list_key: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Length of the list at `list_key` (`LLEN`); 0 when absent.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn list_len(&self, list_key: &str) -> impl Future<Output = Result<u64>> + Send;

    /// Atomically increment the integer at `key` (`INCR`), creating it at 1.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable
    /// or the value is not an integer.
    fn increment(&self, key: &str) -> impl Future<Output = Result<i64>> + Send;

    /// Set an expiry on an existing key (`EXPIRE`). Returns `false` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unavailable.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = Result<bool>> + Send;

    /// Round-trip check used by readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`](crate::LockError::Store) if the store is unreachable.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Whole seconds for a store TTL, never below one.
#[must_use]
pub fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Key builders for each component's namespace.
pub mod keys {
    /// Seat lock key: `seat:lock:{event}:{seat}`.
    #[must_use]
    pub fn seat_lock(event_id: &str, seat_id: &str) -> String {
        format!("seat:lock:{event_id}:{seat_id}")
    }

    /// Glob matching every seat lock of an event.
    #[must_use]
    pub fn seat_lock_pattern(event_id: &str) -> String {
        format!("seat:lock:{event_id}:*")
    }

    /// Recover the seat id from a seat lock key of `event_id`.
    #[must_use]
    pub fn seat_id_from_lock_key<'a>(event_id: &str, key: &'a str) -> Option<&'a str> {
        key.strip_prefix("seat:lock:")?
            .strip_prefix(event_id)?
            .strip_prefix(':')
    }

    /// Per-event queue list key.
    #[must_use]
    pub fn queue(event_id: &str) -> String {
        format!("seat:queue:{event_id}")
    }

    /// Glob matching every event queue.
    #[must_use]
    pub fn queue_pattern() -> String {
        "seat:queue:*".to_string()
    }

    /// Recover the event id from a queue key.
    #[must_use]
    pub fn event_id_from_queue_key(key: &str) -> Option<&str> {
        key.strip_prefix("seat:queue:").filter(|event_id| !event_id.is_empty())
    }

    /// Request result key.
    #[must_use]
    pub fn result(request_id: &str) -> String {
        format!("seat:result:{request_id}")
    }

    /// Per-event load counter key.
    #[must_use]
    pub fn load(event_id: &str) -> String {
        format!("seat:load:{event_id}")
    }
}

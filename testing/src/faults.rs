//! Store wrappers that inject latency or failures.
//!
//! - [`SlowStore`]: delays reads, widening check-then-write gaps so races can be exercised
//! - [`FaultyStore`]: fails commands globally or for keys under a prefix

use seatlock_core::store::{KeyTtl, LockStore};
use seatlock_core::{LockError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Wraps a store and sleeps after every `get`.
///
/// The lock manager's `extend` reads the lease, then writes it conditionally.
/// A delay after the read gives a test room to delete or expire the lease in
/// between, proving the conditional write (not the read) resolves the race.
#[derive(Debug, Clone)]
pub struct SlowStore<S> {
    inner: S,
    get_delay: Duration,
}

impl<S: LockStore> SlowStore<S> {
    /// Wrap `inner`, delaying each `get` by `get_delay`.
    #[must_use]
    pub const fn new(inner: S, get_delay: Duration) -> Self {
        Self { inner, get_delay }
    }

    /// The wrapped store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: LockStore> LockStore for SlowStore<S> {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn set_if_present(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.inner.set_if_present(key, value, ttl).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.inner.get(key).await?;
        tokio::time::sleep(self.get_delay).await;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.inner.ttl(key).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.keys_matching(pattern).await
    }

    async fn push_tail(&self, list_key: &str, value: &str) -> Result<u64> {
        self.inner.push_tail(list_key, value).await
    }

    async fn blocking_pop_head(&self, list_key: &str, timeout: Duration) -> Result<Option<String>> {
        self.inner.blocking_pop_head(list_key, timeout).await
    }

    async fn list_len(&self, list_key: &str) -> Result<u64> {
        self.inner.list_len(list_key).await
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.inner.increment(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

#[derive(Debug, Default)]
struct FaultState {
    failing: AtomicBool,
    failing_prefix: RwLock<Option<String>>,
}

/// Wraps a store and returns [`LockError::Store`] on demand.
///
/// Clones share the same fault switches.
#[derive(Debug, Clone)]
pub struct FaultyStore<S> {
    inner: S,
    faults: Arc<FaultState>,
}

impl<S: LockStore> FaultyStore<S> {
    /// Wrap `inner` with all faults off.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::new(FaultState::default()),
        }
    }

    /// Fail every command while `failing` is set.
    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only commands whose key starts with `prefix` (`None` clears).
    pub fn fail_keys_with_prefix(&self, prefix: Option<&str>) {
        if let Ok(mut guard) = self.faults.failing_prefix.write() {
            *guard = prefix.map(ToString::to_string);
        }
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.faults.failing.load(Ordering::SeqCst) {
            return Err(LockError::Store("simulated store outage".into()));
        }
        let prefix_hit = self
            .faults
            .failing_prefix
            .read()
            .map_err(|_| LockError::Store("RwLock poisoned".into()))?
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if prefix_hit {
            return Err(LockError::Store(format!("simulated failure for {key}")));
        }
        Ok(())
    }
}

impl<S: LockStore> LockStore for FaultyStore<S> {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check(key)?;
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn set_if_present(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check(key)?;
        self.inner.set_if_present(key, value, ttl).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check(key)?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check(key)?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        self.check(key)?;
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.check(key)?;
        self.inner.ttl(key).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        self.check(pattern)?;
        self.inner.keys_matching(pattern).await
    }

    async fn push_tail(&self, list_key: &str, value: &str) -> Result<u64> {
        self.check(list_key)?;
        self.inner.push_tail(list_key, value).await
    }

    async fn blocking_pop_head(&self, list_key: &str, timeout: Duration) -> Result<Option<String>> {
        self.check(list_key)?;
        self.inner.blocking_pop_head(list_key, timeout).await
    }

    async fn list_len(&self, list_key: &str) -> Result<u64> {
        self.check(list_key)?;
        self.inner.list_len(list_key).await
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.check(key)?;
        self.inner.increment(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check(key)?;
        self.inner.expire(key, ttl).await
    }

    async fn ping(&self) -> Result<()> {
        self.check("")?;
        self.inner.ping().await
    }
}

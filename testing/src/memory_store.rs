//! In-memory [`LockStore`] with Redis-compatible expiry semantics.
//!
//! Used by the test suites and as the single-process backend for local
//! development (`STORE_BACKEND=memory`).
//!
//! # Expiry
//!
//! - **Passive**: every command first drops the key it touches if expired
//! - **Active**: [`InMemoryLockStore::start_sweeper`] removes expired keys on a timer
//!
//! Deadlines use [`tokio::time::Instant`], so tests running with a paused
//! clock (`#[tokio::test(start_paused = true)]`) expire keys deterministically.
//!
//! # Atomicity
//!
//! Every command runs inside one critical section of a `std::sync::Mutex`
//! that is never held across an `.await`.

use seatlock_core::store::{KeyTtl, LockStore, ttl_secs};
use seatlock_core::{LockError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    pushed: Notify,
}

/// Single-process key-value store implementing [`LockStore`].
///
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use seatlock_testing::InMemoryLockStore;
/// use seatlock_core::LockStore;
/// use std::time::Duration;
///
/// # async fn example() -> seatlock_core::Result<()> {
/// let store = InMemoryLockStore::new();
/// assert!(store.set_if_absent("k", "v", Duration::from_secs(60)).await?);
/// assert!(!store.set_if_absent("k", "w", Duration::from_secs(60)).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockStore {
    inner: Arc<Inner>,
}

impl InMemoryLockStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a background task that drops expired keys every `interval`.
    ///
    /// The task ends on its own once every clone of the store is dropped.
    #[must_use]
    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = match inner.entries.lock() {
                    Ok(mut entries) => {
                        let now = Instant::now();
                        let before = entries.len();
                        entries.retain(|_, entry| !entry.is_expired(now));
                        before - entries.len()
                    }
                    Err(_) => break,
                };
                if removed > 0 {
                    tracing::trace!(removed, "Swept expired keys");
                }
            }
        })
    }

    /// Number of live keys.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the internal mutex is poisoned.
    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        let entries = self.entries()?;
        Ok(entries.values().filter(|e| !e.is_expired(now)).count())
    }

    /// Whether the store holds no live keys.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the internal mutex is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop everything (test isolation).
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the internal mutex is poisoned.
    pub fn clear(&self) -> Result<()> {
        self.entries()?.clear();
        Ok(())
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.inner
            .entries
            .lock()
            .map_err(|_| LockError::Store("Mutex lock failed".into()))
    }

    /// Lock the map and drop `key` if it has expired.
    fn live(&self, key: &str) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        let mut entries = self.entries()?;
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        Ok(entries)
    }

    fn deadline(ttl: Duration) -> Option<Instant> {
        Some(Instant::now() + Duration::from_secs(ttl_secs(ttl)))
    }

    fn try_pop(&self, list_key: &str) -> Result<Option<String>> {
        let mut entries = self.live(list_key)?;
        let Some(entry) = entries.get_mut(list_key) else {
            return Ok(None);
        };
        let Value::List(items) = &mut entry.value else {
            return Err(wrong_type(list_key));
        };
        let item = items.pop_front();
        // Redis deletes lists once they become empty
        if items.is_empty() {
            entries.remove(list_key);
        }
        Ok(item)
    }
}

fn wrong_type(key: &str) -> LockError {
    LockError::Store(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
    ))
}

/// Glob match supporting `*` (any run) and `?` (any single char).
#[must_use]
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
            }
            Some(&ch) if ch == '?' || ch == candidate[c] => {
                p += 1;
                c += 1;
            }
            _ => match backtrack {
                Some((star_p, star_c)) => {
                    p = star_p + 1;
                    c = star_c + 1;
                    backtrack = Some((star_p, star_c + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&ch| ch == '*')
}

impl LockStore for InMemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.live(key)?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Self::deadline(ttl),
            },
        );
        Ok(true)
    }

    async fn set_if_present(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.live(key)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.value = Value::Text(value.to_string());
        entry.expires_at = Self::deadline(ttl);
        Ok(true)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.live(key)?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Self::deadline(ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.live(key)?;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut entries = self.live(key)?;
        Ok(u64::from(entries.remove(key).is_some()))
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let entries = self.live(key)?;
        Ok(match entries.get(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                // Redis rounds the remaining time to the nearest second
                let remaining = at.saturating_duration_since(Instant::now());
                KeyTtl::Expires(u64::try_from((remaining.as_millis() + 500) / 1000).unwrap_or(u64::MAX))
            }
        })
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let entries = self.entries()?;
        let now = Instant::now();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn push_tail(&self, list_key: &str, value: &str) -> Result<u64> {
        let length = {
            let mut entries = self.live(list_key)?;
            let entry = entries.entry(list_key.to_string()).or_insert_with(|| Entry {
                value: Value::List(VecDeque::new()),
                expires_at: None,
            });
            let Value::List(items) = &mut entry.value else {
                return Err(wrong_type(list_key));
            };
            items.push_back(value.to_string());
            items.len() as u64
        };
        self.inner.pushed.notify_waiters();
        Ok(length)
    }

    async fn blocking_pop_head(&self, list_key: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a push between the check
            // and the wait is not missed.
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop(list_key)? {
                return Ok(Some(item));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop(list_key);
            }
        }
    }

    async fn list_len(&self, list_key: &str) -> Result<u64> {
        let entries = self.live(list_key)?;
        match entries.get(list_key) {
            None => Ok(0),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.len() as u64),
            Some(_) => Err(wrong_type(list_key)),
        }
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut entries = self.live(key)?;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Text("0".to_string()),
            expires_at: None,
        });
        let Value::Text(text) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let next = text
            .parse::<i64>()
            .map_err(|_| LockError::Store("ERR value is not an integer or out of range".into()))?
            .checked_add(1)
            .ok_or_else(|| LockError::Store("ERR increment or decrement would overflow".into()))?;
        *text = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.live(key)?;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.expires_at = Self::deadline(ttl);
        Ok(true)
    }

    async fn ping(&self) -> Result<()> {
        self.entries().map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("seat:lock:20:*", "seat:lock:20:A1"));
        assert!(!glob_match("seat:lock:20:*", "seat:lock:200"));
        assert!(glob_match("seat:?ock:*", "seat:lock:x"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_expiry() {
        let store = InMemoryLockStore::new();
        assert!(store.set_if_absent("k", "a", Duration::from_secs(2)).await.unwrap());
        assert!(!store.set_if_absent("k", "b", Duration::from_secs(2)).await.unwrap());

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_if_absent("k", "b", Duration::from_secs(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_present_only_overwrites_existing() {
        let store = InMemoryLockStore::new();
        assert!(!store.set_if_present("k", "a", Duration::from_secs(5)).await.unwrap());
        store.set_with_ttl("k", "a", Duration::from_secs(5)).await.unwrap();
        assert!(store.set_if_present("k", "b", Duration::from_secs(50)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.ttl("k").await.unwrap(), KeyTtl::Expires(50));
    }

    #[tokio::test]
    async fn test_ttl_reports_missing_and_persistent() {
        let store = InMemoryLockStore::new();
        assert_eq!(store.ttl("nope").await.unwrap(), KeyTtl::Missing);
        store.increment("counter").await.unwrap();
        assert_eq!(store.ttl("counter").await.unwrap(), KeyTtl::Persistent);
        assert!(store.expire("counter", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.ttl("counter").await.unwrap(), KeyTtl::Expires(10));
    }

    #[tokio::test]
    async fn test_list_is_fifo_and_removed_when_empty() {
        let store = InMemoryLockStore::new();
        assert_eq!(store.push_tail("q", "1").await.unwrap(), 1);
        assert_eq!(store.push_tail("q", "2").await.unwrap(), 2);
        assert_eq!(store.list_len("q").await.unwrap(), 2);

        let timeout = Duration::from_millis(10);
        assert_eq!(store.blocking_pop_head("q", timeout).await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.blocking_pop_head("q", timeout).await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.ttl("q").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_times_out_when_empty() {
        let store = InMemoryLockStore::new();
        let started = Instant::now();
        let popped = store.blocking_pop_head("q", Duration::from_secs(5)).await.unwrap();
        assert_eq!(popped, None);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_pop_wakes_on_push() {
        let store = InMemoryLockStore::new();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.blocking_pop_head("q", Duration::from_secs(30)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        store.push_tail("q", "item").await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("item"));
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_store_error() {
        let store = InMemoryLockStore::new();
        store.push_tail("q", "1").await.unwrap();
        assert!(matches!(store.get("q").await, Err(LockError::Store(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_keys() {
        let store = InMemoryLockStore::new();
        let sweeper = store.start_sweeper(Duration::from_secs(1));
        store.set_with_ttl("a", "1", Duration::from_secs(1)).await.unwrap();
        store.set_with_ttl("b", "2", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;

        // Inspect the raw map: the sweeper, not passive expiry, removed "a"
        let raw = store.inner.entries.lock().unwrap().len();
        assert_eq!(raw, 1);
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_keys_matching_filters_by_pattern() {
        let store = InMemoryLockStore::new();
        for key in ["seat:lock:1:A", "seat:lock:1:B", "seat:lock:2:A", "seat:load:1"] {
            store.set_with_ttl(key, "x", Duration::from_secs(60)).await.unwrap();
        }
        let keys = store.keys_matching("seat:lock:1:*").await.unwrap();
        assert_eq!(keys, vec!["seat:lock:1:A", "seat:lock:1:B"]);
    }
}

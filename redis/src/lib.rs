//! Redis-backed [`LockStore`].
//!
//! Every conditional write is a single Redis command, so atomicity comes
//! from Redis itself:
//!
//! - **Acquire**: `SET key value NX EX ttl`
//! - **Extend**: `SET key value XX EX ttl`
//! - **Queue**: `RPUSH` to append, `BLPOP` to take the head
//! - **Load window**: `INCR`, then `EXPIRE` on the first hit
//!
//! Ordinary commands share one `ConnectionManager`, which reconnects on
//! failure. `BLPOP` parks its connection server-side until an item arrives,
//! so blocking pops run on dedicated connections instead of stalling every
//! other command queued behind them. Each queue keeps its dedicated
//! connection between pops; a connection that fails is dropped and the next
//! pop opens a fresh one.
//!
//! # Example
//!
//! ```no_run
//! use seatlock_redis::RedisLockStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisLockStore::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use dashmap::DashMap;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client, RedisError};
use seatlock_core::store::{KeyTtl, LockStore, ttl_secs};
use seatlock_core::{LockError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Idle blocking connections kept for reuse; pops beyond this connect per call.
const MAX_IDLE_BLOCKING_CONNECTIONS: usize = 64;

/// Shortest `BLPOP` timeout sent to Redis; `0` would block forever.
const MIN_BLOCKING_TIMEOUT_SECS: f64 = 0.01;

fn store_error(operation: &'static str) -> impl FnOnce(RedisError) -> LockError {
    move |e| LockError::Store(format!("Redis {operation} failed: {e}"))
}

/// `LockStore` over a Redis server.
#[derive(Clone)]
pub struct RedisLockStore {
    /// Client used to open dedicated connections for blocking pops.
    client: Client,
    /// Shared, auto-reconnecting connection for everything else.
    conn_manager: ConnectionManager,
    /// Dedicated `BLPOP` connections by list key, checked out while in use.
    blocking_conns: Arc<DashMap<String, MultiplexedConnection>>,
}

impl RedisLockStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the URL is invalid or Redis is unreachable.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LockError::Store(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            LockError::Store(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Connected to Redis lock store");
        Ok(Self {
            client,
            conn_manager,
            blocking_conns: Arc::new(DashMap::new()),
        })
    }

    /// Take the list's idle blocking connection, or open one.
    async fn checkout_blocking(&self, list_key: &str) -> Result<MultiplexedConnection> {
        if let Some((_, conn)) = self.blocking_conns.remove(list_key) {
            return Ok(conn);
        }
        tracing::debug!(list_key = %list_key, "Opening dedicated blocking connection");
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_error("connect"))
    }

    /// Return a healthy blocking connection for the list's next pop.
    fn checkin_blocking(&self, list_key: &str, conn: MultiplexedConnection) {
        if self.blocking_conns.len() < MAX_IDLE_BLOCKING_CONNECTIONS {
            self.blocking_conns.insert(list_key.to_string(), conn);
        }
    }

    async fn conditional_set(
        &self,
        key: &str,
        value: &str,
        condition: &'static str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        // Reply is "OK" when written, nil when the condition did not hold
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg(condition)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(store_error("SET"))?;
        Ok(reply.is_some())
    }
}

impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.conditional_set(key, value, "NX", ttl).await
    }

    async fn set_if_present(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.conditional_set(key, value, "XX", ttl).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs(ttl))
            .await
            .map_err(store_error("SETEX"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(store_error("GET"))?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let removed: u64 = conn.del(key).await.map_err(store_error("DEL"))?;
        Ok(removed)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let mut conn = self.conn_manager.clone();
        let raw: i64 = conn.ttl(key).await.map_err(store_error("TTL"))?;
        Ok(KeyTtl::from_raw(raw))
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let keys: Vec<String> = conn.keys(pattern).await.map_err(store_error("KEYS"))?;
        Ok(keys)
    }

    async fn push_tail(&self, list_key: &str, value: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let len: u64 = conn.rpush(list_key, value).await.map_err(store_error("RPUSH"))?;
        Ok(len)
    }

    async fn blocking_pop_head(&self, list_key: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.checkout_blocking(list_key).await?;
        // A failed connection is dropped here rather than checked back in
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(list_key)
            .arg(timeout.as_secs_f64().max(MIN_BLOCKING_TIMEOUT_SECS))
            .query_async(&mut conn)
            .await
            .map_err(store_error("BLPOP"))?;
        self.checkin_blocking(list_key, conn);
        Ok(popped.map(|(_, value)| value))
    }

    async fn list_len(&self, list_key: &str) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let len: u64 = conn.llen(list_key).await.map_err(store_error("LLEN"))?;
        Ok(len)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn_manager.clone();
        let count: i64 = conn.incr(key, 1).await.map_err(store_error("INCR"))?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let seconds = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        let applied: bool = conn.expire(key, seconds).await.map_err(store_error("EXPIRE"))?;
        Ok(applied)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error("PING"))?;
        Ok(())
    }
}

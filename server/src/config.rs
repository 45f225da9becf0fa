//! Configuration management for the seatlock server.
//!
//! Loads configuration from environment variables with sensible defaults.

use seatlock_core::LockConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|value| value.trim().parse().ok())
}

/// Which [`LockStore`](seatlock_core::LockStore) implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis (production)
    Redis,
    /// Process-local in-memory store (development only; nothing is shared
    /// between instances and nothing survives a restart)
    Memory,
}

impl StoreBackend {
    /// Parse a backend name, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "redis" => Some(Self::Redis),
            "memory" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Application server configuration
    pub server: ServerConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Store backend selection
    pub backend: StoreBackend,
    /// Lease, queue and admission settings
    pub lock: LockConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
    /// Sweep interval of the in-memory store, in seconds
    pub sweep_interval: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let backend = match lookup("STORE_BACKEND") {
            None => StoreBackend::Redis,
            Some(name) => StoreBackend::parse(&name).unwrap_or_else(|| {
                tracing::warn!(backend = %name, "Unknown STORE_BACKEND, using redis");
                StoreBackend::Redis
            }),
        };

        Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parsed(&lookup, "PORT").unwrap_or(8080),
                metrics_port: parsed(&lookup, "METRICS_PORT").unwrap_or(9090),
                shutdown_timeout: parsed(&lookup, "SHUTDOWN_TIMEOUT").unwrap_or(30),
                sweep_interval: parsed(&lookup, "MEMORY_SWEEP_INTERVAL_SECS").unwrap_or(1),
            },
            redis: RedisConfig {
                url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            },
            backend,
            lock: LockConfig::from_lookup(&lookup),
        }
    }

    /// Graceful shutdown budget.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    /// Sweep interval of the in-memory store.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.server.sweep_interval.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.backend, StoreBackend::Redis);
        assert_eq!(config.lock.load_threshold, 100);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "3000"),
            ("STORE_BACKEND", "Memory"),
            ("LOAD_THRESHOLD", "5"),
            ("SEAT_LOCK_TTL_SECS", "30"),
        ]);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.lock.load_threshold, 5);
        assert_eq!(config.lock.lock_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("STORE_BACKEND", "etcd")]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backend, StoreBackend::Redis);
    }
}

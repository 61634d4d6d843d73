//! Service configuration.

use std::time::Duration;

use wallet_common::time::constants;
use wallet_ledger::query::{DEFAULT_LIMIT, MAX_LIMIT};

/// Per-account lock configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long a transaction waits for its account lock.
    pub acquisition_timeout: Duration,
    /// Interval between sweeps of idle lock slots.
    pub cleanup_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquisition_timeout: constants::lock_acquisition_timeout(),
            cleanup_interval: constants::lock_cleanup_interval(),
        }
    }
}

/// Retry policy for conflicting commits.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total commit attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub backoff_base: Duration,
    /// Upper bound for a single delay.
    pub backoff_max: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base: constants::retry_backoff_base(),
            backoff_max: constants::retry_backoff_max(),
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-based), doubling each time.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

/// History query limits.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Page size when the caller omits `limit`.
    pub default_limit: u32,
    /// Largest accepted `limit`.
    pub max_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// PostgreSQL URL. In-memory storage is used when absent.
    pub database_url: Option<String>,
    /// Maximum pooled database connections.
    pub db_max_connections: u32,
    /// Lock configuration.
    pub lock_config: LockConfig,
    /// Retry configuration.
    pub retry_config: RetryConfig,
    /// Query configuration.
    pub query_config: QueryConfig,
    /// How long shutdown waits for in-flight transactions.
    pub drain_timeout: Duration,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON log lines.
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 3000,
            database_url: None,
            db_max_connections: 10,
            lock_config: LockConfig::default(),
            retry_config: RetryConfig::default(),
            query_config: QueryConfig::default(),
            drain_timeout: constants::drain_timeout(),
            log_level: "info".to_string(),
            log_json: true,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("WALLET_LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Some(port) = lookup("WALLET_LISTEN_PORT").or_else(|| lookup("PORT")) {
            if let Ok(port) = port.parse() {
                config.listen_port = port;
            }
        }

        config.database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());

        if let Some(max) = lookup("WALLET_DB_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.db_max_connections = max;
            }
        }

        if let Some(ms) = lookup("WALLET_LOCK_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.lock_config.acquisition_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(attempts) = lookup("WALLET_RETRY_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                config.retry_config.max_attempts = attempts;
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(json) = lookup("WALLET_LOG_JSON") {
            config.log_json = !matches!(json.as_str(), "0" | "false" | "no");
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("Listen port cannot be 0".to_string());
        }

        if self.db_max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }

        if self.lock_config.acquisition_timeout.is_zero() {
            return Err("Lock acquisition timeout cannot be 0".to_string());
        }

        if self.retry_config.max_attempts == 0 {
            return Err("Retry policy needs at least one attempt".to_string());
        }

        if self.retry_config.backoff_base > self.retry_config.backoff_max {
            return Err("Backoff base cannot exceed backoff max".to_string());
        }

        let query = &self.query_config;
        if query.max_limit == 0 || query.default_limit == 0 || query.default_limit > query.max_limit {
            return Err("Default page size must be between 1 and the max page size".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.database_url.is_none());
        assert_eq!(config.query_config.max_limit, 100);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ServiceConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.retry_config.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WALLET_LISTEN_PORT", "8088"),
            ("DATABASE_URL", "postgres://localhost/wallet"),
            ("WALLET_LOCK_TIMEOUT_MS", "250"),
            ("WALLET_LOG_JSON", "false"),
        ]);
        let config = ServiceConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.listen_port, 8088);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/wallet"));
        assert_eq!(config.lock_config.acquisition_timeout, Duration::from_millis(250));
        assert!(!config.log_json);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(10));
        assert_eq!(retry.backoff(2), Duration::from_millis(20));
        assert_eq!(retry.backoff(3), Duration::from_millis(40));
        assert_eq!(retry.backoff(4), Duration::from_millis(50));
        assert_eq!(retry.backoff(40), Duration::from_millis(50));
    }
}

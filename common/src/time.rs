//! Time utilities and constants for the wallet ledger.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Timing defaults shared by the coordinator and its configuration.
pub mod constants {
    use super::Duration;

    /// How long a transaction waits for its account lock (5 seconds).
    pub fn lock_acquisition_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Interval between sweeps of idle account locks (30 seconds).
    pub fn lock_cleanup_interval() -> Duration {
        Duration::from_secs(30)
    }

    /// First backoff step after a conflicting commit (10 milliseconds).
    pub fn retry_backoff_base() -> Duration {
        Duration::from_millis(10)
    }

    /// Upper bound for a single backoff step (500 milliseconds).
    pub fn retry_backoff_max() -> Duration {
        Duration::from_millis(500)
    }

    /// How long shutdown waits for in-flight transactions (30 seconds).
    pub fn drain_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// A point in time after which an operation gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: std::time::Instant,
}

impl Deadline {
    /// Create a deadline `duration` from now.
    pub fn after(duration: Duration) -> Self {
        Self {
            at: std::time::Instant::now() + duration,
        }
    }

    /// Check if the deadline has passed.
    pub fn is_exceeded(&self) -> bool {
        std::time::Instant::now() >= self.at
    }

    /// Get remaining duration.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(std::time::Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert!(!deadline.is_exceeded());
        assert!(deadline.remaining() > Duration::ZERO);

        let passed = Deadline::after(Duration::ZERO);
        assert!(passed.is_exceeded());
        assert_eq!(passed.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_bounds() {
        assert!(constants::retry_backoff_base() < constants::retry_backoff_max());
    }
}

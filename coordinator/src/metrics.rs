//! Metrics collection for coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use wallet_common::WalletError;

/// Coordinator metrics.
pub struct Metrics {
    /// Total transactions submitted.
    pub transactions_total: AtomicU64,
    /// Transactions committed.
    pub transactions_accepted: AtomicU64,
    /// Transactions refused for insufficient balance.
    pub transactions_insufficient: AtomicU64,
    /// Transactions refused for invalid input or unknown account.
    pub transactions_invalid: AtomicU64,
    /// Transactions that failed on conflict or storage errors.
    pub transactions_failed: AtomicU64,
    /// Transactions currently executing.
    pub transactions_in_flight: AtomicU64,
    /// Commits retried after a conflict.
    pub conflicts_retried: AtomicU64,
    /// Account lock waits that timed out.
    pub lock_timeouts: AtomicU64,
    /// Accounts opened.
    pub accounts_opened: AtomicU64,
    /// History pages served.
    pub queries_served: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            transactions_total: AtomicU64::new(0),
            transactions_accepted: AtomicU64::new(0),
            transactions_insufficient: AtomicU64::new(0),
            transactions_invalid: AtomicU64::new(0),
            transactions_failed: AtomicU64::new(0),
            transactions_in_flight: AtomicU64::new(0),
            conflicts_retried: AtomicU64::new(0),
            lock_timeouts: AtomicU64::new(0),
            accounts_opened: AtomicU64::new(0),
            queries_served: AtomicU64::new(0),
        }
    }

    /// Count a transaction as started. The returned token ends it on drop.
    pub fn transaction_started(self: &Arc<Self>) -> InFlight {
        self.transactions_total.fetch_add(1, Ordering::Relaxed);
        self.write_started()
    }

    /// Hold the in-flight gauge for a storage write that is not a transaction.
    pub fn write_started(self: &Arc<Self>) -> InFlight {
        self.transactions_in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            metrics: Arc::clone(self),
        }
    }

    /// Record how a transaction ended.
    pub fn transaction_finished<T>(&self, outcome: &Result<T, WalletError>) {
        let counter = match outcome {
            Ok(_) => &self.transactions_accepted,
            Err(WalletError::InsufficientBalance { .. }) => &self.transactions_insufficient,
            Err(e) if e.is_client_error() => &self.transactions_invalid,
            Err(_) => &self.transactions_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retried commit.
    pub fn conflict_retried(&self) {
        self.conflicts_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a lock timeout.
    pub fn lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an opened account.
    pub fn account_opened(&self) {
        self.accounts_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a served history page.
    pub fn query_served(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Transactions currently executing.
    pub fn in_flight(&self) -> u64 {
        self.transactions_in_flight.load(Ordering::SeqCst)
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_total: self.transactions_total.load(Ordering::Relaxed),
            transactions_accepted: self.transactions_accepted.load(Ordering::Relaxed),
            transactions_insufficient: self.transactions_insufficient.load(Ordering::Relaxed),
            transactions_invalid: self.transactions_invalid.load(Ordering::Relaxed),
            transactions_failed: self.transactions_failed.load(Ordering::Relaxed),
            transactions_in_flight: self.transactions_in_flight.load(Ordering::Relaxed),
            conflicts_retried: self.conflicts_retried.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            accounts_opened: self.accounts_opened.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP wallet_transactions_total Total number of transactions submitted
# TYPE wallet_transactions_total counter
wallet_transactions_total {}

# HELP wallet_transactions_accepted Total transactions committed
# TYPE wallet_transactions_accepted counter
wallet_transactions_accepted {}

# HELP wallet_transactions_insufficient Total transactions refused for insufficient balance
# TYPE wallet_transactions_insufficient counter
wallet_transactions_insufficient {}

# HELP wallet_transactions_invalid Total transactions refused for invalid input
# TYPE wallet_transactions_invalid counter
wallet_transactions_invalid {}

# HELP wallet_transactions_failed Total transactions failed on conflict or storage error
# TYPE wallet_transactions_failed counter
wallet_transactions_failed {}

# HELP wallet_transactions_in_flight Transactions currently executing
# TYPE wallet_transactions_in_flight gauge
wallet_transactions_in_flight {}

# HELP wallet_conflicts_retried Total commits retried after a conflict
# TYPE wallet_conflicts_retried counter
wallet_conflicts_retried {}

# HELP wallet_lock_timeouts Total account lock waits that timed out
# TYPE wallet_lock_timeouts counter
wallet_lock_timeouts {}

# HELP wallet_accounts_opened Total accounts opened
# TYPE wallet_accounts_opened counter
wallet_accounts_opened {}

# HELP wallet_queries_served Total history pages served
# TYPE wallet_queries_served counter
wallet_queries_served {}
"#,
            snapshot.transactions_total,
            snapshot.transactions_accepted,
            snapshot.transactions_insufficient,
            snapshot.transactions_invalid,
            snapshot.transactions_failed,
            snapshot.transactions_in_flight,
            snapshot.conflicts_retried,
            snapshot.lock_timeouts,
            snapshot.accounts_opened,
            snapshot.queries_served,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one in-flight storage write; decrements the in-flight gauge on drop.
pub struct InFlight {
    metrics: Arc<Metrics>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.metrics
            .transactions_in_flight
            .fetch_sub(1, Ordering::SeqCst);
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub transactions_total: u64,
    pub transactions_accepted: u64,
    pub transactions_insufficient: u64,
    pub transactions_invalid: u64,
    pub transactions_failed: u64,
    pub transactions_in_flight: u64,
    pub conflicts_retried: u64,
    pub lock_timeouts: u64,
    pub accounts_opened: u64,
    pub queries_served: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

//! Simulation metrics.

use std::collections::VecDeque;

/// Simulation metrics.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total transactions attempted.
    pub total_transactions: u64,
    /// Committed transactions.
    pub successful_transactions: u64,
    /// Transactions refused for insufficient balance.
    pub insufficient_transactions: u64,
    /// Transactions that failed for any other reason.
    pub failed_transactions: u64,
    /// Latency samples (microseconds) of committed transactions.
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_transactions: 0,
            successful_transactions: 0,
            insufficient_transactions: 0,
            failed_transactions: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a committed transaction.
    pub fn record_success(&mut self, latency_us: u64) {
        self.total_transactions += 1;
        self.successful_transactions += 1;

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Record a transaction refused for insufficient balance.
    pub fn record_insufficient(&mut self) {
        self.total_transactions += 1;
        self.insufficient_transactions += 1;
    }

    /// Record a failed transaction.
    pub fn record_failure(&mut self) {
        self.total_transactions += 1;
        self.failed_transactions += 1;
    }

    /// Fold another worker's metrics into this one.
    pub fn merge(&mut self, other: SimulationMetrics) {
        self.total_transactions += other.total_transactions;
        self.successful_transactions += other.successful_transactions;
        self.insufficient_transactions += other.insufficient_transactions;
        self.failed_transactions += other.failed_transactions;

        for sample in other.latency_samples {
            if self.latency_samples.len() >= self.max_samples {
                self.latency_samples.pop_front();
            }
            self.latency_samples.push_back(sample);
        }
    }

    /// Get average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p50 latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Share of attempts that committed.
    pub fn success_rate(&self) -> f64 {
        if self.total_transactions == 0 {
            return 0.0;
        }

        self.successful_transactions as f64 / self.total_transactions as f64
    }

    /// Get throughput (transactions per second).
    pub fn throughput(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }

        self.total_transactions as f64 / elapsed_secs
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

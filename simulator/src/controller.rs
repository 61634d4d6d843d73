//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use wallet_common::{AccountId, WalletError};
use wallet_coordinator::{ServiceConfig, TransactionCoordinator};
use wallet_ledger::{LedgerAudit, MemoryStorage};

use crate::metrics::SimulationMetrics;

/// Workload parameters.
#[derive(Debug, Clone)]
pub struct Workload {
    /// Accounts to open.
    pub accounts: usize,
    /// Concurrent workers.
    pub workers: usize,
    /// Transactions issued across all workers.
    pub transactions: usize,
    /// Opening balance of every account.
    pub initial_balance: Decimal,
    /// Largest absolute amount per transaction.
    pub max_amount: Decimal,
    /// Base seed; each worker derives its own from it.
    pub seed: u64,
}

/// Outcome of auditing every account.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    /// Accounts audited.
    pub audited: usize,
    /// Accounts whose cached balance disagrees with the ledger.
    pub drifted: Vec<LedgerAudit>,
    /// Accounts found with a negative balance.
    pub negative: Vec<AccountId>,
}

impl AuditReport {
    /// Every account matched its ledger and stayed non-negative.
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.negative.is_empty()
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// Workload parameters.
    workload: Workload,
    /// Coordinator under load.
    coordinator: Arc<TransactionCoordinator>,
    /// Opened accounts.
    accounts: Arc<Vec<AccountId>>,
}

impl SimulationController {
    /// Create a controller over a fresh in-memory coordinator.
    pub fn new(workload: Workload, config: ServiceConfig) -> Self {
        let coordinator = Arc::new(TransactionCoordinator::new(
            config,
            Arc::new(MemoryStorage::new()),
        ));

        Self {
            workload,
            coordinator,
            accounts: Arc::new(Vec::new()),
        }
    }

    /// Start the coordinator and open every account.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!(accounts = self.workload.accounts, "Initializing simulation");

        self.coordinator.start().await?;

        let mut accounts = Vec::with_capacity(self.workload.accounts);
        for i in 0..self.workload.accounts {
            let opening = self
                .coordinator
                .open_account(&format!("sim-account-{i}"), self.workload.initial_balance)
                .await?;
            accounts.push(opening.account.id);
        }
        self.accounts = Arc::new(accounts);

        info!(
            accounts = self.accounts.len(),
            initial_balance = %self.workload.initial_balance,
            "Accounts opened"
        );
        Ok(())
    }

    /// Run the workload to completion. Returns merged metrics.
    pub async fn run(&self) -> anyhow::Result<SimulationMetrics> {
        if self.accounts.is_empty() {
            anyhow::bail!("no accounts to transact against");
        }

        let workers = self.workload.workers.max(1);
        info!(
            workers,
            transactions = self.workload.transactions,
            "Running workload"
        );

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let quota = share(self.workload.transactions, workers, worker);
                let seed = self.workload.seed.wrapping_add(worker as u64);
                let max_amount = self.workload.max_amount;
                let coordinator = self.coordinator.clone();
                let accounts = self.accounts.clone();

                tokio::spawn(async move {
                    run_worker(worker, quota, seed, max_amount, coordinator, accounts).await
                })
            })
            .collect();

        let mut metrics = SimulationMetrics::new();
        for result in futures::future::join_all(handles).await {
            metrics.merge(result?);
        }

        Ok(metrics)
    }

    /// Replay every account's ledger against its stored balance.
    pub async fn audit(&self) -> anyhow::Result<AuditReport> {
        let mut report = AuditReport::default();

        for account_id in self.accounts.iter() {
            let audit = self.coordinator.audit(*account_id).await?;
            report.audited += 1;

            if audit.cached_balance < Decimal::ZERO {
                report.negative.push(*account_id);
            }
            if !audit.is_consistent() {
                report.drifted.push(audit);
            }
        }

        Ok(report)
    }

    /// Stop the coordinator.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.coordinator.stop().await?;
        Ok(())
    }
}

/// Transactions assigned to `worker` when `total` is spread over `workers`.
fn share(total: usize, workers: usize, worker: usize) -> usize {
    total / workers + usize::from(worker < total % workers)
}

/// A random signed amount in `[-max, max]` at four decimal places.
fn random_amount(rng: &mut StdRng, max_amount: Decimal) -> Decimal {
    let max_units = (max_amount * Decimal::from(10_000))
        .trunc()
        .to_i64()
        .unwrap_or(i64::MAX)
        .max(1);
    Decimal::new(rng.gen_range(-max_units..=max_units), 4)
}

async fn run_worker(
    worker: usize,
    quota: usize,
    seed: u64,
    max_amount: Decimal,
    coordinator: Arc<TransactionCoordinator>,
    accounts: Arc<Vec<AccountId>>,
) -> SimulationMetrics {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut metrics = SimulationMetrics::new();

    for n in 0..quota {
        let account_id = accounts[rng.gen_range(0..accounts.len())];
        let amount = random_amount(&mut rng, max_amount);
        let description = format!("sim-{worker}-{n}");

        let started = Instant::now();
        match coordinator.execute(account_id, amount, &description).await {
            Ok(_) => metrics.record_success(started.elapsed().as_micros() as u64),
            Err(WalletError::InsufficientBalance { .. }) => metrics.record_insufficient(),
            Err(e) => {
                warn!(worker, error = %e, "Transaction failed");
                metrics.record_failure();
            }
        }
    }

    debug!(worker, attempted = metrics.total_transactions, "Worker finished");
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn workload() -> Workload {
        Workload {
            accounts: 3,
            workers: 4,
            transactions: 200,
            initial_balance: dec!(50),
            max_amount: dec!(20),
            seed: 7,
        }
    }

    #[test]
    fn test_share_covers_total() {
        let total: usize = (0..4).map(|w| share(10, 4, w)).sum();
        assert_eq!(total, 10);
        assert_eq!(share(10, 4, 0), 3);
        assert_eq!(share(10, 4, 3), 2);
    }

    #[test]
    fn test_random_amount_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let amount = random_amount(&mut rng, dec!(2.5));
            assert!(amount.abs() <= dec!(2.5));
            assert!(amount.scale() <= 4);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simulation_leaves_ledger_consistent() {
        let mut controller = SimulationController::new(workload(), ServiceConfig::default());
        controller.initialize().await.unwrap();

        let metrics = controller.run().await.unwrap();
        assert_eq!(metrics.total_transactions, 200);
        assert_eq!(metrics.failed_transactions, 0);

        let report = controller.audit().await.unwrap();
        assert_eq!(report.audited, 3);
        assert!(report.is_clean());

        controller.shutdown().await.unwrap();
    }
}

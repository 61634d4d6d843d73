//! Core coordinator implementation.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use wallet_common::time::Deadline;
use wallet_common::{monetary, AccountId, Result, WalletError};
use wallet_ledger::journal::validate_description;
use wallet_ledger::{
    Account, CommitBatch, LedgerAudit, LedgerEntry, NewEntry, SharedStorage,
};

use crate::config::ServiceConfig;
use crate::lock_manager::AccountLockManager;
use crate::metrics::{Metrics, SharedMetrics};
use crate::state::CoordinatorState;

/// Outcome of an accepted transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    /// Account the transaction was applied to.
    pub account_id: AccountId,
    /// Balance after the transaction.
    pub new_balance: Decimal,
    /// Ledger entry recording the transaction.
    pub entry: LedgerEntry,
}

/// A newly opened account with its opening entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountOpening {
    pub account: Account,
    pub entry: LedgerEntry,
}

/// Applies balance changes to accounts, one commit per account at a time.
pub struct TransactionCoordinator {
    /// Configuration.
    config: ServiceConfig,
    /// Current coordinator state.
    state: Arc<RwLock<CoordinatorState>>,
    /// Account and ledger storage.
    storage: SharedStorage,
    /// Per-account exclusive sections.
    lock_manager: Arc<AccountLockManager>,
    /// Counters.
    metrics: SharedMetrics,
    /// Lock cleanup task, while running.
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionCoordinator {
    /// Create a new coordinator over `storage`.
    pub fn new(config: ServiceConfig, storage: SharedStorage) -> Self {
        let lock_manager = Arc::new(AccountLockManager::new(config.lock_config.clone()));

        Self {
            config,
            state: Arc::new(RwLock::new(CoordinatorState::Starting)),
            storage,
            lock_manager,
            metrics: Arc::new(Metrics::new()),
            cleanup_task: Mutex::new(None),
        }
    }

    /// Start the coordinator.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        info!(backend = self.storage.backend(), "Starting transaction coordinator");

        *self.state.write() = CoordinatorState::Running;

        let lock_manager = self.lock_manager.clone();
        let handle = tokio::spawn(async move {
            lock_manager.run_cleanup_loop().await;
        });
        if let Some(previous) = self.cleanup_task.lock().replace(handle) {
            previous.abort();
        }

        info!("Transaction coordinator started");
        Ok(())
    }

    /// Stop the coordinator gracefully.
    ///
    /// New requests are refused at once; in-flight transactions and account
    /// openings get up to the drain timeout to finish before storage is closed.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping transaction coordinator");

        *self.state.write() = CoordinatorState::ShuttingDown;

        self.drain_in_flight().await;

        if let Some(task) = self.cleanup_task.lock().take() {
            task.abort();
        }

        self.storage.close().await;

        *self.state.write() = CoordinatorState::Stopped;

        info!("Transaction coordinator stopped");
        Ok(())
    }

    /// Open an account with an initial balance and its `Setup` entry.
    #[instrument(skip(self, name), fields(initial_balance = %initial_balance))]
    pub async fn open_account(&self, name: &str, initial_balance: Decimal) -> Result<AccountOpening> {
        let _in_flight = self.metrics.write_started();
        self.ensure_running()?;

        let initial_balance = monetary::bounded(initial_balance, "initialBalance")?;
        let (account, entry) = self
            .storage
            .open(name, initial_balance)
            .await
            .map_err(|e| {
                if !e.is_client_error() {
                    error!(error = %e, "Failed to open account");
                }
                e
            })?;

        self.metrics.account_opened();
        info!(
            account_id = %account.id,
            balance = %account.balance,
            entry_id = %entry.id,
            "Account opened"
        );

        Ok(AccountOpening { account, entry })
    }

    /// Apply a signed amount to an account and record it in the ledger.
    ///
    /// The balance read, the funds check and the commit run while holding the
    /// account's lock. A balance that would drop below zero is refused with
    /// `InsufficientBalance` and nothing is written.
    #[instrument(skip(self, description), fields(account_id = %account_id, amount = %amount))]
    pub async fn execute(
        &self,
        account_id: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransactionReceipt> {
        let _in_flight = self.metrics.transaction_started();
        self.ensure_running()?;

        let outcome = self.execute_serialized(account_id, amount, description).await;
        self.metrics.transaction_finished(&outcome);

        match &outcome {
            Ok(receipt) => info!(
                new_balance = %receipt.new_balance,
                entry_id = %receipt.entry.id,
                kind = receipt.entry.kind().as_str(),
                "Transaction committed"
            ),
            Err(e) if e.is_client_error() => warn!(
                error = %e,
                code = e.error_code(),
                "Transaction rejected"
            ),
            Err(e) => error!(
                error = %e,
                code = e.error_code(),
                "Transaction failed"
            ),
        }

        outcome
    }

    /// Replay an account's ledger against its stored balance.
    ///
    /// Runs under the account lock so no commit lands mid-audit.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn audit(&self, account_id: AccountId) -> Result<LedgerAudit> {
        let _guard = self.lock_manager.acquire(account_id).await?;

        let account = self.storage.get(&account_id).await?;
        let history = self.storage.history(&account_id).await?;
        let audit = LedgerAudit::replay(&account, &history)?;

        if audit.is_consistent() {
            debug!(entries = audit.entry_count, "Ledger consistent");
        } else {
            error!(
                cached = %audit.cached_balance,
                derived = %audit.derived_balance,
                drift = %audit.drift(),
                "Ledger drift detected"
            );
        }

        Ok(audit)
    }

    /// Check if the coordinator is accepting requests.
    pub fn is_accepting_requests(&self) -> bool {
        self.state.read().accepts_requests()
    }

    /// Get the current coordinator state.
    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    /// Coordinator metrics.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Storage this coordinator writes to.
    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    // --- Private methods ---

    fn ensure_running(&self) -> Result<()> {
        let state = self.state();
        if state.accepts_requests() {
            Ok(())
        } else {
            Err(WalletError::Unavailable(format!(
                "coordinator is {state:?}"
            )))
        }
    }

    async fn execute_serialized(
        &self,
        account_id: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransactionReceipt> {
        let description = validate_description(description)?;
        let amount = monetary::bounded(amount, "amount")?;

        let guard = match self.lock_manager.acquire(account_id).await {
            Ok(guard) => guard,
            Err(e) => {
                self.metrics.lock_timeout();
                return Err(e);
            }
        };

        let retry = &self.config.retry_config;
        let mut attempt = 1;
        let outcome = loop {
            match self.try_commit(account_id, amount, &description).await {
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Commit conflicted, retrying"
                    );
                    self.metrics.conflict_retried();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => break outcome,
            }
        };

        debug!(held_ms = guard.held_for().as_millis() as u64, "Account lock released");
        outcome
    }

    /// One read-check-commit pass against the current stored balance.
    async fn try_commit(
        &self,
        account_id: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransactionReceipt> {
        let account = self.storage.get(&account_id).await?;
        let new_balance = monetary::add(account.balance, amount)?;

        if new_balance < Decimal::ZERO {
            return Err(WalletError::InsufficientBalance {
                available: account.balance,
                requested: amount,
            });
        }

        let entry = NewEntry::new(account_id, amount, new_balance, description)?;
        let (account, entry) = self
            .storage
            .commit(CommitBatch::new(account.balance, entry))
            .await?;

        Ok(TransactionReceipt {
            account_id,
            new_balance: account.balance,
            entry,
        })
    }

    async fn drain_in_flight(&self) {
        use tokio::time::Duration;

        let deadline = Deadline::after(self.config.drain_timeout);

        loop {
            let pending = self.metrics.in_flight();
            if pending == 0 {
                break;
            }
            if deadline.is_exceeded() {
                warn!(pending, "Drain timeout reached with writes still in flight");
                break;
            }
            info!(pending, "Waiting for in-flight writes to complete");
            tokio::time::sleep(deadline.remaining().min(Duration::from_millis(50))).await;
        }
    }
}

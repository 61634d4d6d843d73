//! Per-account exclusive sections.
//!
//! Each account gets one fair async mutex. A transaction holds it from the
//! balance read through the commit, so no two commits for the same account
//! interleave while different accounts proceed in parallel.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use wallet_common::{AccountId, Result, WalletError};

use crate::config::LockConfig;

/// Exclusive hold on one account. Released on drop.
#[derive(Debug)]
pub struct AccountGuard {
    account_id: AccountId,
    acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
}

impl AccountGuard {
    /// Account this guard protects.
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// How long the guard has been held.
    pub fn held_for(&self) -> std::time::Duration {
        self.acquired_at.elapsed()
    }
}

/// Manager for account locks.
pub struct AccountLockManager {
    /// Lock slot per account.
    slots: DashMap<AccountId, Arc<Mutex<()>>>,
    /// Configuration.
    config: LockConfig,
}

impl AccountLockManager {
    /// Create a new lock manager.
    pub fn new(config: LockConfig) -> Self {
        Self {
            slots: DashMap::new(),
            config,
        }
    }

    /// Wait for exclusive access to an account.
    ///
    /// Gives up with `Conflict` after the configured acquisition timeout.
    pub async fn acquire(&self, account_id: AccountId) -> Result<AccountGuard> {
        let slot = self
            .slots
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let started = Instant::now();
        match tokio::time::timeout(self.config.acquisition_timeout, slot.lock_owned()).await {
            Ok(guard) => {
                debug!(
                    account_id = %account_id,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Account lock acquired"
                );
                Ok(AccountGuard {
                    account_id,
                    acquired_at: Instant::now(),
                    _guard: guard,
                })
            }
            Err(_) => {
                warn!(
                    account_id = %account_id,
                    timeout_ms = self.config.acquisition_timeout.as_millis() as u64,
                    "Timed out waiting for account lock"
                );
                Err(WalletError::conflict(
                    account_id,
                    "timed out waiting for account lock",
                ))
            }
        }
    }

    /// Check whether an account is currently locked.
    pub fn is_locked(&self, account_id: &AccountId) -> bool {
        self.slots
            .get(account_id)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of lock slots currently allocated.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Drop slots nobody holds or waits on. Returns how many were removed.
    ///
    /// Holders and waiters keep a clone of the slot, so a strong count of one
    /// means the map owns the only reference.
    pub fn prune_idle(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        before.saturating_sub(self.slots.len())
    }

    /// Run cleanup loop to drop idle slots.
    pub async fn run_cleanup_loop(&self) {
        loop {
            tokio::time::sleep(self.config.cleanup_interval).await;
            let pruned = self.prune_idle();
            if pruned > 0 {
                debug!(pruned, remaining = self.slot_count(), "Pruned idle account locks");
            }
        }
    }
}

//! In-process storage backend.
//!
//! Each account row lives in the same map slot as its ledger entries, so one
//! shard guard covers both halves of a commit: readers observe the account
//! either before or after a transaction, never in between.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use wallet_common::{AccountId, Result, WalletError};

use crate::account::Account;
use crate::journal::{CommitBatch, LedgerEntry, NewEntry};
use crate::query::PageRequest;
use crate::store::{AccountStore, LedgerStore, Storage};

/// Account row plus its entries in creation order.
#[derive(Debug, Clone)]
struct AccountRecord {
    account: Account,
    entries: Vec<LedgerEntry>,
}

impl AccountRecord {
    fn compare_and_set(&mut self, expected: Decimal, new: Decimal) -> Result<()> {
        if self.account.balance != expected {
            return Err(WalletError::conflict(
                self.account.id,
                format!(
                    "expected balance {expected}, found {}",
                    self.account.balance
                ),
            ));
        }
        if new < Decimal::ZERO {
            return Err(WalletError::InsufficientBalance {
                available: self.account.balance,
                requested: new - self.account.balance,
            });
        }
        self.account.balance = new;
        Ok(())
    }
}

/// Thread-safe in-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: DashMap<AccountId, AccountRecord>,
    sequence: AtomicU64,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts held.
    pub fn account_count(&self) -> usize {
        self.records.len()
    }

    /// Ids of every account held.
    pub fn account_ids(&self) -> Vec<AccountId> {
        self.records.iter().map(|r| *r.key()).collect()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl AccountStore for MemoryStorage {
    async fn create(&self, name: &str, initial_balance: Decimal) -> Result<Account> {
        let account = Account::new(name, initial_balance)?;
        self.records.insert(
            account.id,
            AccountRecord {
                account: account.clone(),
                entries: Vec::new(),
            },
        );
        Ok(account)
    }

    async fn get(&self, id: &AccountId) -> Result<Account> {
        self.records
            .get(id)
            .map(|r| r.account.clone())
            .ok_or(WalletError::AccountNotFound(*id))
    }

    async fn compare_and_set_balance(
        &self,
        id: &AccountId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<Account> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or(WalletError::AccountNotFound(*id))?;
        record.compare_and_set(expected, new)?;
        Ok(record.account.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryStorage {
    async fn append(&self, entry: NewEntry) -> Result<LedgerEntry> {
        let mut record = self
            .records
            .get_mut(&entry.account_id)
            .ok_or(WalletError::AccountNotFound(entry.account_id))?;

        let entry = LedgerEntry::record(entry, self.next_sequence());
        record.entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: &PageRequest,
    ) -> Result<Vec<LedgerEntry>> {
        let entries = self
            .records
            .get(account_id)
            .map(|r| r.entries.clone())
            .ok_or(WalletError::AccountNotFound(*account_id))?;
        Ok(page.apply(entries))
    }

    async fn history(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.records
            .get(account_id)
            .map(|r| r.entries.clone())
            .ok_or(WalletError::AccountNotFound(*account_id))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    #[instrument(skip(self))]
    async fn open(&self, name: &str, initial_balance: Decimal) -> Result<(Account, LedgerEntry)> {
        let account = Account::new(name, initial_balance)?;
        let entry = LedgerEntry::record(
            NewEntry::opening(account.id, account.balance),
            self.next_sequence(),
        );

        self.records.insert(
            account.id,
            AccountRecord {
                account: account.clone(),
                entries: vec![entry.clone()],
            },
        );

        debug!(account_id = %account.id, "Account stored with opening entry");
        Ok((account, entry))
    }

    #[instrument(skip(self, batch), fields(account_id = %batch.account_id()))]
    async fn commit(&self, batch: CommitBatch) -> Result<(Account, LedgerEntry)> {
        let account_id = batch.account_id();
        let mut record = self
            .records
            .get_mut(&account_id)
            .ok_or(WalletError::AccountNotFound(account_id))?;

        record.compare_and_set(batch.expected_balance, batch.new_balance())?;

        // Sequence is drawn under the record guard so per-account order matches.
        let entry = LedgerEntry::record(batch.entry, self.next_sequence());
        record.entries.push(entry.clone());

        debug!(sequence = entry.sequence, "Commit applied");
        Ok((record.account.clone(), entry))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

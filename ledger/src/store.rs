//! Store contracts for accounts and the ledger.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use wallet_common::{AccountId, Result};

use crate::account::Account;
use crate::journal::{CommitBatch, LedgerEntry, NewEntry};
use crate::query::PageRequest;

/// Owns account records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account with a validated name and rounded, non-negative balance.
    ///
    /// This writes the account row only; use [`Storage::open`] to also record
    /// the opening ledger entry.
    async fn create(&self, name: &str, initial_balance: Decimal) -> Result<Account>;

    /// Fetch an account.
    async fn get(&self, id: &AccountId) -> Result<Account>;

    /// Set the balance to `new` only if it still equals `expected`.
    ///
    /// Fails with `Conflict` when the stored balance has moved on.
    async fn compare_and_set_balance(
        &self,
        id: &AccountId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<Account>;
}

/// Owns the append-only sequence of ledger entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append an entry. Entries are never edited or removed.
    async fn append(&self, entry: NewEntry) -> Result<LedgerEntry>;

    /// One sorted page of an account's entries.
    async fn list_by_account(
        &self,
        account_id: &AccountId,
        page: &PageRequest,
    ) -> Result<Vec<LedgerEntry>>;

    /// Every entry of an account in creation order.
    async fn history(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>>;
}

/// A durable backend able to write account and ledger together.
#[async_trait]
pub trait Storage: AccountStore + LedgerStore {
    /// Create an account and its opening `Setup` credit as one unit.
    async fn open(&self, name: &str, initial_balance: Decimal) -> Result<(Account, LedgerEntry)>;

    /// Compare-and-set the balance and append the entry as one unit.
    ///
    /// On `Conflict` neither write is visible.
    async fn commit(&self, batch: CommitBatch) -> Result<(Account, LedgerEntry)>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Release connections and other resources.
    async fn close(&self) {}
}

/// Storage shared between the coordinator, the query service and handlers.
pub type SharedStorage = Arc<dyn Storage>;

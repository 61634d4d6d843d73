//! Balance re-derivation from the ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wallet_common::{monetary, AccountId, Result};

use crate::account::Account;
use crate::journal::LedgerEntry;

/// Result of replaying an account's ledger against its cached balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAudit {
    /// Account audited.
    pub account_id: AccountId,
    /// Balance stored on the account row.
    pub cached_balance: Decimal,
    /// Sum of every entry amount, under the rounding policy.
    pub derived_balance: Decimal,
    /// `resulting_balance` of the latest entry by creation order.
    pub last_resulting_balance: Option<Decimal>,
    /// Number of entries replayed.
    pub entry_count: usize,
}

impl LedgerAudit {
    /// Replay `history` (any order) against `account`.
    ///
    /// Fails with `Validation` if the running sum leaves the monetary range.
    pub fn replay(account: &Account, history: &[LedgerEntry]) -> Result<Self> {
        let derived_balance = history
            .iter()
            .try_fold(Decimal::ZERO, |acc, entry| monetary::add(acc, entry.amount))?;

        let last_resulting_balance = history
            .iter()
            .max_by_key(|entry| entry.sequence)
            .map(|entry| entry.resulting_balance);

        Ok(Self {
            account_id: account.id,
            cached_balance: account.balance,
            derived_balance,
            last_resulting_balance,
            entry_count: history.len(),
        })
    }

    /// Cached balance matches both the replayed sum and the latest snapshot.
    pub fn is_consistent(&self) -> bool {
        self.entry_count > 0
            && self.cached_balance == self.derived_balance
            && self.last_resulting_balance == Some(self.cached_balance)
    }

    /// Difference between the ledger and the cached balance.
    pub fn drift(&self) -> Decimal {
        self.derived_balance - self.cached_balance
    }
}

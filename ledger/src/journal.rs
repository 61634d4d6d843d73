//! Ledger entry types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wallet_common::{monetary, AccountId, EntryId, Result, WalletError};

/// Description recorded on the opening entry of every account.
pub const SETUP_DESCRIPTION: &str = "Setup";

/// Direction of a ledger entry, derived from the sign of its amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Amount is zero or positive.
    Credit,
    /// Amount is negative.
    Debit,
}

impl EntryKind {
    /// Classify an amount. Zero counts as a credit.
    pub fn from_amount(amount: Decimal) -> Self {
        if amount >= Decimal::ZERO {
            EntryKind::Credit
        } else {
            EntryKind::Debit
        }
    }

    /// Wire and storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Credit => "CREDIT",
            EntryKind::Debit => "DEBIT",
        }
    }
}

/// An immutable record of one accepted balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID.
    pub id: EntryId,
    /// Account this entry belongs to.
    pub account_id: AccountId,
    /// Creation order, strictly increasing across the store.
    pub sequence: u64,
    /// Signed delta applied to the balance.
    pub amount: Decimal,
    /// Account balance immediately after this entry.
    pub resulting_balance: Decimal,
    /// Trimmed, non-empty description.
    pub description: String,
    /// When this entry was created.
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Materialize a pending entry with its storage-assigned sequence.
    pub fn record(entry: NewEntry, sequence: u64) -> Self {
        Self {
            id: EntryId::new(),
            account_id: entry.account_id,
            sequence,
            amount: entry.amount,
            resulting_balance: entry.resulting_balance,
            description: entry.description,
            occurred_at: Utc::now(),
        }
    }

    /// Credit or debit, from the sign of the amount.
    pub fn kind(&self) -> EntryKind {
        EntryKind::from_amount(self.amount)
    }
}

/// An entry waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub resulting_balance: Decimal,
    pub description: String,
}

impl NewEntry {
    /// Build an entry, rounding the amounts and trimming the description.
    pub fn new(
        account_id: AccountId,
        amount: Decimal,
        resulting_balance: Decimal,
        description: &str,
    ) -> Result<Self> {
        Ok(Self {
            account_id,
            amount: monetary::round(amount),
            resulting_balance: monetary::round(resulting_balance),
            description: validate_description(description)?,
        })
    }

    /// Opening entry for a freshly created account.
    pub fn opening(account_id: AccountId, initial_balance: Decimal) -> Self {
        Self {
            account_id,
            amount: initial_balance,
            resulting_balance: initial_balance,
            description: SETUP_DESCRIPTION.to_string(),
        }
    }
}

/// A balance update and its ledger entry, applied as one unit.
///
/// The update only lands if the stored balance still equals
/// `expected_balance`; otherwise nothing is written.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitBatch {
    pub expected_balance: Decimal,
    pub entry: NewEntry,
}

impl CommitBatch {
    /// Create a new batch.
    pub fn new(expected_balance: Decimal, entry: NewEntry) -> Self {
        Self {
            expected_balance,
            entry,
        }
    }

    /// Account touched by this batch.
    pub fn account_id(&self) -> AccountId {
        self.entry.account_id
    }

    /// Balance written by this batch.
    pub fn new_balance(&self) -> Decimal {
        self.entry.resulting_balance
    }
}

/// Trim a description and reject it if nothing is left.
pub fn validate_description(description: &str) -> Result<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(WalletError::validation(
            "Description is required and must be a string",
            "description",
        ));
    }
    Ok(description.to_string())
}

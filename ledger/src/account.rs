//! Account definitions for the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wallet_common::{monetary, AccountId, Result, WalletError};

/// A wallet account holding a non-negative balance.
///
/// `balance` is a cached projection of the account's ledger: it always equals
/// the `resulting_balance` of the most recently created entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Trimmed, non-empty display name.
    pub name: String,
    /// Current balance, canonical under the rounding policy.
    pub balance: Decimal,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account after validating name and opening balance.
    pub fn new(name: &str, initial_balance: Decimal) -> Result<Self> {
        let name = validate_name(name)?;
        let balance = monetary::bounded(initial_balance, "balance")?;

        if balance < Decimal::ZERO {
            return Err(WalletError::validation(
                "Balance cannot be negative",
                "balance",
            ));
        }

        Ok(Self {
            id: AccountId::new(),
            name,
            balance,
            created_at: Utc::now(),
        })
    }

    /// Return a copy with a new balance.
    pub fn with_balance(&self, balance: Decimal) -> Self {
        Self {
            balance,
            ..self.clone()
        }
    }
}

/// Trim a display name and reject it if nothing is left.
pub fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WalletError::validation(
            "Name is required and must be a string",
            "name",
        ));
    }
    Ok(name.to_string())
}

//! Error types for the wallet ledger.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::AccountId;

/// Main error type for wallet ledger operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    /// Malformed or missing input.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// The referenced account does not exist.
    #[error("Wallet not found: {0}")]
    AccountNotFound(AccountId),

    /// The transaction would drive the balance below zero.
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    /// Concurrent-write contention on an account.
    #[error("Conflicting update on wallet {account_id}: {reason}")]
    Conflict {
        account_id: AccountId,
        reason: String,
    },

    /// The service is not accepting requests.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Underlying storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl WalletError {
    /// Validation error attributed to a field.
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        WalletError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Conflict on an account.
    pub fn conflict(account_id: AccountId, reason: impl Into<String>) -> Self {
        WalletError::Conflict {
            account_id,
            reason: reason.into(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::Conflict { .. })
    }

    /// Check if the caller is at fault (no state was changed).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WalletError::Validation { .. }
                | WalletError::AccountNotFound(_)
                | WalletError::InsufficientBalance { .. }
        )
    }

    /// Get error code for API responses and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::Validation { .. } => "VALIDATION_ERROR",
            WalletError::AccountNotFound(_) => "NOT_FOUND",
            WalletError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WalletError::Conflict { .. } => "CONFLICT",
            WalletError::Unavailable(_) => "UNAVAILABLE",
            WalletError::Storage(_) => "STORAGE_FAILURE",
            WalletError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for wallet ledger operations.
pub type Result<T> = std::result::Result<T, WalletError>;

//! Wallet Transaction Coordinator
//!
//! Applies signed amounts to wallet accounts, serializing commits per account
//! so the stored balance and the ledger never diverge, and serves the result
//! over HTTP.

pub mod coordinator;
pub mod config;
pub mod lock_manager;
pub mod state;
pub mod metrics;
pub mod query;
pub mod http;

pub use coordinator::{AccountOpening, TransactionCoordinator, TransactionReceipt};
pub use config::ServiceConfig;
pub use query::QueryService;
pub use http::{router, AppState};

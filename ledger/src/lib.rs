//! Wallet Ledger Stores
//!
//! Account records plus an append-only ledger of balance changes, behind
//! store contracts with in-memory and PostgreSQL backends.

pub mod account;
pub mod journal;
pub mod balance;
pub mod query;
pub mod store;
pub mod memory;
pub mod postgres;

pub use account::Account;
pub use journal::{CommitBatch, EntryKind, LedgerEntry, NewEntry, SETUP_DESCRIPTION};
pub use balance::LedgerAudit;
pub use query::{PageRequest, SortDirection, SortKey};
pub use store::{AccountStore, LedgerStore, SharedStorage, Storage};
pub use memory::MemoryStorage;
pub use postgres::PgStorage;

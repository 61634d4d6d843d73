//! Wallet Ledger Common Types
//!
//! This crate contains shared types used across the wallet ledger,
//! including identifiers, the monetary rounding policy and the error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;

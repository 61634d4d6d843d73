//! Monetary rounding policy for the wallet ledger.
//!
//! Every amount entering the system and every balance written back to storage
//! is canonicalized to [`SCALE`] fractional digits with round-half-away-from-zero.
//! Balances are only ever recomputed through [`add`], so replaying a ledger
//! reproduces the stored balance exactly.
//!
//! Magnitudes must stay below 10^[`MAX_INTEGER_DIGITS`]. Inside that bound a
//! sum of two values keeps all [`SCALE`] fractional digits; outside it
//! `Decimal` would drop them or overflow.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Result, WalletError};

/// Number of fractional digits kept for amounts and balances.
pub const SCALE: u32 = 4;

/// Midpoint handling used by [`round`].
pub const STRATEGY: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Integer digits allowed in an amount or balance.
pub const MAX_INTEGER_DIGITS: u32 = 24;

/// Round a magnitude to [`SCALE`] fractional digits.
pub fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, STRATEGY)
}

/// Exclusive upper bound on the magnitude of amounts and balances.
pub fn max_magnitude() -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(MAX_INTEGER_DIGITS), 0)
}

/// Round `value` and reject it if its magnitude is out of range.
pub fn bounded(value: Decimal, field: &str) -> Result<Decimal> {
    let value = round(value);
    if value.abs() >= max_magnitude() {
        return Err(WalletError::validation(
            format!("{field} must be below 1e{MAX_INTEGER_DIGITS} in magnitude"),
            field,
        ));
    }
    Ok(value)
}

/// Add two magnitudes under the rounding policy: `round(round(a) + round(b))`.
///
/// Fails with `Validation` when an operand or the sum is out of range.
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    let a = bounded(a, "balance")?;
    let b = bounded(b, "amount")?;
    let sum = a
        .checked_add(b)
        .ok_or_else(|| WalletError::validation("balance overflowed", "balance"))?;
    bounded(sum, "balance")
}

/// Convert a client-supplied float, rejecting NaN and infinities.
///
/// `field` names the offending input in the validation error.
pub fn from_f64(value: f64, field: &str) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(WalletError::validation(
            format!("{field} must be a finite number"),
            field,
        ));
    }

    let value = Decimal::from_f64(value).ok_or_else(|| {
        WalletError::validation(format!("{field} is out of range"), field)
    })?;
    bounded(value, field)
}

/// Check whether a value is already canonical under the rounding policy.
pub fn is_canonical(value: Decimal) -> bool {
    round(value) == value
}

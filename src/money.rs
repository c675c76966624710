//! Money Conversion Module
//!
//! Unified conversion between the internal i64 minor-unit representation
//! (hundredths) and client-facing floating amounts. All conversions MUST go
//! through this module; everything behind the public API operates on
//! integers exclusively.
//!
//! ## Design Principles
//! 1. Explicit Error Handling: no silent truncation
//! 2. Deterministic rounding: half-to-even at 2 decimal places
//! 3. Checked scaling: overflow is an error, never a wrap

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Decimal places carried internally.
pub const DECIMALS: u32 = 2;

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount must be a finite number")]
    NotFinite,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,
}

/// Converts a client-provided amount to minor units.
///
/// The value is rounded half-to-even to 2 decimals before scaling, so
/// `32.98` maps to `3298` and `0.125` to `12`. Non-finite, zero and
/// negative inputs are rejected.
///
/// # Example
/// parse_amount(1.5) -> 150
pub fn parse_amount(amount: f64) -> Result<i64, MoneyError> {
    if !amount.is_finite() {
        return Err(MoneyError::NotFinite);
    }

    let amount = Decimal::from_f64(amount).ok_or(MoneyError::NotFinite)?;
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let rounded = amount.round_dp_with_strategy(DECIMALS, RoundingStrategy::MidpointNearestEven);
    if rounded.is_zero() {
        // Sub-cent dust (e.g. 0.001) rounds to nothing
        return Err(MoneyError::InvalidAmount);
    }

    let scaled = rounded
        .checked_mul(Decimal::from(10i64.pow(DECIMALS)))
        .ok_or(MoneyError::Overflow)?;

    scaled.to_i64().ok_or(MoneyError::Overflow)
}

/// Formats minor units back to a client-facing float at 2 decimal places.
///
/// # Example
/// format_amount(3298) -> 32.98
pub fn format_amount(minor: i64) -> f64 {
    let value = Decimal::from(minor) / Decimal::from(10i64.pow(DECIMALS));
    value.round_dp(DECIMALS).to_f64().unwrap_or(0.0)
}

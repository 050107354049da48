//! Money Conversion Module
//!
//! Conversion between client strings, `Decimal` amounts and integer base
//! units (satoshi, wei, ...). All precision checks go through this module.
//!
//! ## Design Principles
//! 1. Explicit Error Handling: no silent truncation
//! 2. Base units are `u128` (an 18-decimal coin overflows `u64` above ~18.4 coins)
//! 3. Display rounding is half-away-from-zero, never truncation
//!
//! ## Usage
//! ```rust
//! use payment_lifecycle::money::{parse_amount, to_base_units, format_amount};
//!
//! let btc = parse_amount("0.001", 8).unwrap();
//! assert_eq!(to_base_units(btc, 8).unwrap(), 100_000);
//! assert_eq!(format_amount(btc, 8), "0.00100000");
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

use crate::core_types::FiatCurrency;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Client → Decimal
// ============================================================================

/// Parse a client string amount, rejecting anything ambiguous.
///
/// # Errors
/// * `PrecisionOverflow` - more fractional digits than `decimals`
/// * `InvalidAmount` - zero or signed
/// * `InvalidFormat` - commas, exponents, `.5`, `5.`, multiple dots
pub fn parse_amount(amount_str: &str, decimals: u32) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    let (whole, frac) = match parts.len() {
        1 => (parts[0], ""),
        2 => {
            // Both sides of the dot must be present
            if parts[0].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if parts[1].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            if decimals == 0 {
                return Err(MoneyError::InvalidFormat(
                    "decimals is 0, but dot provided".into(),
                ));
            }
            (parts[0], parts[1])
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    };

    if !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in whole part: {}",
            whole
        )));
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat("invalid fractional part".into()));
    }

    // REJECT if too many decimals (no silent truncation!)
    if frac.len() > decimals as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: decimals,
        });
    }

    let amount = Decimal::from_str(amount_str).map_err(|_| MoneyError::Overflow)?;
    if amount.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(amount)
}

/// Check a `Decimal` amount is positive and fits `decimals` places.
///
/// Trailing zeros do not count against the precision (`1.2300` at 2 is fine).
pub fn check_amount(amount: Decimal, decimals: u32) -> Result<(), MoneyError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let scale = amount.normalize().scale();
    if scale > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided: scale,
            max: decimals,
        });
    }

    Ok(())
}

// ============================================================================
// Base units
// ============================================================================

/// Convert a whole-unit amount to integer base units (e.g. BTC → satoshi)
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128, MoneyError> {
    if amount.is_sign_negative() {
        return Err(MoneyError::InvalidAmount);
    }

    let scale = amount.normalize().scale();
    if scale > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided: scale,
            max: decimals,
        });
    }

    let multiplier = Decimal::from(10u64.pow(decimals));
    let scaled = amount
        .checked_mul(multiplier)
        .ok_or(MoneyError::Overflow)?;

    scaled.to_u128().ok_or(MoneyError::Overflow)
}

/// Convert integer base units back to a whole-unit amount (exact)
pub fn from_base_units(units: u128, decimals: u32) -> Result<Decimal, MoneyError> {
    let signed = i128::try_from(units).map_err(|_| MoneyError::Overflow)?;
    Decimal::try_from_i128_with_scale(signed, decimals).map_err(|_| MoneyError::Overflow)
}

// ============================================================================
// Format: Decimal → String
// ============================================================================

/// Format at exactly `decimals` places, rounding half away from zero
pub fn format_amount(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.prec$}", rounded, prec = decimals as usize)
}

/// Format a fiat value the way the portal displays it: `UGX 50,000`, `USD 1,234.50`
pub fn format_fiat(value: Decimal, currency: FiatCurrency) -> String {
    let fixed = format_amount(value.abs(), currency.decimals());
    let (whole, frac) = match fixed.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value.is_sign_negative() && !value.is_zero() {
        "-"
    } else {
        ""
    };

    match frac {
        Some(frac) => format!("{} {}{}.{}", currency.code(), sign, grouped, frac),
        None => format!("{} {}{}", currency.code(), sign, grouped),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

//! Decimal shifting between human-readable amounts and raw integer units
//!
//! Every amount crossing the vault boundary exists twice: the human decimal
//! string the user typed (`"1.5"`) and the raw integer string in the asset's
//! smallest unit (`"1500000"` for 6 decimals).

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::VaultError;
use crate::Result;

/// Shift a human decimal amount up by `decimals` into raw integer units
///
/// Rejects negative amounts and amounts with more fractional digits than the
/// asset supports. Zero is rejected unless `allow_zero` is set (max-send).
pub fn to_raw(amount: &str, decimals: u32, allow_zero: bool) -> Result<u128> {
    let mut value = Decimal::from_str(amount.trim())
        .map_err(|e| VaultError::InvalidAmount(format!("{}: {}", amount, e)))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(VaultError::InvalidAmount(format!(
            "{} must not be negative",
            amount
        )));
    }
    if value.is_zero() && !allow_zero {
        return Err(VaultError::InvalidAmount(format!(
            "{} must be greater than zero",
            amount
        )));
    }

    let value_normalized = value.normalize();
    if value_normalized.scale() > decimals {
        return Err(VaultError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            amount, decimals
        )));
    }

    value.rescale(decimals);
    if value.scale() != decimals {
        return Err(VaultError::InvalidAmount(format!(
            "{} cannot be represented with {} decimals",
            amount, decimals
        )));
    }

    u128::try_from(value.mantissa())
        .map_err(|_| VaultError::InvalidAmount(format!("{} is out of range", amount)))
}

/// Same as [`to_raw`] but returns the raw integer as a decimal string
pub fn to_raw_string(amount: &str, decimals: u32, allow_zero: bool) -> Result<String> {
    to_raw(amount, decimals, allow_zero).map(|raw| raw.to_string())
}

/// Shift a raw integer amount down by `decimals` into a normalized decimal string
pub fn from_raw(raw: u128, decimals: u32) -> Result<String> {
    let mantissa = i128::try_from(raw)
        .map_err(|_| VaultError::InvalidAmount(format!("{} is out of range", raw)))?;
    let value = Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map_err(|e| VaultError::InvalidAmount(format!("{}: {}", raw, e)))?;
    Ok(value.normalize().to_string())
}

/// Parse a raw integer string (as found in chain payloads) and shift it down
pub fn from_raw_str(raw: &str, decimals: u32) -> Result<String> {
    let value = raw
        .trim()
        .parse::<u128>()
        .map_err(|e| VaultError::InvalidAmount(format!("{}: {}", raw, e)))?;
    from_raw(value, decimals)
}

//! Money Conversion Module
//!
//! Unified conversion between the internal integer minor-unit
//! representation and client/provider-facing decimal strings. All
//! conversions MUST go through this module.
//!
//! ## Internal Representation
//! - All amounts are `u64` minor units (kobo, cents)
//! - The scale factor is `10^exponent` for the currency's minor-unit
//!   exponent

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;

use crate::core_types::Amount;

/// Money conversion errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),
    #[error("Amount must not be negative")]
    Negative,
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },
    #[error("Amount too large, would overflow")]
    Overflow,
}

/// Minor-unit exponent for an ISO currency code. Zero-decimal currencies
/// carry their face value; everything else uses two decimals.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    match currency.to_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "UGX" => 0,
        _ => 2,
    }
}

/// Parse a decimal string (e.g. `"5000.00"`) into minor units.
///
/// Rejects negative values and more fractional digits than the currency
/// carries; never silently truncates.
pub fn parse_amount(input: &str, exponent: u32) -> Result<Amount, MoneyError> {
    let value = Decimal::from_str(input.trim())
        .map_err(|_| MoneyError::InvalidFormat(input.to_string()))?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(MoneyError::Negative);
    }

    let normalized = value.normalize();
    if normalized.scale() > exponent {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: exponent,
        });
    }

    let scale = Decimal::from(10u64.pow(exponent));
    let scaled = normalized.checked_mul(scale).ok_or(MoneyError::Overflow)?;
    scaled.to_u64().ok_or(MoneyError::Overflow)
}

/// Format minor units as a decimal string with the currency's exponent.
pub fn format_amount(amount: Amount, exponent: u32) -> String {
    Decimal::from_i128_with_scale(amount as i128, exponent).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!(parse_amount("5000", 2).unwrap(), 500_000);
        assert_eq!(parse_amount("5000.00", 2).unwrap(), 500_000);
        assert_eq!(parse_amount("5000.50", 2).unwrap(), 500_050);
        assert_eq!(parse_amount("0.01", 2).unwrap(), 1);
        assert_eq!(parse_amount("0", 2).unwrap(), 0);
    }

    #[test]
    fn test_parse_zero_decimal_currency() {
        assert_eq!(parse_amount("5000", 0).unwrap(), 5_000);
        assert_eq!(
            parse_amount("5000.5", 0).unwrap_err(),
            MoneyError::PrecisionOverflow {
                provided: 1,
                max: 0
            }
        );
    }

    #[test]
    fn test_parse_rejects_excess_precision() {
        assert_eq!(
            parse_amount("1.001", 2).unwrap_err(),
            MoneyError::PrecisionOverflow {
                provided: 3,
                max: 2
            }
        );
    }

    #[test]
    fn test_parse_rejects_negative_and_garbage() {
        assert_eq!(parse_amount("-1", 2).unwrap_err(), MoneyError::Negative);
        assert!(matches!(
            parse_amount("abc", 2).unwrap_err(),
            MoneyError::InvalidFormat(_)
        ));
    }

    #[test]
    fn test_format_roundtrip() {
        assert_eq!(format_amount(500_000, 2), "5000.00");
        assert_eq!(format_amount(1, 2), "0.01");
        assert_eq!(format_amount(5_000, 0), "5000");
        assert_eq!(parse_amount(&format_amount(123_456, 2), 2).unwrap(), 123_456);
    }

    #[test]
    fn test_exponent_lookup() {
        assert_eq!(minor_unit_exponent("NGN"), 2);
        assert_eq!(minor_unit_exponent("usd"), 2);
        assert_eq!(minor_unit_exponent("JPY"), 0);
    }
}

//! Fee rule evaluation
//!
//! Rules are authored externally and consumed here as persisted
//! configuration. All arithmetic is integer minor-units with u128
//! intermediates to prevent overflow; percentage rates are carried as basis
//! points internally (10_000 = 100%).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::Amount;

/// Basis-point precision (10_000 = 100%)
pub const BPS_PRECISION: u128 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("Percentage rate is not a finite non-negative number")]
    InvalidRate,
    #[error("No tiered bracket matches amount {0}")]
    NoMatchingBracket(Amount),
}

/// Flat-or-percentage value applied by a tiered bracket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BracketValue {
    Flat { value: Amount },
    Percentage { percent: f64, cap: Option<Amount> },
}

/// One tier of a tiered fee rule. `max_amount = None` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBracket {
    pub min_amount: Amount,
    pub max_amount: Option<Amount>,
    #[serde(flatten)]
    pub value: BracketValue,
}

impl FeeBracket {
    fn matches(&self, amount: Amount) -> bool {
        amount >= self.min_amount && self.max_amount.is_none_or(|max| amount <= max)
    }
}

/// A fee rule for one transaction category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeeRule {
    Flat { value: Amount },
    Percentage { percent: f64, cap: Option<Amount> },
    Tiered { brackets: Vec<FeeBracket> },
}

impl Default for FeeRule {
    fn default() -> Self {
        FeeRule::Flat { value: 0 }
    }
}

impl FeeRule {
    /// Compute the fee for `amount` minor units.
    pub fn compute(&self, amount: Amount) -> Result<Amount, FeeError> {
        match self {
            FeeRule::Flat { value } => Ok(*value),
            FeeRule::Percentage { percent, cap } => percentage_fee(amount, *percent, *cap),
            FeeRule::Tiered { brackets } => {
                let bracket = brackets
                    .iter()
                    .find(|b| b.matches(amount))
                    .ok_or(FeeError::NoMatchingBracket(amount))?;
                match &bracket.value {
                    BracketValue::Flat { value } => Ok(*value),
                    BracketValue::Percentage { percent, cap } => {
                        percentage_fee(amount, *percent, *cap)
                    }
                }
            }
        }
    }
}

/// `min(amount * percent / 100, cap)` in integer basis-point math.
fn percentage_fee(amount: Amount, percent: f64, cap: Option<Amount>) -> Result<Amount, FeeError> {
    if !percent.is_finite() || percent < 0.0 {
        return Err(FeeError::InvalidRate);
    }
    let bps = (percent * 100.0).round() as u128;
    let fee = (amount as u128 * bps) / BPS_PRECISION;
    let fee = u64::try_from(fee).unwrap_or(u64::MAX);
    Ok(match cap {
        Some(cap) => fee.min(cap),
        None => fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_fee() {
        let rule = FeeRule::Flat { value: 50_00 };
        assert_eq!(rule.compute(1_000_00).unwrap(), 50_00);
        assert_eq!(rule.compute(0).unwrap(), 50_00);
    }

    #[test]
    fn test_percentage_fee() {
        // 1.5% of 10_000_00
        let rule = FeeRule::Percentage {
            percent: 1.5,
            cap: None,
        };
        assert_eq!(rule.compute(10_000_00).unwrap(), 150_00);
    }

    #[test]
    fn test_percentage_fee_capped() {
        let rule = FeeRule::Percentage {
            percent: 1.5,
            cap: Some(100_00),
        };
        assert_eq!(rule.compute(10_000_00).unwrap(), 100_00);
        // Below the cap the raw percentage applies
        assert_eq!(rule.compute(1_000_00).unwrap(), 15_00);
    }

    #[test]
    fn test_percentage_rejects_bad_rate() {
        let rule = FeeRule::Percentage {
            percent: f64::NAN,
            cap: None,
        };
        assert_eq!(rule.compute(100).unwrap_err(), FeeError::InvalidRate);

        let rule = FeeRule::Percentage {
            percent: -1.0,
            cap: None,
        };
        assert_eq!(rule.compute(100).unwrap_err(), FeeError::InvalidRate);
    }

    #[test]
    fn test_tiered_fee_brackets() {
        let rule = FeeRule::Tiered {
            brackets: vec![
                FeeBracket {
                    min_amount: 0,
                    max_amount: Some(5_000_00),
                    value: BracketValue::Flat { value: 10_00 },
                },
                FeeBracket {
                    min_amount: 5_000_01,
                    max_amount: Some(50_000_00),
                    value: BracketValue::Flat { value: 25_00 },
                },
                FeeBracket {
                    min_amount: 50_000_01,
                    max_amount: None,
                    value: BracketValue::Percentage {
                        percent: 0.1,
                        cap: Some(500_00),
                    },
                },
            ],
        };

        assert_eq!(rule.compute(1_000_00).unwrap(), 10_00);
        assert_eq!(rule.compute(5_000_00).unwrap(), 10_00); // Inclusive upper bound
        assert_eq!(rule.compute(5_000_01).unwrap(), 25_00);
        assert_eq!(rule.compute(100_000_00).unwrap(), 100_00); // 0.1%
        assert_eq!(rule.compute(1_000_000_00).unwrap(), 500_00); // Capped
    }

    #[test]
    fn test_tiered_gap_is_an_error() {
        let rule = FeeRule::Tiered {
            brackets: vec![FeeBracket {
                min_amount: 100,
                max_amount: Some(200),
                value: BracketValue::Flat { value: 1 },
            }],
        };
        assert_eq!(rule.compute(99).unwrap_err(), FeeError::NoMatchingBracket(99));
    }

    #[test]
    fn test_no_overflow_on_large_amounts() {
        let rule = FeeRule::Percentage {
            percent: 0.2,
            cap: None,
        };
        let large: Amount = 10_000_000_000_000_000_000; // 10^19
        assert_eq!(rule.compute(large).unwrap(), 20_000_000_000_000_000);
    }

    #[test]
    fn test_serde_shape() {
        let yaml = r#"
type: percentage
percent: 1.5
cap: 10000
"#;
        let rule: FeeRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            rule,
            FeeRule::Percentage {
                percent: 1.5,
                cap: Some(10_000),
            }
        );
    }
}

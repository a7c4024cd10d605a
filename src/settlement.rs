//! Settlement configuration and exact-penny splitting
//!
//! Settled virtual-account funds are swept to one or more destination bank
//! accounts by percentage split. Percentages are validated at the boundary
//! (sum must be 100 within 0.01) and never persisted otherwise; the split
//! computation itself assigns the rounding remainder to the first account so
//! no minor unit is ever created or lost.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core_types::Amount;
use crate::payout::provider::ProviderClient;
use crate::store::{LedgerStore, StoreError};

/// Basis points per whole unit (100% = 10_000 bps)
const BPS_FULL: u128 = 10_000;
/// Accepted deviation of a percentage list from 100, in percent
const SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Settlement percentages sum to {sum:.4}, expected 100 +/- 0.01")]
    PercentageMismatch { sum: f64 },
    #[error("Settlement split list is empty")]
    EmptySplitList,
    #[error("Invalid percentage {0} in split list")]
    InvalidPercentage(f64),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Settlement sweep cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleType {
    /// Next business day
    T1,
    /// Weekly
    T7,
    /// Monthly
    T30,
}

impl ScheduleType {
    pub fn days(&self) -> u32 {
        match self {
            ScheduleType::T1 => 1,
            ScheduleType::T7 => 7,
            ScheduleType::T30 => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::T1 => "T1",
            ScheduleType::T7 => "T7",
            ScheduleType::T30 => "T30",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "T1" => Ok(ScheduleType::T1),
            "T7" => Ok(ScheduleType::T7),
            "T30" => Ok(ScheduleType::T30),
            _ => Err(format!("Invalid schedule type: {}", s)),
        }
    }
}

/// One destination account and its share of each settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitEntry {
    pub account_number: String,
    pub bank_code: String,
    pub percentage: f64,
}

/// System-wide settlement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub schedule_type: ScheduleType,
    /// Override of the schedule cadence in days; defaults to the
    /// schedule type's own period.
    pub schedule_period: Option<u32>,
    pub splits: Vec<SplitEntry>,
}

impl SettlementConfig {
    pub fn period_days(&self) -> u32 {
        self.schedule_period.unwrap_or(self.schedule_type.days())
    }
}

/// Validate a split list: non-empty, each percentage finite and positive,
/// sum within 0.01 of 100.
pub fn validate_splits(splits: &[SplitEntry]) -> Result<(), SettlementError> {
    if splits.is_empty() {
        return Err(SettlementError::EmptySplitList);
    }
    for entry in splits {
        if !entry.percentage.is_finite() || entry.percentage <= 0.0 {
            return Err(SettlementError::InvalidPercentage(entry.percentage));
        }
    }
    let sum: f64 = splits.iter().map(|e| e.percentage).sum();
    // The small epsilon keeps accumulated f64 noise from rejecting a list
    // sitting exactly on the tolerance boundary (e.g. 33.33 * 3).
    if (sum - 100.0).abs() > SUM_TOLERANCE + 1e-9 {
        return Err(SettlementError::PercentageMismatch { sum });
    }
    Ok(())
}

/// Split `amount` across the validated list, exact to the minor unit.
///
/// Each share is `round(amount * percentage / 100)` in integer basis-point
/// math; the rounding remainder goes to the first account so the parts
/// always sum to exactly `amount`.
pub fn split_settlement(
    amount: Amount,
    splits: &[SplitEntry],
) -> Result<Vec<Amount>, SettlementError> {
    validate_splits(splits)?;

    let mut shares: Vec<Amount> = splits
        .iter()
        .map(|e| {
            let bps = (e.percentage * 100.0).round() as u128;
            // Round half-up
            let share = (amount as u128 * bps + BPS_FULL / 2) / BPS_FULL;
            share.min(amount as u128) as Amount
        })
        .collect();

    let assigned: u128 = shares.iter().map(|s| *s as u128).sum();
    let remainder = amount as i128 - assigned as i128;
    let first = shares[0] as i128 + remainder;
    if first < 0 {
        // Unreachable for a list that passed validation; guard anyway so a
        // pathological config cannot mint negative money.
        return Err(SettlementError::PercentageMismatch {
            sum: splits.iter().map(|e| e.percentage).sum(),
        });
    }
    shares[0] = first as Amount;

    Ok(shares)
}

/// Aggregate outcome of a bulk auto-configuration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfigureSummary {
    pub configured: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Settlement configuration service: boundary validation, persistence and
/// bulk application of the global split to provider-side virtual accounts.
pub struct SettlementService {
    store: Arc<dyn LedgerStore>,
    provider: Arc<dyn ProviderClient>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn LedgerStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { store, provider }
    }

    /// Accept a new configuration. Invalid percentage lists are rejected
    /// here and never reach the store.
    pub async fn update_config(&self, config: SettlementConfig) -> Result<(), SettlementError> {
        validate_splits(&config.splits)?;
        self.store.save_settlement_config(&config).await?;
        info!(
            schedule = %config.schedule_type,
            accounts = config.splits.len(),
            "Settlement configuration updated"
        );
        Ok(())
    }

    pub async fn config(&self) -> Result<Option<SettlementConfig>, SettlementError> {
        Ok(self.store.get_settlement_config().await?)
    }

    /// Apply the current global configuration to every virtual account.
    ///
    /// Per-account independent: one provider failure is counted and skipped,
    /// never aborts the run. Accounts already configured are skipped, which
    /// makes re-running the operation idempotent.
    pub async fn auto_configure_all(
        &self,
        config: &SettlementConfig,
    ) -> Result<ConfigureSummary, SettlementError> {
        validate_splits(&config.splits)?;

        let accounts = self.store.list_virtual_accounts().await?;
        let mut summary = ConfigureSummary::default();

        for account in accounts {
            if account.settlement_configured {
                summary.skipped += 1;
                continue;
            }
            match self
                .provider
                .apply_split_config(&account.account_number, &config.splits)
                .await
            {
                Ok(()) => {
                    self.store
                        .mark_virtual_account_configured(&account.account_reference)
                        .await?;
                    summary.configured += 1;
                }
                Err(e) => {
                    warn!(
                        account = %account.account_number,
                        error = %e,
                        "Failed to configure settlement split"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            configured = summary.configured,
            skipped = summary.skipped,
            failed = summary.failed,
            "Bulk settlement configuration finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pct: f64) -> SplitEntry {
        SplitEntry {
            account_number: format!("0{}", (pct * 100.0) as u64),
            bank_code: "058".to_string(),
            percentage: pct,
        }
    }

    #[test]
    fn test_validate_accepts_exact_hundred() {
        assert!(validate_splits(&[entry(60.0), entry(40.0)]).is_ok());
    }

    #[test]
    fn test_validate_accepts_within_tolerance() {
        assert!(validate_splits(&[entry(33.33), entry(33.33), entry(33.33)]).is_ok());
    }

    #[test]
    fn test_validate_rejects_outside_tolerance() {
        let err = validate_splits(&[entry(60.0), entry(39.0)]).unwrap_err();
        assert!(matches!(err, SettlementError::PercentageMismatch { .. }));

        let err = validate_splits(&[entry(60.0), entry(40.02)]).unwrap_err();
        assert!(matches!(err, SettlementError::PercentageMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_empty_and_nonpositive() {
        assert!(matches!(
            validate_splits(&[]).unwrap_err(),
            SettlementError::EmptySplitList
        ));
        assert!(matches!(
            validate_splits(&[entry(100.0), entry(0.0)]).unwrap_err(),
            SettlementError::InvalidPercentage(_)
        ));
    }

    #[test]
    fn test_split_60_40() {
        // 10,000.00 split 60/40 -> 6,000.00 and 4,000.00
        let shares = split_settlement(10_000_00, &[entry(60.0), entry(40.0)]).unwrap();
        assert_eq!(shares, vec![6_000_00, 4_000_00]);
    }

    #[test]
    fn test_split_conserves_every_minor_unit() {
        let splits = [entry(33.33), entry(33.33), entry(33.33)];
        for amount in [1u64, 99, 100, 101, 10_000, 99_999_999, 1_000_000_003] {
            let shares = split_settlement(amount, &splits).unwrap();
            let total: Amount = shares.iter().sum();
            assert_eq!(total, amount, "lost money splitting {}", amount);
        }
    }

    #[test]
    fn test_split_remainder_goes_to_first_account() {
        // 100 split three ways: raw shares are 33/33/33, remainder 1 -> first
        let shares = split_settlement(100, &[entry(33.33), entry(33.33), entry(33.33)]).unwrap();
        assert_eq!(shares, vec![34, 33, 33]);
    }

    #[test]
    fn test_split_single_account_takes_all() {
        let shares = split_settlement(777, &[entry(100.0)]).unwrap();
        assert_eq!(shares, vec![777]);
    }

    #[test]
    fn test_schedule_type_parse() {
        assert_eq!("t7".parse::<ScheduleType>().unwrap(), ScheduleType::T7);
        assert_eq!(ScheduleType::T30.days(), 30);
        assert!("T14".parse::<ScheduleType>().is_err());
    }

    #[test]
    fn test_period_override() {
        let config = SettlementConfig {
            schedule_type: ScheduleType::T7,
            schedule_period: Some(14),
            splits: vec![entry(100.0)],
        };
        assert_eq!(config.period_days(), 14);

        let config = SettlementConfig {
            schedule_period: None,
            ..config
        };
        assert_eq!(config.period_days(), 7);
    }
}

//! Transaction Log types
//!
//! One immutable record per economic event. The globally-unique `reference`
//! is the idempotency backstop for the whole ledger: a duplicate reference is
//! returned as-is instead of being applied again. The only post-insert
//! mutation is the `is_cleared`/`cleared_at` transition performed by the
//! clearance scheduler.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{Amount, TxRef, UserId, WalletId};

/// Direction of a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TxType {
    Credit = 1,
    Debit = 2,
}

impl TxType {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TxType::Credit),
            2 => Some(TxType::Debit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Credit => "credit",
            TxType::Debit => "debit",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Economic category of a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TxCategory {
    Deposit = 1,
    Transfer = 2,
    Withdrawal = 3,
    Refund = 4,
    Fee = 5,
    Settlement = 6,
}

impl TxCategory {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TxCategory::Deposit),
            2 => Some(TxCategory::Transfer),
            3 => Some(TxCategory::Withdrawal),
            4 => Some(TxCategory::Refund),
            5 => Some(TxCategory::Fee),
            6 => Some(TxCategory::Settlement),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxCategory::Deposit => "deposit",
            TxCategory::Transfer => "transfer",
            TxCategory::Withdrawal => "withdrawal",
            TxCategory::Refund => "refund",
            TxCategory::Fee => "fee",
            TxCategory::Settlement => "settlement",
        }
    }

    /// Deposits enter the clearance queue; every other credit category is
    /// spendable the moment it lands.
    pub fn clears_immediately(&self) -> bool {
        !matches!(self, TxCategory::Deposit)
    }
}

impl fmt::Display for TxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deposit" => Ok(TxCategory::Deposit),
            "transfer" => Ok(TxCategory::Transfer),
            "withdrawal" => Ok(TxCategory::Withdrawal),
            "refund" => Ok(TxCategory::Refund),
            "fee" => Ok(TxCategory::Fee),
            "settlement" => Ok(TxCategory::Settlement),
            _ => Err(format!("Invalid transaction category: {}", s)),
        }
    }
}

/// Processing status of a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum TxStatus {
    Pending = 1,
    Success = 2,
    Failed = 3,
}

impl TxStatus {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TxStatus::Pending),
            2 => Some(TxStatus::Success),
            3 => Some(TxStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of a single ledger mutation.
///
/// Invariant: `balance_after = balance_before + amount` for credits,
/// `balance_before - amount` for debits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub reference: TxRef,
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub tx_type: TxType,
    pub category: TxCategory,
    pub amount: Amount,
    pub fee: Amount,
    pub balance_before: Amount,
    pub balance_after: Amount,
    /// Provider's own identifier for the underlying event, if any
    pub external_ref: Option<String>,
    pub status: TxStatus,
    pub is_cleared: bool,
    pub cleared_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl Transaction {
    /// Check the balance arithmetic invariant for this record.
    pub fn balances_consistent(&self) -> bool {
        match self.tx_type {
            TxType::Credit => self.balance_before.checked_add(self.amount) == Some(self.balance_after),
            TxType::Debit => self.balance_before.checked_sub(self.amount) == Some(self.balance_after),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tx[{}] {} {} wallet={} amount={} status={}",
            self.reference, self.tx_type, self.category, self.wallet_id, self.amount, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_type_roundtrip() {
        assert_eq!(TxType::from_id(1), Some(TxType::Credit));
        assert_eq!(TxType::from_id(2), Some(TxType::Debit));
        assert_eq!(TxType::from_id(0), None);
        assert_eq!(TxType::from_id(3), None);
    }

    #[test]
    fn test_category_roundtrip() {
        for cat in [
            TxCategory::Deposit,
            TxCategory::Transfer,
            TxCategory::Withdrawal,
            TxCategory::Refund,
            TxCategory::Fee,
            TxCategory::Settlement,
        ] {
            assert_eq!(TxCategory::from_id(cat.id()), Some(cat));
            assert_eq!(cat.as_str().parse::<TxCategory>().unwrap(), cat);
        }
        assert_eq!(TxCategory::from_id(0), None);
    }

    #[test]
    fn test_only_deposits_enter_clearance_queue() {
        assert!(!TxCategory::Deposit.clears_immediately());
        assert!(TxCategory::Transfer.clears_immediately());
        assert!(TxCategory::Refund.clears_immediately());
        assert!(TxCategory::Settlement.clears_immediately());
    }

    #[test]
    fn test_balance_invariant_check() {
        let mut tx = Transaction {
            reference: TxRef::new("R1"),
            wallet_id: 1,
            user_id: 1001,
            tx_type: TxType::Credit,
            category: TxCategory::Deposit,
            amount: 500_000,
            fee: 0,
            balance_before: 100,
            balance_after: 500_100,
            external_ref: Some("PROV-1".to_string()),
            status: TxStatus::Success,
            is_cleared: false,
            cleared_at: None,
            created_at: Utc::now(),
            metadata: None,
        };
        assert!(tx.balances_consistent());

        tx.balance_after = 500_101;
        assert!(!tx.balances_consistent());

        tx.tx_type = TxType::Debit;
        tx.balance_before = 600_000;
        tx.balance_after = 100_000;
        assert!(tx.balances_consistent());
    }
}

//! Payout Core Types
//!
//! Type definitions for the payout state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{Amount, PayoutId, TxRef, UserId, WalletId};

/// Payout FSM state
///
/// ```text
/// Initiated --> Processing --> Completed
///                   |--------> Failed
///                   |--------> ManualReview
/// ```
///
/// `ManualReview` is reached when the provider outcome is ambiguous or the
/// retry ceiling was exceeded: money may already have left the funding
/// account, so the payout must never be silently marked failed and its
/// reservation stays held until an operator resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum PayoutStatus {
    Initiated = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
    ManualReview = 5,
}

impl PayoutStatus {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(PayoutStatus::Initiated),
            2 => Some(PayoutStatus::Processing),
            3 => Some(PayoutStatus::Completed),
            4 => Some(PayoutStatus::Failed),
            5 => Some(PayoutStatus::ManualReview),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Initiated => "INITIATED",
            PayoutStatus::Processing => "PROCESSING",
            PayoutStatus::Completed => "COMPLETED",
            PayoutStatus::Failed => "FAILED",
            PayoutStatus::ManualReview => "MANUAL_REVIEW",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Failed)
    }

    /// States an operator has to look at.
    pub fn needs_attention(&self) -> bool {
        matches!(self, PayoutStatus::ManualReview)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final outcome the provider reports for an outbound transfer, via
/// webhook or polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOutcome {
    Success,
    Failed,
    /// Completed first, then clawed back by the provider
    Reversed,
}

/// Destination kind for a payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum PayoutType {
    /// Between wallets on the platform
    Internal = 1,
    /// To an external bank account via the payment provider
    External = 2,
}

impl PayoutType {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(PayoutType::Internal),
            2 => Some(PayoutType::External),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutType::Internal => "internal",
            PayoutType::External => "external",
        }
    }
}

impl fmt::Display for PayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Destination bank account of a payout request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub account_number: String,
    pub bank_code: String,
    pub account_name: Option<String>,
}

/// One withdrawal request and its lifecycle.
///
/// `total_debit = amount + fee + provider_fee` is what gets reserved at
/// initiation and debited at completion.
#[derive(Debug, Clone)]
pub struct Payout {
    pub payout_id: PayoutId,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub amount: Amount,
    pub fee: Amount,
    pub provider_fee: Amount,
    pub total_debit: Amount,
    pub destination: Destination,
    pub payout_type: PayoutType,
    /// Ledger idempotency reference for the debit transaction
    pub reference: TxRef,
    /// Client-provided idempotency key, if any
    pub idempotency_key: Option<String>,
    /// Provider's order number, set once dispatch succeeds
    pub external_ref: Option<String>,
    pub status: PayoutStatus,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payout {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        wallet_id: WalletId,
        amount: Amount,
        fee: Amount,
        provider_fee: Amount,
        destination: Destination,
        payout_type: PayoutType,
        idempotency_key: Option<String>,
    ) -> Option<Self> {
        let total_debit = amount.checked_add(fee)?.checked_add(provider_fee)?;
        let payout_id = PayoutId::new();
        let now = Utc::now();
        Some(Self {
            payout_id,
            user_id,
            wallet_id,
            amount,
            fee,
            provider_fee,
            total_debit,
            destination,
            payout_type,
            reference: TxRef::new(format!("PAYOUT-{}", payout_id)),
            idempotency_key,
            external_ref: None,
            status: PayoutStatus::Initiated,
            retry_count: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }
}

impl fmt::Display for Payout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Payout[{}] user={} amount={} total_debit={} state={}",
            self.payout_id, self.user_id, self.amount, self.total_debit, self.status
        )
    }
}

/// Debit against the platform's own funding account, one per settled payout.
/// Append-only.
#[derive(Debug, Clone)]
pub struct ParentLedgerEntry {
    pub payout_id: PayoutId,
    pub amount: Amount,
    pub narration: String,
    pub created_at: DateTime<Utc>,
}

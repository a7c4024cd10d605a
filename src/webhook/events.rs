//! Inbound provider event types
//!
//! Events arrive as an adjacently-tagged JSON envelope
//! (`{"event": "...", "data": {...}}`) and are modeled as a tagged union
//! with exhaustive handling instead of string-keyed branching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::Amount;
use crate::money::{self, MoneyError};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Unrecognized or malformed webhook event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid event amount: {0}")]
    Amount(#[from] MoneyError),
}

/// A deposit landed on a virtual account.
///
/// `order_no` is the provider's own identifier for the payment and becomes
/// the ledger transaction reference, which is what makes re-delivery of the
/// same event idempotent. `account_reference` is the virtual-account
/// reference issued at provisioning time and resolves the destination
/// wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub order_no: String,
    pub account_reference: String,
    /// Decimal string as the provider sends it, e.g. `"5000.00"`
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub payer_name: Option<String>,
}

impl DepositEvent {
    /// The deposit amount in minor units of its currency.
    pub fn amount_minor(&self) -> Result<Amount, EventError> {
        let exponent = money::minor_unit_exponent(&self.currency);
        Ok(money::parse_amount(&self.amount, exponent)?)
    }
}

pub use crate::payout::types::TransferOutcome;

/// Status update for an outbound transfer we previously dispatched.
/// `order_no` matches `Payout.external_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferStatusEvent {
    pub order_no: String,
    pub status: TransferOutcome,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Tagged union of everything the ingestion gateway understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WebhookEvent {
    #[serde(rename = "deposit.completed")]
    Deposit(DepositEvent),
    #[serde(rename = "transfer.status")]
    TransferStatus(TransferStatusEvent),
}

impl WebhookEvent {
    /// Parse an already-deserialized JSON envelope.
    pub fn parse(payload: &serde_json::Value) -> Result<Self, EventError> {
        Ok(serde_json::from_value(payload.clone())?)
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            WebhookEvent::Deposit(_) => "deposit.completed",
            WebhookEvent::TransferStatus(_) => "transfer.status",
        }
    }
}

/// Best-effort event type for audit logging, usable even when the payload
/// does not parse into a known event.
pub fn raw_event_type(payload: &serde_json::Value) -> String {
    payload
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

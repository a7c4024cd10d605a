//! Webhook Ingestion Gateway
//!
//! Verifies inbound provider signatures over the raw request bytes, logs
//! every delivery attempt before any processing, and turns valid payment
//! events into ledger calls.

pub mod events;
pub mod service;
pub mod signature;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use events::{DepositEvent, TransferOutcome, TransferStatusEvent, WebhookEvent};
pub use service::{WebhookError, WebhookProcessor};

/// Outbound re-delivery bookkeeping for a logged webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum DispatchStatus {
    Pending = 1,
    Delivered = 2,
    Failed = 3,
}

impl DispatchStatus {
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(DispatchStatus::Pending),
            2 => Some(DispatchStatus::Delivered),
            3 => Some(DispatchStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::Delivered => "delivered",
            DispatchStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record of one inbound delivery attempt.
///
/// Written before any processing, for rejected deliveries too: the audit
/// trail exists independent of the processing outcome. Only the dispatch
/// bookkeeping fields ever change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLog {
    pub log_id: Uuid,
    pub source: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub signature: Option<String>,
    pub signature_valid: bool,
    pub dispatch_status: DispatchStatus,
    pub dispatch_attempts: u32,
    pub received_at: DateTime<Utc>,
}

impl WebhookLog {
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        signature: Option<String>,
        signature_valid: bool,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            source: source.into(),
            event_type: event_type.into(),
            payload,
            signature,
            signature_valid,
            dispatch_status: DispatchStatus::Pending,
            dispatch_attempts: 0,
            received_at: Utc::now(),
        }
    }
}

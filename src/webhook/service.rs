//! Webhook processing
//!
//! Ingestion order is fixed: verify the signature over the raw bytes, write
//! the audit log (always, rejected deliveries included), then process. A
//! deposit event credits the wallet resolved from the virtual-account
//! reference, using the provider's own order number as the transaction
//! reference - that reference is what makes replayed deliveries harmless.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::core_types::TxRef;
use crate::ledger::{LedgerError, LedgerService};
use crate::payout::engine::{PayoutEngine, PayoutError};
use crate::payout::types::PayoutStatus;
use crate::store::{LedgerStore, StoreError};
use crate::transaction::TxCategory;

use super::events::{self, EventError, WebhookEvent};
use super::signature;
use super::WebhookLog;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid webhook signature")]
    InvalidSignature,
    #[error("No virtual account matches reference {0}")]
    UnknownReference(String),
    #[error(transparent)]
    Malformed(#[from] EventError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What ingesting one event did.
#[derive(Debug)]
pub enum IngestOutcome {
    DepositApplied { reference: TxRef },
    PayoutReconciled { status: PayoutStatus },
}

pub struct WebhookProcessor {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<LedgerService>,
    payouts: Arc<PayoutEngine>,
    secret: Vec<u8>,
    /// Non-production override: accept deliveries that fail verification.
    allow_unverified: bool,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<LedgerService>,
        payouts: Arc<PayoutEngine>,
        secret: impl Into<Vec<u8>>,
        allow_unverified: bool,
    ) -> Self {
        Self {
            store,
            ledger,
            payouts,
            secret: secret.into(),
            allow_unverified,
        }
    }

    /// Ingest one raw delivery: verify, log, process.
    pub async fn ingest(
        &self,
        source: &str,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<IngestOutcome, WebhookError> {
        let signature_valid = signature_header
            .map(|sig| signature::verify(&self.secret, raw_body, sig))
            .unwrap_or(false);

        // Even an unparseable body gets its audit record.
        let payload: serde_json::Value = serde_json::from_slice(raw_body).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(raw_body).into_owned())
        });

        let log = WebhookLog::new(
            source,
            events::raw_event_type(&payload),
            payload.clone(),
            signature_header.map(str::to_string),
            signature_valid,
        );
        self.store.insert_webhook_log(&log).await?;

        if !signature_valid {
            if !self.allow_unverified {
                warn!(source, "Rejected webhook with invalid signature");
                return Err(WebhookError::InvalidSignature);
            }
            warn!(source, "Accepting unverified webhook (override enabled)");
        }

        let event = WebhookEvent::parse(&payload)?;
        self.process(event).await
    }

    /// Route a parsed event to the component that owns it.
    pub async fn process(&self, event: WebhookEvent) -> Result<IngestOutcome, WebhookError> {
        match event {
            WebhookEvent::Deposit(deposit) => {
                let amount = deposit.amount_minor()?;
                let account = self
                    .store
                    .virtual_account_by_reference(&deposit.account_reference)
                    .await?
                    .ok_or_else(|| {
                        WebhookError::UnknownReference(deposit.account_reference.clone())
                    })?;

                let reference = TxRef::new(deposit.order_no.clone());
                let tx = self
                    .ledger
                    .apply_credit(
                        account.wallet_id,
                        amount,
                        TxCategory::Deposit,
                        reference,
                        Some(deposit.order_no),
                    )
                    .await?;

                info!(
                    wallet_id = account.wallet_id,
                    amount,
                    reference = %tx.reference,
                    "Deposit credited"
                );
                Ok(IngestOutcome::DepositApplied {
                    reference: tx.reference,
                })
            }
            WebhookEvent::TransferStatus(update) => {
                let status = self
                    .payouts
                    .reconcile(&update.order_no, update.status, update.reason.as_deref())
                    .await?;
                info!(order_no = %update.order_no, %status, "Payout reconciled from webhook");
                Ok(IngestOutcome::PayoutReconciled { status })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payout::engine::PayoutPolicy;
    use crate::payout::provider::MockProvider;
    use crate::store::{MemoryStore, VirtualAccount};
    use crate::wallet::Wallet;
    use chrono::Utc;

    const SECRET: &[u8] = b"whsec_test";

    async fn processor(allow_unverified: bool) -> (Arc<MemoryStore>, WebhookProcessor) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_wallet(&Wallet::new(1, 1001, "NGN"))
            .await
            .unwrap();
        store
            .insert_virtual_account(&VirtualAccount {
                account_reference: "VA-001".to_string(),
                user_id: 1001,
                wallet_id: 1,
                account_number: "9001234567".to_string(),
                bank_code: "999".to_string(),
                settlement_configured: false,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let ledger = Arc::new(LedgerService::new(store.clone()));
        let payouts = Arc::new(PayoutEngine::new(
            store.clone(),
            ledger.clone(),
            Arc::new(MockProvider::new()),
            PayoutPolicy::default(),
        ));
        let processor =
            WebhookProcessor::new(store.clone(), ledger, payouts, SECRET, allow_unverified);
        (store, processor)
    }

    fn deposit_body(order_no: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "deposit.completed",
            "data": {
                "order_no": order_no,
                "account_reference": "VA-001",
                "amount": "5000.00",
                "currency": "NGN",
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_replayed_deposit_credits_once() {
        let (store, processor) = processor(false).await;
        let body = deposit_body("PROV-R1");
        let sig = signature::sign(SECRET, &body);

        processor
            .ingest("provider", &body, Some(&sig))
            .await
            .unwrap();
        processor
            .ingest("provider", &body, Some(&sig))
            .await
            .unwrap();

        // Balance moved exactly once, two audit records, one transaction
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 500_000);
        assert_eq!(
            store
                .webhook_logs_by_source("provider", 10)
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(
            store
                .transaction_by_reference(&TxRef::new("PROV-R1"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_invalid_signature_logged_then_rejected() {
        let (store, processor) = processor(false).await;
        let body = deposit_body("PROV-R2");

        let err = processor
            .ingest("provider", &body, Some("deadbeef"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature));

        // The audit record exists regardless of rejection
        let logs = store.webhook_logs_by_source("provider", 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].signature_valid);

        // And no money moved
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 0);
    }

    #[tokio::test]
    async fn test_unverified_override_processes_anyway() {
        let (store, processor) = processor(true).await;
        let body = deposit_body("PROV-R3");

        processor.ingest("provider", &body, None).await.unwrap();

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 500_000);
        let logs = store.webhook_logs_by_source("provider", 10).await.unwrap();
        assert!(!logs[0].signature_valid);
    }

    #[tokio::test]
    async fn test_unknown_account_reference() {
        let (store, processor) = processor(true).await;
        let body = serde_json::to_vec(&serde_json::json!({
            "event": "deposit.completed",
            "data": {
                "order_no": "PROV-R4",
                "account_reference": "VA-MISSING",
                "amount": "1.00",
                "currency": "NGN",
            }
        }))
        .unwrap();

        let err = processor.ingest("provider", &body, None).await.unwrap_err();
        assert!(matches!(err, WebhookError::UnknownReference(_)));
        // Orphan events still leave their audit trail
        assert_eq!(
            store
                .webhook_logs_by_source("provider", 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_garbage_body_is_logged_and_malformed() {
        let (store, processor) = processor(true).await;

        let err = processor
            .ingest("provider", b"not json at all", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Malformed(_)));
        let logs = store.webhook_logs_by_source("provider", 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_type, "unknown");
    }
}

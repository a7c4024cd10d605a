//! Payout Engine
//!
//! Drives the payout state machine: validate and reserve funds, dispatch
//! the transfer to the payment provider with bounded retries, and finalize
//! from the provider's reconciliation signal (webhook or poll).
//!
//! Two rules the engine never breaks:
//! - No ledger debit or credit happens on an ambiguous provider signal;
//!   ambiguity parks the payout in MANUAL_REVIEW with the reservation held.
//! - A dispatched transfer is irreversible; there is no cancel path, only
//!   reconciliation into COMPLETED, FAILED or MANUAL_REVIEW.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core_types::{Amount, PayoutId, TxRef, UserId};
use crate::fees::{FeeError, FeeRule};
use crate::ledger::{LedgerError, LedgerService};
use crate::store::{LedgerStore, StoreError};
use crate::transaction::TxCategory;

use super::provider::{ProviderClient, ProviderError, TransferRequest};
use super::retry::RetryStrategy;
use super::types::{
    Destination, ParentLedgerEntry, Payout, PayoutStatus, PayoutType, TransferOutcome,
};

#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("Payout not found: {0}")]
    NotFound(PayoutId),
    #[error("No payout matches provider reference {0}")]
    UnknownExternalRef(String),
    #[error("Invalid payout amount")]
    InvalidAmount,
    #[error("Fee error: {0}")]
    Fee(#[from] FeeError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A withdrawal request from the API layer
#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub user_id: UserId,
    pub amount: Amount,
    pub destination: Destination,
    pub payout_type: PayoutType,
    /// Client-provided idempotency key (optional)
    pub idempotency_key: Option<String>,
}

/// Engine policy knobs, fed from configuration.
#[derive(Debug, Clone)]
pub struct PayoutPolicy {
    pub fee_rule: FeeRule,
    /// Flat provider charge per transfer, debited alongside our fee
    pub provider_fee: Amount,
    /// Dispatch attempts before parking in MANUAL_REVIEW
    pub max_dispatch_attempts: u32,
    pub retry: RetryStrategy,
    /// PROCESSING payouts untouched for this long show up in the review
    /// query
    pub review_stale_after: chrono::Duration,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            fee_rule: FeeRule::default(),
            provider_fee: 0,
            max_dispatch_attempts: 3,
            retry: RetryStrategy::default(),
            review_stale_after: chrono::Duration::minutes(30),
        }
    }
}

pub struct PayoutEngine {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<LedgerService>,
    provider: Arc<dyn ProviderClient>,
    policy: PayoutPolicy,
}

impl PayoutEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<LedgerService>,
        provider: Arc<dyn ProviderClient>,
        policy: PayoutPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            provider,
            policy,
        }
    }

    /// Validate a withdrawal request and reserve its funds.
    ///
    /// Rejects with `InsufficientFunds` before any provider call is
    /// attempted. A repeated idempotency key returns the original payout.
    pub async fn request(&self, request: PayoutRequest) -> Result<Payout, PayoutError> {
        if request.amount == 0 {
            return Err(PayoutError::InvalidAmount);
        }

        if let Some(ref key) = request.idempotency_key
            && let Some(existing) = self.store.payout_by_idempotency_key(key).await?
        {
            info!(key = %key, payout_id = %existing.payout_id, "Duplicate idempotency key - returning existing payout");
            return Ok(existing);
        }

        let wallet = self.ledger.wallet_for_user(request.user_id).await?;
        let fee = self.policy.fee_rule.compute(request.amount)?;

        let payout = Payout::new(
            request.user_id,
            wallet.wallet_id,
            request.amount,
            fee,
            self.policy.provider_fee,
            request.destination,
            request.payout_type,
            request.idempotency_key,
        )
        .ok_or(PayoutError::InvalidAmount)?;

        // Funds are held before the record exists, so a crash in between
        // leaves an orphan reservation at worst, never an unreserved payout.
        self.ledger
            .reserve(payout.wallet_id, payout.total_debit)
            .await?;

        if let Err(e) = self.store.insert_payout(&payout).await {
            // Roll the hold back; the request never happened.
            if let Err(release_err) = self
                .ledger
                .release(payout.wallet_id, payout.total_debit)
                .await
            {
                error!(
                    payout_id = %payout.payout_id,
                    error = %release_err,
                    "Failed to release reservation after insert failure"
                );
            }
            return Err(e.into());
        }

        info!(%payout, "Payout initiated");
        Ok(payout)
    }

    /// Dispatch an initiated payout to the provider.
    ///
    /// Retryable provider failures back off and retry up to the configured
    /// ceiling; past it the payout parks in MANUAL_REVIEW with the
    /// reservation still held, because the money may already have moved. An
    /// explicit rejection is terminal and releases the reservation.
    pub async fn dispatch(&self, payout_id: PayoutId) -> Result<PayoutStatus, PayoutError> {
        let payout = self
            .store
            .payout(payout_id)
            .await?
            .ok_or(PayoutError::NotFound(payout_id))?;

        if payout.status != PayoutStatus::Initiated {
            return Ok(payout.status);
        }

        // Persist PROCESSING before the provider call, so a crash after the
        // wire call can never be mistaken for "not yet dispatched".
        if !self
            .store
            .update_payout_status_if(
                payout_id,
                PayoutStatus::Initiated,
                PayoutStatus::Processing,
                None,
                None,
            )
            .await?
        {
            // Another worker took it
            return Ok(self
                .store
                .payout(payout_id)
                .await?
                .ok_or(PayoutError::NotFound(payout_id))?
                .status);
        }

        let wallet = self.ledger.wallet(payout.wallet_id).await?;
        let request = TransferRequest {
            reference: payout.reference.to_string(),
            amount: payout.amount,
            currency: wallet.currency.clone(),
            account_number: payout.destination.account_number.clone(),
            bank_code: payout.destination.bank_code.clone(),
            narration: format!("Payout {}", payout.payout_id),
        };

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_dispatch_attempts {
            match self.provider.initiate_transfer(&request).await {
                Ok(receipt) => {
                    self.store
                        .set_payout_external_ref(payout_id, &receipt.order_no)
                        .await?;
                    info!(
                        payout_id = %payout_id,
                        order_no = %receipt.order_no,
                        attempt,
                        "Transfer dispatched, awaiting provider confirmation"
                    );
                    return Ok(PayoutStatus::Processing);
                }
                Err(e @ ProviderError::Rejected(_)) => {
                    warn!(payout_id = %payout_id, error = %e, "Provider rejected transfer");
                    return self.fail(payout_id, &payout, &e.to_string()).await;
                }
                Err(e) => {
                    last_error = e.to_string();
                    let retries = self.store.increment_payout_retry(payout_id).await?;
                    warn!(
                        payout_id = %payout_id,
                        attempt,
                        retries,
                        error = %e,
                        "Transfer dispatch failed"
                    );
                    if attempt < self.policy.max_dispatch_attempts {
                        tokio::time::sleep(self.policy.retry.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        // Retry ceiling exceeded on ambiguous errors: the transfer may have
        // gone through, so the reservation stays held for an operator.
        self.park_for_review(payout_id, &last_error).await
    }

    /// Reconcile a provider status signal against the payout it belongs to
    /// and advance the state machine.
    pub async fn reconcile(
        &self,
        external_ref: &str,
        outcome: TransferOutcome,
        reason: Option<&str>,
    ) -> Result<PayoutStatus, PayoutError> {
        let payout = self
            .store
            .payout_by_external_ref(external_ref)
            .await?
            .ok_or_else(|| PayoutError::UnknownExternalRef(external_ref.to_string()))?;

        match outcome {
            TransferOutcome::Success => self.complete(&payout, external_ref).await,
            TransferOutcome::Failed => {
                self.fail(
                    payout.payout_id,
                    &payout,
                    reason.unwrap_or("Provider reported failure"),
                )
                .await
            }
            TransferOutcome::Reversed => self.reverse(&payout, reason).await,
        }
    }

    /// Review queue: MANUAL_REVIEW plus stale PROCESSING payouts, for
    /// external operational tooling.
    pub async fn for_review(&self) -> Result<Vec<Payout>, PayoutError> {
        Ok(self
            .store
            .payouts_for_review(Utc::now(), self.policy.review_stale_after)
            .await?)
    }

    pub async fn payout(&self, payout_id: PayoutId) -> Result<Payout, PayoutError> {
        self.store
            .payout(payout_id)
            .await?
            .ok_or(PayoutError::NotFound(payout_id))
    }

    async fn complete(
        &self,
        payout: &Payout,
        external_ref: &str,
    ) -> Result<PayoutStatus, PayoutError> {
        // The ledger commit is reference-idempotent, so running it before
        // the status CAS means a crash in between replays harmlessly.
        self.ledger
            .commit_reserved(
                payout.wallet_id,
                payout.total_debit,
                payout.fee,
                TxCategory::Withdrawal,
                payout.reference.clone(),
                Some(external_ref.to_string()),
            )
            .await?;

        let advanced = self
            .advance_from_active(payout.payout_id, PayoutStatus::Completed, None, Some(Utc::now()))
            .await?;

        if advanced {
            self.store
                .append_parent_entry(&ParentLedgerEntry {
                    payout_id: payout.payout_id,
                    amount: payout.amount,
                    narration: format!(
                        "Payout {} to {}/{}",
                        payout.payout_id,
                        payout.destination.bank_code,
                        payout.destination.account_number
                    ),
                    created_at: Utc::now(),
                })
                .await?;
            info!(payout_id = %payout.payout_id, "Payout completed");
        }
        Ok(PayoutStatus::Completed)
    }

    async fn fail(
        &self,
        payout_id: PayoutId,
        payout: &Payout,
        reason: &str,
    ) -> Result<PayoutStatus, PayoutError> {
        let advanced = self
            .advance_from_active(payout_id, PayoutStatus::Failed, Some(reason), None)
            .await?;

        if advanced {
            // No balance change; the hold simply comes off.
            self.ledger
                .release(payout.wallet_id, payout.total_debit)
                .await?;
            info!(payout_id = %payout_id, reason, "Payout failed, reservation released");
        }
        Ok(PayoutStatus::Failed)
    }

    async fn reverse(
        &self,
        payout: &Payout,
        reason: Option<&str>,
    ) -> Result<PayoutStatus, PayoutError> {
        // A reversal of a completed payout returns the funds as an
        // immediately-spendable refund credit.
        if payout.status == PayoutStatus::Completed {
            self.ledger
                .apply_credit(
                    payout.wallet_id,
                    payout.amount,
                    TxCategory::Refund,
                    TxRef::new(format!("REVERSAL-{}", payout.payout_id)),
                    payout.external_ref.clone(),
                )
                .await?;
            info!(payout_id = %payout.payout_id, "Completed payout reversed, funds refunded");
            return Ok(payout.status);
        }
        self.fail(
            payout.payout_id,
            payout,
            reason.unwrap_or("Provider reversed transfer"),
        )
        .await
    }

    async fn park_for_review(
        &self,
        payout_id: PayoutId,
        last_error: &str,
    ) -> Result<PayoutStatus, PayoutError> {
        let reason = format!("Dispatch retries exhausted: {}", last_error);
        self.store
            .update_payout_status_if(
                payout_id,
                PayoutStatus::Processing,
                PayoutStatus::ManualReview,
                Some(&reason),
                None,
            )
            .await?;
        warn!(payout_id = %payout_id, reason, "Payout parked for manual review; reservation held");
        Ok(PayoutStatus::ManualReview)
    }

    /// CAS out of PROCESSING, falling back to MANUAL_REVIEW (an operator
    /// signal can still resolve a parked payout). Returns whether this call
    /// performed the transition.
    async fn advance_from_active(
        &self,
        payout_id: PayoutId,
        new: PayoutStatus,
        reason: Option<&str>,
        completed_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<bool, PayoutError> {
        if self
            .store
            .update_payout_status_if(payout_id, PayoutStatus::Processing, new, reason, completed_at)
            .await?
        {
            return Ok(true);
        }
        Ok(self
            .store
            .update_payout_status_if(
                payout_id,
                PayoutStatus::ManualReview,
                new,
                reason,
                completed_at,
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payout::provider::MockProvider;
    use crate::store::MemoryStore;
    use crate::wallet::Wallet;

    fn policy() -> PayoutPolicy {
        PayoutPolicy {
            fee_rule: FeeRule::Flat { value: 1_000 },
            provider_fee: 50,
            max_dispatch_attempts: 3,
            retry: RetryStrategy::None,
            review_stale_after: chrono::Duration::minutes(30),
        }
    }

    async fn engine_with_funds(
        available: u64,
    ) -> (Arc<MemoryStore>, Arc<MockProvider>, PayoutEngine) {
        let store = Arc::new(MemoryStore::new());
        let mut wallet = Wallet::new(1, 1001, "NGN");
        wallet.credit_cleared(available).unwrap();
        store.create_wallet(&wallet).await.unwrap();

        let ledger = Arc::new(LedgerService::new(store.clone()));
        let provider = Arc::new(MockProvider::new());
        let engine = PayoutEngine::new(store.clone(), ledger, provider.clone(), policy());
        (store, provider, engine)
    }

    fn request(amount: u64) -> PayoutRequest {
        PayoutRequest {
            user_id: 1001,
            amount,
            destination: Destination {
                account_number: "0123456789".to_string(),
                bank_code: "058".to_string(),
                account_name: None,
            },
            payout_type: PayoutType::External,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_request_reserves_total_debit() {
        let (store, _, engine) = engine_with_funds(1_000_000).await;

        let payout = engine.request(request(100_000)).await.unwrap();
        assert_eq!(payout.total_debit, 101_050); // amount + 1_000 fee + 50 provider fee
        assert_eq!(payout.status, PayoutStatus::Initiated);

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.locked(), 101_050);
        assert_eq!(wallet.available(), 1_000_000 - 101_050);
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejected_before_provider() {
        let (_, provider, engine) = engine_with_funds(50_000).await;

        let err = engine.request(request(100_000)).await.unwrap_err();
        assert!(matches!(
            err,
            PayoutError::Ledger(LedgerError::InsufficientFunds)
        ));
        assert_eq!(provider.transfer_calls(), 0); // No provider call attempted
    }

    #[tokio::test]
    async fn test_idempotency_key_returns_original() {
        let (store, _, engine) = engine_with_funds(1_000_000).await;

        let mut req = request(100_000);
        req.idempotency_key = Some("client-1".to_string());
        let first = engine.request(req.clone()).await.unwrap();
        let second = engine.request(req).await.unwrap();

        assert_eq!(first.payout_id, second.payout_id);
        // Only one reservation exists
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.locked(), first.total_debit);
    }

    #[tokio::test]
    async fn test_happy_path_completion() {
        let (store, _, engine) = engine_with_funds(1_000_000).await;

        let payout = engine.request(request(100_000)).await.unwrap();
        let status = engine.dispatch(payout.payout_id).await.unwrap();
        assert_eq!(status, PayoutStatus::Processing);

        let dispatched = store.payout(payout.payout_id).await.unwrap().unwrap();
        let order_no = dispatched.external_ref.unwrap();

        let status = engine
            .reconcile(&order_no, TransferOutcome::Success, None)
            .await
            .unwrap();
        assert_eq!(status, PayoutStatus::Completed);

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.locked(), 0);
        assert_eq!(wallet.balance(), 1_000_000 - payout.total_debit);

        // Parent account ledger carries exactly one entry for the payout
        let entries = store.parent_entries(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payout_id, payout.payout_id);
    }

    #[tokio::test]
    async fn test_provider_rejection_fails_and_releases() {
        let (store, provider, engine) = engine_with_funds(1_000_000).await;
        provider
            .script_transfer(Err(ProviderError::Rejected(
                "invalid account".to_string(),
            )))
            .await;

        let payout = engine.request(request(100_000)).await.unwrap();
        let status = engine.dispatch(payout.payout_id).await.unwrap();
        assert_eq!(status, PayoutStatus::Failed);

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.locked(), 0);
        assert_eq!(wallet.balance(), 1_000_000); // No balance change

        let stored = store.payout(payout.payout_id).await.unwrap().unwrap();
        assert!(stored.failure_reason.unwrap().contains("invalid account"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_park_for_manual_review() {
        let (store, provider, engine) = engine_with_funds(1_000_000).await;
        provider
            .script_transfer_failures(ProviderError::Timeout, 3)
            .await;

        let payout = engine.request(request(100_000)).await.unwrap();
        let status = engine.dispatch(payout.payout_id).await.unwrap();
        assert_eq!(status, PayoutStatus::ManualReview);
        assert_eq!(provider.transfer_calls(), 3);

        // Reservation stays held pending manual resolution
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.locked(), payout.total_debit);

        let stored = store.payout(payout.payout_id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 3);
        assert!(
            stored
                .failure_reason
                .unwrap()
                .contains("retries exhausted")
        );
    }

    #[tokio::test]
    async fn test_manual_review_resolves_via_reconcile() {
        let (store, provider, engine) = engine_with_funds(1_000_000).await;
        provider
            .script_transfer_failures(ProviderError::Timeout, 3)
            .await;

        let payout = engine.request(request(100_000)).await.unwrap();
        engine.dispatch(payout.payout_id).await.unwrap();

        // The transfer actually went through; ops later feed the provider's
        // order number in through the reconcile path.
        store
            .set_payout_external_ref(payout.payout_id, "PROV-LATE-1")
            .await
            .unwrap();
        let status = engine
            .reconcile("PROV-LATE-1", TransferOutcome::Success, None)
            .await
            .unwrap();
        assert_eq!(status, PayoutStatus::Completed);

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.locked(), 0);
        assert_eq!(wallet.balance(), 1_000_000 - payout.total_debit);
    }

    #[tokio::test]
    async fn test_reconcile_replay_is_idempotent() {
        let (store, _, engine) = engine_with_funds(1_000_000).await;

        let payout = engine.request(request(100_000)).await.unwrap();
        engine.dispatch(payout.payout_id).await.unwrap();
        let order_no = store
            .payout(payout.payout_id)
            .await
            .unwrap()
            .unwrap()
            .external_ref
            .unwrap();

        engine
            .reconcile(&order_no, TransferOutcome::Success, None)
            .await
            .unwrap();
        engine
            .reconcile(&order_no, TransferOutcome::Success, None)
            .await
            .unwrap();

        // Debited exactly once, one parent entry
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 1_000_000 - payout.total_debit);
        assert_eq!(store.parent_entries(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconcile_releases_once() {
        let (store, _, engine) = engine_with_funds(1_000_000).await;

        let payout = engine.request(request(100_000)).await.unwrap();
        engine.dispatch(payout.payout_id).await.unwrap();
        let order_no = store
            .payout(payout.payout_id)
            .await
            .unwrap()
            .unwrap()
            .external_ref
            .unwrap();

        engine
            .reconcile(&order_no, TransferOutcome::Failed, Some("no funds at provider"))
            .await
            .unwrap();
        engine
            .reconcile(&order_no, TransferOutcome::Failed, Some("no funds at provider"))
            .await
            .unwrap();

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.locked(), 0);
        assert_eq!(wallet.balance(), 1_000_000);
    }

    #[tokio::test]
    async fn test_review_queue_lists_parked_payouts() {
        let (_, provider, engine) = engine_with_funds(1_000_000).await;
        provider
            .script_transfer_failures(ProviderError::Timeout, 3)
            .await;

        let payout = engine.request(request(100_000)).await.unwrap();
        engine.dispatch(payout.payout_id).await.unwrap();

        let review = engine.for_review().await.unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].payout_id, payout.payout_id);
        assert_eq!(review[0].status, PayoutStatus::ManualReview);
    }
}

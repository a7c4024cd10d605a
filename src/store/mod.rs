//! Persistence seam
//!
//! `LedgerStore` is the narrow storage contract the services depend on.
//! Two implementations: [`memory::MemoryStore`] for tests and local
//! development, [`postgres::PgStore`] for production. All state-machine
//! writes are expressed as CAS-style conditional updates so that no
//! implementation can lose an update under concurrency.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core_types::{PayoutId, TxRef, UserId, WalletId};
use crate::jobs::JobLock;
use crate::payout::types::{ParentLedgerEntry, Payout, PayoutStatus};
use crate::settlement::SettlementConfig;
use crate::transaction::Transaction;
use crate::wallet::Wallet;
use crate::webhook::{DispatchStatus, WebhookLog};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A provider-provisioned virtual account mapped to a wallet.
///
/// `account_reference` is the reference issued when the account was created
/// and is what inbound deposit events carry to identify the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub account_reference: String,
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub account_number: String,
    pub bank_code: String,
    pub settlement_configured: bool,
    pub created_at: DateTime<Utc>,
}

/// Storage contract for the whole core.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // === Wallets ===

    async fn create_wallet(&self, wallet: &Wallet) -> StoreResult<()>;

    async fn wallet(&self, wallet_id: WalletId) -> StoreResult<Option<Wallet>>;

    async fn wallet_by_user(&self, user_id: UserId) -> StoreResult<Option<Wallet>>;

    /// CAS write: persists `wallet` only if the stored version still equals
    /// `expected_version`. Returns false when another writer got there
    /// first; the caller reloads and retries.
    async fn update_wallet(&self, wallet: &Wallet, expected_version: u64) -> StoreResult<bool>;

    // === Transaction log ===

    /// Insert a transaction; returns false (and writes nothing) when the
    /// reference already exists. This is the idempotency backstop.
    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<bool>;

    async fn transaction_by_reference(&self, reference: &TxRef)
    -> StoreResult<Option<Transaction>>;

    async fn transactions_for_wallet(
        &self,
        wallet_id: WalletId,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>>;

    /// Successful uncleared credits (deposit/transfer) whose holding window
    /// has elapsed: explicit `cleared_at <= now`, or no override and
    /// `created_at <= now - hold_window`. Bounded by `limit`.
    async fn clearable_transactions(
        &self,
        now: DateTime<Utc>,
        hold_window: Duration,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>>;

    /// CAS flip of `is_cleared`; returns false if the record was already
    /// cleared (or does not exist).
    async fn mark_transaction_cleared(
        &self,
        reference: &TxRef,
        cleared_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // === Payouts ===

    async fn insert_payout(&self, payout: &Payout) -> StoreResult<()>;

    async fn payout(&self, payout_id: PayoutId) -> StoreResult<Option<Payout>>;

    async fn payout_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Payout>>;

    async fn payout_by_external_ref(&self, external_ref: &str) -> StoreResult<Option<Payout>>;

    /// Atomic CAS state transition. Returns false when the stored status no
    /// longer matches `expected` (another worker already advanced it).
    async fn update_payout_status_if(
        &self,
        payout_id: PayoutId,
        expected: PayoutStatus,
        new: PayoutStatus,
        failure_reason: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    async fn set_payout_external_ref(
        &self,
        payout_id: PayoutId,
        external_ref: &str,
    ) -> StoreResult<()>;

    async fn increment_payout_retry(&self, payout_id: PayoutId) -> StoreResult<u32>;

    /// Payouts needing operator attention: everything in MANUAL_REVIEW plus
    /// PROCESSING records not updated for `stale_after`.
    async fn payouts_for_review(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<Vec<Payout>>;

    // === Parent account ledger ===

    async fn append_parent_entry(&self, entry: &ParentLedgerEntry) -> StoreResult<()>;

    async fn parent_entries(&self, limit: u32) -> StoreResult<Vec<ParentLedgerEntry>>;

    // === Webhook audit log ===

    async fn insert_webhook_log(&self, log: &WebhookLog) -> StoreResult<()>;

    async fn webhook_logs_by_source(
        &self,
        source: &str,
        limit: u32,
    ) -> StoreResult<Vec<WebhookLog>>;

    /// Dispatch bookkeeping for outbound re-delivery to tenants; the only
    /// permitted mutation of a webhook log.
    async fn record_webhook_dispatch(
        &self,
        log_id: Uuid,
        status: DispatchStatus,
    ) -> StoreResult<bool>;

    // === Job locks ===

    /// Acquire the named lock. Succeeds when the lock is free, or held but
    /// stale (held longer than `stale_after`, i.e. a crashed worker).
    async fn try_acquire_job_lock(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<bool>;

    async fn release_job_lock(
        &self,
        job_name: &str,
        last_run_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn job_lock(&self, job_name: &str) -> StoreResult<Option<JobLock>>;

    // === Virtual accounts ===

    async fn insert_virtual_account(&self, account: &VirtualAccount) -> StoreResult<()>;

    async fn virtual_account_by_reference(
        &self,
        account_reference: &str,
    ) -> StoreResult<Option<VirtualAccount>>;

    async fn list_virtual_accounts(&self) -> StoreResult<Vec<VirtualAccount>>;

    async fn mark_virtual_account_configured(
        &self,
        account_reference: &str,
    ) -> StoreResult<bool>;

    // === Settlement configuration ===

    async fn save_settlement_config(&self, config: &SettlementConfig) -> StoreResult<()>;

    async fn get_settlement_config(&self) -> StoreResult<Option<SettlementConfig>>;
}

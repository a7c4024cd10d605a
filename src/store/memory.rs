//! In-memory store
//!
//! Backs tests and local development. Same CAS semantics as the Postgres
//! implementation so the services behave identically against either.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core_types::{PayoutId, TxRef, UserId, WalletId};
use crate::jobs::JobLock;
use crate::payout::types::{ParentLedgerEntry, Payout, PayoutStatus};
use crate::settlement::SettlementConfig;
use crate::transaction::{Transaction, TxCategory, TxStatus, TxType};
use crate::wallet::Wallet;
use crate::webhook::{DispatchStatus, WebhookLog};

use super::{LedgerStore, StoreResult, VirtualAccount};

#[derive(Default)]
pub struct MemoryStore {
    wallets: RwLock<HashMap<WalletId, Wallet>>,
    transactions: RwLock<HashMap<String, Transaction>>,
    payouts: RwLock<HashMap<PayoutId, Payout>>,
    parent_entries: RwLock<Vec<ParentLedgerEntry>>,
    webhook_logs: RwLock<Vec<WebhookLog>>,
    job_locks: RwLock<HashMap<String, JobLock>>,
    virtual_accounts: RwLock<HashMap<String, VirtualAccount>>,
    settlement_config: RwLock<Option<SettlementConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_wallet(&self, wallet: &Wallet) -> StoreResult<()> {
        self.wallets
            .write()
            .await
            .insert(wallet.wallet_id, wallet.clone());
        Ok(())
    }

    async fn wallet(&self, wallet_id: WalletId) -> StoreResult<Option<Wallet>> {
        Ok(self.wallets.read().await.get(&wallet_id).cloned())
    }

    async fn wallet_by_user(&self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        Ok(self
            .wallets
            .read()
            .await
            .values()
            .find(|w| w.user_id == user_id)
            .cloned())
    }

    async fn update_wallet(&self, wallet: &Wallet, expected_version: u64) -> StoreResult<bool> {
        let mut wallets = self.wallets.write().await;
        match wallets.get(&wallet.wallet_id) {
            Some(stored) if stored.version() == expected_version => {
                wallets.insert(wallet.wallet_id, wallet.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<bool> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(tx.reference.as_str()) {
            return Ok(false);
        }
        transactions.insert(tx.reference.as_str().to_string(), tx.clone());
        Ok(true)
    }

    async fn transaction_by_reference(
        &self,
        reference: &TxRef,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .get(reference.as_str())
            .cloned())
    }

    async fn transactions_for_wallet(
        &self,
        wallet_id: WalletId,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut found: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit as usize);
        Ok(found)
    }

    async fn clearable_transactions(
        &self,
        now: DateTime<Utc>,
        hold_window: Duration,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut matured: Vec<Transaction> = transactions
            .values()
            .filter(|tx| {
                tx.tx_type == TxType::Credit
                    && matches!(tx.category, TxCategory::Deposit | TxCategory::Transfer)
                    && tx.status == TxStatus::Success
                    && !tx.is_cleared
                    && match tx.cleared_at {
                        Some(at) => at <= now,
                        None => tx.created_at <= now - hold_window,
                    }
            })
            .cloned()
            .collect();
        matured.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matured.truncate(limit as usize);
        Ok(matured)
    }

    async fn mark_transaction_cleared(
        &self,
        reference: &TxRef,
        cleared_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(reference.as_str()) {
            Some(tx) if !tx.is_cleared => {
                tx.is_cleared = true;
                tx.cleared_at = Some(cleared_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_payout(&self, payout: &Payout) -> StoreResult<()> {
        self.payouts
            .write()
            .await
            .insert(payout.payout_id, payout.clone());
        Ok(())
    }

    async fn payout(&self, payout_id: PayoutId) -> StoreResult<Option<Payout>> {
        Ok(self.payouts.read().await.get(&payout_id).cloned())
    }

    async fn payout_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Payout>> {
        Ok(self
            .payouts
            .read()
            .await
            .values()
            .find(|p| p.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn payout_by_external_ref(&self, external_ref: &str) -> StoreResult<Option<Payout>> {
        Ok(self
            .payouts
            .read()
            .await
            .values()
            .find(|p| p.external_ref.as_deref() == Some(external_ref))
            .cloned())
    }

    async fn update_payout_status_if(
        &self,
        payout_id: PayoutId,
        expected: PayoutStatus,
        new: PayoutStatus,
        failure_reason: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut payouts = self.payouts.write().await;
        match payouts.get_mut(&payout_id) {
            Some(p) if p.status == expected => {
                p.status = new;
                p.updated_at = Utc::now();
                if let Some(reason) = failure_reason {
                    p.failure_reason = Some(reason.to_string());
                }
                if completed_at.is_some() {
                    p.completed_at = completed_at;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_payout_external_ref(
        &self,
        payout_id: PayoutId,
        external_ref: &str,
    ) -> StoreResult<()> {
        if let Some(p) = self.payouts.write().await.get_mut(&payout_id) {
            p.external_ref = Some(external_ref.to_string());
            p.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn increment_payout_retry(&self, payout_id: PayoutId) -> StoreResult<u32> {
        let mut payouts = self.payouts.write().await;
        match payouts.get_mut(&payout_id) {
            Some(p) => {
                p.retry_count += 1;
                p.updated_at = Utc::now();
                Ok(p.retry_count)
            }
            None => Ok(0),
        }
    }

    async fn payouts_for_review(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<Vec<Payout>> {
        let payouts = self.payouts.read().await;
        let mut found: Vec<Payout> = payouts
            .values()
            .filter(|p| {
                p.status == PayoutStatus::ManualReview
                    || (p.status == PayoutStatus::Processing && now - p.updated_at > stale_after)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn append_parent_entry(&self, entry: &ParentLedgerEntry) -> StoreResult<()> {
        self.parent_entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn parent_entries(&self, limit: u32) -> StoreResult<Vec<ParentLedgerEntry>> {
        let entries = self.parent_entries.read().await;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn insert_webhook_log(&self, log: &WebhookLog) -> StoreResult<()> {
        self.webhook_logs.write().await.push(log.clone());
        Ok(())
    }

    async fn webhook_logs_by_source(
        &self,
        source: &str,
        limit: u32,
    ) -> StoreResult<Vec<WebhookLog>> {
        let logs = self.webhook_logs.read().await;
        Ok(logs
            .iter()
            .rev()
            .filter(|l| l.source == source)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn record_webhook_dispatch(
        &self,
        log_id: Uuid,
        status: DispatchStatus,
    ) -> StoreResult<bool> {
        let mut logs = self.webhook_logs.write().await;
        match logs.iter_mut().find(|l| l.log_id == log_id) {
            Some(log) => {
                log.dispatch_status = status;
                log.dispatch_attempts += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_acquire_job_lock(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<bool> {
        let mut locks = self.job_locks.write().await;
        let lock = locks
            .entry(job_name.to_string())
            .or_insert_with(|| JobLock::new(job_name));

        if lock.is_locked && !lock.is_stale(now, stale_after) {
            return Ok(false);
        }
        lock.is_locked = true;
        lock.locked_at = Some(now);
        Ok(true)
    }

    async fn release_job_lock(
        &self,
        job_name: &str,
        last_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(lock) = self.job_locks.write().await.get_mut(job_name) {
            lock.is_locked = false;
            lock.locked_at = None;
            lock.last_run_at = Some(last_run_at);
        }
        Ok(())
    }

    async fn job_lock(&self, job_name: &str) -> StoreResult<Option<JobLock>> {
        Ok(self.job_locks.read().await.get(job_name).cloned())
    }

    async fn insert_virtual_account(&self, account: &VirtualAccount) -> StoreResult<()> {
        self.virtual_accounts
            .write()
            .await
            .insert(account.account_reference.clone(), account.clone());
        Ok(())
    }

    async fn virtual_account_by_reference(
        &self,
        account_reference: &str,
    ) -> StoreResult<Option<VirtualAccount>> {
        Ok(self
            .virtual_accounts
            .read()
            .await
            .get(account_reference)
            .cloned())
    }

    async fn list_virtual_accounts(&self) -> StoreResult<Vec<VirtualAccount>> {
        let accounts = self.virtual_accounts.read().await;
        let mut all: Vec<VirtualAccount> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.account_reference.cmp(&b.account_reference));
        Ok(all)
    }

    async fn mark_virtual_account_configured(
        &self,
        account_reference: &str,
    ) -> StoreResult<bool> {
        let mut accounts = self.virtual_accounts.write().await;
        match accounts.get_mut(account_reference) {
            Some(account) => {
                account.settlement_configured = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_settlement_config(&self, config: &SettlementConfig) -> StoreResult<()> {
        *self.settlement_config.write().await = Some(config.clone());
        Ok(())
    }

    async fn get_settlement_config(&self) -> StoreResult<Option<SettlementConfig>> {
        Ok(self.settlement_config.read().await.clone())
    }
}

//! Wallet Ledger
//!
//! Owns every balance mutation. Each operation runs inside a per-wallet
//! critical section (async mutex per wallet id) so concurrent webhook
//! deliveries, clearance ticks and payout requests against the same wallet
//! serialize; different wallets proceed fully in parallel. On top of the
//! in-process lock, every wallet write is a version CAS in the store, so a
//! second process can delay an update but never lose one.
//!
//! Side effects are confined to Wallet + Transaction writes; no external
//! I/O happens here.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::core_types::{Amount, TxRef, UserId, WalletId};
use crate::store::{LedgerStore, StoreError};
use crate::transaction::{Transaction, TxCategory, TxStatus, TxType};
use crate::wallet::{Wallet, WalletError};

/// Attempts at a version-CAS wallet write before giving up. Conflicts only
/// arise from writers in another process; the in-process lock already
/// serializes local callers.
const MAX_CAS_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),
    #[error("No wallet for user {0}")]
    NoWalletForUser(UserId),
    #[error("Wallet is deactivated: {0}")]
    WalletInactive(WalletId),
    #[error("Balance invariant violated: {0}")]
    Invariant(&'static str),
    #[error("Concurrent update conflict on wallet {0}")]
    Conflict(WalletId),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn map_wallet_err(wallet_id: WalletId, e: WalletError) -> LedgerError {
    match e {
        WalletError::InsufficientFunds => LedgerError::InsufficientFunds,
        WalletError::Inactive => LedgerError::WalletInactive(wallet_id),
        WalletError::InsufficientLocked => LedgerError::Invariant("release exceeds locked funds"),
        WalletError::Overflow => LedgerError::Invariant("balance arithmetic overflow"),
    }
}

/// Wallet Ledger service.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    wallet_locks: DashMap<WalletId, Arc<Mutex<()>>>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            wallet_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, wallet_id: WalletId) -> Arc<Mutex<()>> {
        self.wallet_locks
            .entry(wallet_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn wallet(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        self.store
            .wallet(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))
    }

    pub async fn wallet_for_user(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        self.store
            .wallet_by_user(user_id)
            .await?
            .ok_or(LedgerError::NoWalletForUser(user_id))
    }

    /// Apply a credit exactly once.
    ///
    /// A duplicate `reference` returns the previously recorded transaction
    /// unchanged - this is the contract that makes webhook replay safe.
    /// Deposits enter the holding window uncleared; every other category is
    /// spendable immediately.
    pub async fn apply_credit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        category: TxCategory,
        reference: TxRef,
        external_ref: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.store.transaction_by_reference(&reference).await? {
            info!(reference = %reference, "Duplicate credit reference - returning existing transaction");
            return Ok(existing);
        }

        let wallet = self.wallet(wallet_id).await?;
        if !wallet.active {
            return Err(LedgerError::WalletInactive(wallet_id));
        }
        let clears_now = category.clears_immediately();
        let balance_before = wallet.balance();
        let balance_after = balance_before
            .checked_add(amount)
            .ok_or(LedgerError::Invariant("balance arithmetic overflow"))?;
        let now = Utc::now();

        let tx = Transaction {
            reference: reference.clone(),
            wallet_id,
            user_id: wallet.user_id,
            tx_type: TxType::Credit,
            category,
            amount,
            fee: 0,
            balance_before,
            balance_after,
            external_ref,
            status: TxStatus::Success,
            is_cleared: clears_now,
            cleared_at: clears_now.then_some(now),
            created_at: now,
            metadata: None,
        };

        // The unique reference insert is the commit point: if another
        // process already claimed it, the credit was applied there.
        if !self.store.insert_transaction(&tx).await? {
            warn!(reference = %reference, "Lost reference insert race - credit applied elsewhere");
            return Ok(self
                .store
                .transaction_by_reference(&reference)
                .await?
                .ok_or_else(|| StoreError::NotFound(reference.to_string()))?);
        }

        self.mutate(wallet_id, |w| {
            if clears_now {
                w.credit_cleared(amount)
            } else {
                w.credit(amount)
            }
        })
        .await?;

        Ok(tx)
    }

    /// Apply a debit against available funds (`cleared - locked`).
    pub async fn apply_debit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        fee: Amount,
        category: TxCategory,
        reference: TxRef,
    ) -> Result<Transaction, LedgerError> {
        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.store.transaction_by_reference(&reference).await? {
            info!(reference = %reference, "Duplicate debit reference - returning existing transaction");
            return Ok(existing);
        }

        let wallet = self.wallet(wallet_id).await?;
        if !wallet.active {
            return Err(LedgerError::WalletInactive(wallet_id));
        }
        if wallet.available() < amount {
            return Err(LedgerError::InsufficientFunds);
        }

        let tx = self
            .record_debit(&wallet, amount, fee, category, reference, None)
            .await?;
        self.mutate(wallet_id, |w| w.debit(amount)).await?;
        Ok(tx)
    }

    /// Reserve available funds against an in-flight payout.
    pub async fn reserve(&self, wallet_id: WalletId, amount: Amount) -> Result<(), LedgerError> {
        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock().await;
        self.mutate(wallet_id, |w| w.reserve(amount)).await?;
        Ok(())
    }

    /// Release a reservation without spending it.
    pub async fn release(&self, wallet_id: WalletId, amount: Amount) -> Result<(), LedgerError> {
        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock().await;
        self.mutate(wallet_id, |w| w.release(amount)).await?;
        Ok(())
    }

    /// Consume a reservation and commit the debit in one critical section,
    /// so the released funds can never be claimed by a concurrent request
    /// in between. Used when a payout completes.
    pub async fn commit_reserved(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        fee: Amount,
        category: TxCategory,
        reference: TxRef,
        external_ref: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.store.transaction_by_reference(&reference).await? {
            info!(reference = %reference, "Duplicate commit reference - returning existing transaction");
            return Ok(existing);
        }

        let wallet = self.wallet(wallet_id).await?;
        if wallet.locked() < amount {
            return Err(LedgerError::Invariant("commit exceeds locked funds"));
        }

        let tx = self
            .record_debit(&wallet, amount, fee, category, reference, external_ref)
            .await?;
        self.mutate(wallet_id, |w| w.commit_locked(amount)).await?;
        Ok(tx)
    }

    /// Promote a matured deposit: flip the transaction to cleared and bump
    /// the wallet's cleared balance. Idempotent - a record that already
    /// cleared returns false and the wallet is untouched.
    pub async fn clear_transaction(&self, reference: &TxRef) -> Result<bool, LedgerError> {
        let tx = self
            .store
            .transaction_by_reference(reference)
            .await?
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))?;
        if tx.is_cleared {
            return Ok(false);
        }

        let lock = self.lock_for(tx.wallet_id);
        let _guard = lock.lock().await;

        // The CAS flip is the idempotency gate; once it succeeds the record
        // leaves the clearance selection set permanently.
        if !self
            .store
            .mark_transaction_cleared(reference, Utc::now())
            .await?
        {
            return Ok(false);
        }

        self.mutate(tx.wallet_id, |w| w.clear(tx.amount)).await?;
        Ok(true)
    }

    async fn record_debit(
        &self,
        wallet: &Wallet,
        amount: Amount,
        fee: Amount,
        category: TxCategory,
        reference: TxRef,
        external_ref: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let balance_before = wallet.balance();
        let balance_after = balance_before
            .checked_sub(amount)
            .ok_or(LedgerError::Invariant("debit exceeds balance"))?;
        let now = Utc::now();

        let tx = Transaction {
            reference: reference.clone(),
            wallet_id: wallet.wallet_id,
            user_id: wallet.user_id,
            tx_type: TxType::Debit,
            category,
            amount,
            fee,
            balance_before,
            balance_after,
            external_ref,
            status: TxStatus::Success,
            is_cleared: true,
            cleared_at: Some(now),
            created_at: now,
            metadata: None,
        };

        if !self.store.insert_transaction(&tx).await? {
            return Ok(self
                .store
                .transaction_by_reference(&reference)
                .await?
                .ok_or_else(|| StoreError::NotFound(reference.to_string()))?);
        }
        Ok(tx)
    }

    /// Load-mutate-CAS loop. The in-process wallet lock is already held;
    /// retries only fire when a writer in another process interleaves.
    async fn mutate<F>(&self, wallet_id: WalletId, op: F) -> Result<Wallet, LedgerError>
    where
        F: Fn(&mut Wallet) -> Result<(), WalletError>,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut wallet = self.wallet(wallet_id).await?;
            let expected = wallet.version();
            op(&mut wallet).map_err(|e| map_wallet_err(wallet_id, e))?;
            if self.store.update_wallet(&wallet, expected).await? {
                return Ok(wallet);
            }
            warn!(wallet_id, "Wallet version conflict, retrying");
        }
        error!(wallet_id, "Wallet CAS retries exhausted");
        Err(LedgerError::Conflict(wallet_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn service_with_wallet() -> (Arc<MemoryStore>, LedgerService) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_wallet(&Wallet::new(1, 1001, "NGN"))
            .await
            .unwrap();
        let ledger = LedgerService::new(store.clone());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_credit_deposit_enters_holding_window() {
        let (store, ledger) = service_with_wallet().await;

        let tx = ledger
            .apply_credit(1, 500_000, TxCategory::Deposit, TxRef::new("R1"), None)
            .await
            .unwrap();

        assert!(!tx.is_cleared);
        assert!(tx.balances_consistent());
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 500_000);
        assert_eq!(wallet.cleared(), 0);
    }

    #[tokio::test]
    async fn test_credit_replay_applies_once() {
        let (store, ledger) = service_with_wallet().await;

        let first = ledger
            .apply_credit(1, 500_000, TxCategory::Deposit, TxRef::new("R1"), None)
            .await
            .unwrap();
        let second = ledger
            .apply_credit(1, 500_000, TxCategory::Deposit, TxRef::new("R1"), None)
            .await
            .unwrap();

        assert_eq!(first.reference, second.reference);
        assert_eq!(first.balance_after, second.balance_after);
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 500_000); // Exactly once
    }

    #[tokio::test]
    async fn test_non_deposit_credit_clears_immediately() {
        let (store, ledger) = service_with_wallet().await;

        let tx = ledger
            .apply_credit(1, 100_000, TxCategory::Refund, TxRef::new("RF1"), None)
            .await
            .unwrap();

        assert!(tx.is_cleared);
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.cleared(), 100_000);
        assert_eq!(wallet.available(), 100_000);
    }

    #[tokio::test]
    async fn test_debit_rejected_on_uncleared_funds() {
        let (_, ledger) = service_with_wallet().await;

        ledger
            .apply_credit(1, 500_000, TxCategory::Deposit, TxRef::new("R1"), None)
            .await
            .unwrap();

        let err = ledger
            .apply_debit(1, 1, 0, TxCategory::Withdrawal, TxRef::new("W1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds));
    }

    #[tokio::test]
    async fn test_debit_records_symmetrically() {
        let (store, ledger) = service_with_wallet().await;

        ledger
            .apply_credit(1, 500_000, TxCategory::Transfer, TxRef::new("T1"), None)
            .await
            .unwrap();
        let tx = ledger
            .apply_debit(1, 200_000, 1_000, TxCategory::Withdrawal, TxRef::new("W1"))
            .await
            .unwrap();

        assert_eq!(tx.tx_type, TxType::Debit);
        assert!(tx.balances_consistent());
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 300_000);
        assert_eq!(wallet.cleared(), 300_000);
    }

    #[tokio::test]
    async fn test_reserve_release_cycle() {
        let (store, ledger) = service_with_wallet().await;

        ledger
            .apply_credit(1, 100_000, TxCategory::Transfer, TxRef::new("T1"), None)
            .await
            .unwrap();
        ledger.reserve(1, 60_000).await.unwrap();

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.available(), 40_000);

        let err = ledger
            .apply_debit(1, 50_000, 0, TxCategory::Withdrawal, TxRef::new("W1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds));

        ledger.release(1, 60_000).await.unwrap();
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.available(), 100_000);
    }

    #[tokio::test]
    async fn test_commit_reserved_spends_exactly_the_hold() {
        let (store, ledger) = service_with_wallet().await;

        ledger
            .apply_credit(1, 100_000, TxCategory::Transfer, TxRef::new("T1"), None)
            .await
            .unwrap();
        ledger.reserve(1, 60_000).await.unwrap();

        let tx = ledger
            .commit_reserved(
                1,
                60_000,
                500,
                TxCategory::Withdrawal,
                TxRef::new("PAYOUT-X"),
                Some("PROV-9".to_string()),
            )
            .await
            .unwrap();

        assert!(tx.balances_consistent());
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 40_000);
        assert_eq!(wallet.locked(), 0);
        assert_eq!(wallet.available(), 40_000);
    }

    #[tokio::test]
    async fn test_clear_transaction_once() {
        let (store, ledger) = service_with_wallet().await;

        ledger
            .apply_credit(1, 500_000, TxCategory::Deposit, TxRef::new("R1"), None)
            .await
            .unwrap();

        assert!(ledger.clear_transaction(&TxRef::new("R1")).await.unwrap());
        assert!(!ledger.clear_transaction(&TxRef::new("R1")).await.unwrap());

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.cleared(), 500_000); // Not double-cleared
    }

    #[tokio::test]
    async fn test_concurrent_credits_lose_no_update() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_wallet(&Wallet::new(1, 1001, "NGN"))
            .await
            .unwrap();
        let ledger = Arc::new(LedgerService::new(store.clone()));

        let mut tasks = Vec::new();
        for i in 0..50u32 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger
                    .apply_credit(
                        1,
                        1_000,
                        TxCategory::Transfer,
                        TxRef::new(format!("T{}", i)),
                        None,
                    )
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.balance(), 50_000);
        assert_eq!(wallet.cleared(), 50_000);
    }
}

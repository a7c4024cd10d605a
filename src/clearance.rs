//! Deposit Clearance Scheduler
//!
//! Periodic job that promotes matured deposits from provisional to
//! spendable funds. Runs on a fixed tick; each tick must win the persisted
//! job lock first, so the job is single-flight even with many processes
//! running. Records are promoted independently: one failure is logged and
//! naturally retried next tick, because the selection query re-selects
//! anything still uncleared.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::jobs::JobStatus;
use crate::ledger::{LedgerError, LedgerService};
use crate::store::{LedgerStore, StoreError};

/// Job-lock row name for this scheduler
pub const JOB_NAME: &str = "deposit_clearance";

#[derive(Debug, Error)]
pub enum ClearanceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearanceOutcome {
    /// Another instance held the job lock; nothing was done.
    Skipped,
    /// The batch ran; counts of promoted and errored records.
    Ran { cleared: u64, failed: u64 },
}

pub struct ClearanceScheduler {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<LedgerService>,
    tick_interval: Duration,
    hold_window: chrono::Duration,
    batch_size: u32,
    lock_stale_after: chrono::Duration,
}

impl ClearanceScheduler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<LedgerService>,
        tick_interval: Duration,
        hold_window: chrono::Duration,
        batch_size: u32,
        lock_stale_after: chrono::Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            tick_interval,
            hold_window,
            batch_size,
            lock_stale_after,
        }
    }

    /// Main loop. Never returns; spawn it.
    pub async fn run(&self) {
        info!(
            interval = ?self.tick_interval,
            hold_window_hours = self.hold_window.num_hours(),
            batch = self.batch_size,
            "Clearance scheduler starting"
        );
        let mut interval = tokio::time::interval(self.tick_interval);

        loop {
            interval.tick().await;
            match self.run_once().await {
                Ok(ClearanceOutcome::Skipped) => {
                    debug!("Clearance tick skipped - lock held elsewhere");
                }
                Ok(ClearanceOutcome::Ran { cleared, failed }) => {
                    if cleared > 0 || failed > 0 {
                        info!(cleared, failed, "Clearance tick finished");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Clearance tick failed");
                }
            }
        }
    }

    /// One tick: acquire the job lock, promote a bounded batch, release.
    pub async fn run_once(&self) -> Result<ClearanceOutcome, ClearanceError> {
        let now = Utc::now();
        if !self
            .store
            .try_acquire_job_lock(JOB_NAME, now, self.lock_stale_after)
            .await?
        {
            return Ok(ClearanceOutcome::Skipped);
        }

        let outcome = self.clear_batch().await;

        // The lock is released on every exit path; a crash is covered by
        // the stale-lock takeover in the store.
        self.store.release_job_lock(JOB_NAME, Utc::now()).await?;
        outcome
    }

    async fn clear_batch(&self) -> Result<ClearanceOutcome, ClearanceError> {
        let matured = self
            .store
            .clearable_transactions(Utc::now(), self.hold_window, self.batch_size)
            .await?;

        let mut cleared = 0u64;
        let mut failed = 0u64;
        for tx in matured {
            match self.ledger.clear_transaction(&tx.reference).await {
                Ok(true) => cleared += 1,
                // Already promoted by an earlier attempt; nothing to do.
                Ok(false) => {}
                Err(e) => {
                    // Retried next tick: the record is still uncleared and
                    // will be re-selected.
                    warn!(reference = %tx.reference, error = %e, "Failed to clear deposit");
                    failed += 1;
                }
            }
        }

        Ok(ClearanceOutcome::Ran { cleared, failed })
    }

    /// Status query for operational tooling; read from the persisted lock
    /// row, not from in-memory state.
    pub async fn status(&self) -> Result<JobStatus, ClearanceError> {
        let lock = self
            .store
            .job_lock(JOB_NAME)
            .await?
            .unwrap_or_else(|| crate::jobs::JobLock::new(JOB_NAME));
        Ok(lock.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::TxRef;
    use crate::store::MemoryStore;
    use crate::transaction::{Transaction, TxCategory, TxStatus, TxType};
    use crate::wallet::Wallet;
    use chrono::{DateTime, Utc};

    fn scheduler(store: Arc<MemoryStore>) -> ClearanceScheduler {
        let ledger = Arc::new(LedgerService::new(store.clone()));
        ClearanceScheduler::new(
            store,
            ledger,
            Duration::from_secs(60),
            chrono::Duration::hours(24),
            50,
            chrono::Duration::minutes(10),
        )
    }

    async fn seed_deposit(store: &MemoryStore, reference: &str, created_at: DateTime<Utc>) {
        let tx = Transaction {
            reference: TxRef::new(reference),
            wallet_id: 1,
            user_id: 1001,
            tx_type: TxType::Credit,
            category: TxCategory::Deposit,
            amount: 500_000,
            fee: 0,
            balance_before: 0,
            balance_after: 500_000,
            external_ref: None,
            status: TxStatus::Success,
            is_cleared: false,
            cleared_at: None,
            created_at,
            metadata: None,
        };
        store.insert_transaction(&tx).await.unwrap();
    }

    async fn seed_wallet_with_balance(store: &MemoryStore, balance: u64) {
        let mut wallet = Wallet::new(1, 1001, "NGN");
        wallet.credit(balance).unwrap();
        store.create_wallet(&wallet).await.unwrap();
    }

    #[tokio::test]
    async fn test_matured_deposit_is_promoted() {
        let store = Arc::new(MemoryStore::new());
        seed_wallet_with_balance(&store, 500_000).await;
        seed_deposit(&store, "R1", Utc::now() - chrono::Duration::hours(25)).await;

        let scheduler = scheduler(store.clone());
        let outcome = scheduler.run_once().await.unwrap();
        assert_eq!(
            outcome,
            ClearanceOutcome::Ran {
                cleared: 1,
                failed: 0
            }
        );

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.cleared(), 500_000);

        let tx = store
            .transaction_by_reference(&TxRef::new("R1"))
            .await
            .unwrap()
            .unwrap();
        assert!(tx.is_cleared);
        assert!(tx.cleared_at.is_some());
    }

    #[tokio::test]
    async fn test_young_deposit_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        seed_wallet_with_balance(&store, 500_000).await;
        seed_deposit(&store, "R1", Utc::now() - chrono::Duration::hours(1)).await;

        let scheduler = scheduler(store.clone());
        let outcome = scheduler.run_once().await.unwrap();
        assert_eq!(
            outcome,
            ClearanceOutcome::Ran {
                cleared: 0,
                failed: 0
            }
        );

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.cleared(), 0);
    }

    #[tokio::test]
    async fn test_second_run_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        seed_wallet_with_balance(&store, 500_000).await;
        seed_deposit(&store, "R1", Utc::now() - chrono::Duration::hours(25)).await;

        let scheduler = scheduler(store.clone());
        scheduler.run_once().await.unwrap();
        let outcome = scheduler.run_once().await.unwrap();
        assert_eq!(
            outcome,
            ClearanceOutcome::Ran {
                cleared: 0,
                failed: 0
            }
        );

        // Cleared exactly once
        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.cleared(), 500_000);
    }

    #[tokio::test]
    async fn test_tick_skipped_when_lock_held() {
        let store = Arc::new(MemoryStore::new());
        seed_wallet_with_balance(&store, 500_000).await;
        seed_deposit(&store, "R1", Utc::now() - chrono::Duration::hours(25)).await;

        // Simulate another instance holding the lock
        assert!(
            store
                .try_acquire_job_lock(JOB_NAME, Utc::now(), chrono::Duration::minutes(10))
                .await
                .unwrap()
        );

        let scheduler = scheduler(store.clone());
        assert_eq!(
            scheduler.run_once().await.unwrap(),
            ClearanceOutcome::Skipped
        );

        let wallet = store.wallet(1).await.unwrap().unwrap();
        assert_eq!(wallet.cleared(), 0);
    }

    #[tokio::test]
    async fn test_status_reflects_lock_row() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = scheduler(store.clone());

        let status = scheduler.status().await.unwrap();
        assert!(!status.running);
        assert!(status.last_run_at.is_none());

        seed_wallet_with_balance(&store, 0).await;
        scheduler.run_once().await.unwrap();

        let status = scheduler.status().await.unwrap();
        assert!(!status.running);
        assert!(status.last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_batch_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        seed_wallet_with_balance(&store, 30_000_000).await;
        for i in 0..60 {
            seed_deposit(
                &store,
                &format!("R{}", i),
                Utc::now() - chrono::Duration::hours(25),
            )
            .await;
        }

        let scheduler = scheduler(store.clone());
        let outcome = scheduler.run_once().await.unwrap();
        assert_eq!(
            outcome,
            ClearanceOutcome::Ran {
                cleared: 50,
                failed: 0
            }
        );

        // The rest are picked up next tick
        let outcome = scheduler.run_once().await.unwrap();
        assert_eq!(
            outcome,
            ClearanceOutcome::Ran {
                cleared: 10,
                failed: 0
            }
        );
    }
}

//! PostgreSQL store
//!
//! Runtime-bound queries against Postgres. Every state-machine write is an
//! atomic conditional UPDATE so concurrent workers cannot lose an update;
//! every idempotent insert is `ON CONFLICT DO NOTHING` with the
//! rows-affected count as the signal.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use uuid::Uuid;

use crate::core_types::{PayoutId, TxRef, UserId, WalletId};
use crate::jobs::JobLock;
use crate::payout::types::{Destination, ParentLedgerEntry, Payout, PayoutStatus, PayoutType};
use crate::settlement::SettlementConfig;
use crate::transaction::{Transaction, TxCategory, TxStatus, TxType};
use crate::wallet::Wallet;
use crate::webhook::{DispatchStatus, WebhookLog};

use super::{LedgerStore, StoreError, StoreResult, VirtualAccount};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and make sure the schema exists.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(50)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!("PostgreSQL connection pool established");
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        for ddl in SCHEMA.split(';') {
            let ddl = ddl.trim();
            if !ddl.is_empty() {
                sqlx::query(ddl).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    fn row_to_wallet(row: &PgRow) -> StoreResult<Wallet> {
        Ok(Wallet::from_parts(
            row.get::<i64, _>("wallet_id") as WalletId,
            row.get::<i64, _>("user_id") as UserId,
            row.get("currency"),
            row.get("active"),
            row.get::<i64, _>("balance") as u64,
            row.get::<i64, _>("cleared") as u64,
            row.get::<i64, _>("locked") as u64,
            row.get::<i64, _>("version") as u64,
        ))
    }

    fn row_to_transaction(row: &PgRow) -> StoreResult<Transaction> {
        let tx_type_id: i16 = row.get("tx_type");
        let tx_type = TxType::from_id(tx_type_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid tx_type: {}", tx_type_id)))?;
        let category_id: i16 = row.get("category");
        let category = TxCategory::from_id(category_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid category: {}", category_id)))?;
        let status_id: i16 = row.get("status");
        let status = TxStatus::from_id(status_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid status: {}", status_id)))?;
        let metadata = row
            .get::<Option<String>, _>("metadata")
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;

        Ok(Transaction {
            reference: TxRef::new(row.get::<String, _>("reference")),
            wallet_id: row.get::<i64, _>("wallet_id") as WalletId,
            user_id: row.get::<i64, _>("user_id") as UserId,
            tx_type,
            category,
            amount: row.get::<i64, _>("amount") as u64,
            fee: row.get::<i64, _>("fee") as u64,
            balance_before: row.get::<i64, _>("balance_before") as u64,
            balance_after: row.get::<i64, _>("balance_after") as u64,
            external_ref: row.get("external_ref"),
            status,
            is_cleared: row.get("is_cleared"),
            cleared_at: row.get("cleared_at"),
            created_at: row.get("created_at"),
            metadata,
        })
    }

    fn row_to_payout(row: &PgRow) -> StoreResult<Payout> {
        let payout_id_str: String = row.get("payout_id");
        let payout_id: PayoutId = payout_id_str
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("Invalid payout_id: {}", payout_id_str)))?;
        let status_id: i16 = row.get("status");
        let status = PayoutStatus::from_id(status_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid payout status: {}", status_id)))?;
        let type_id: i16 = row.get("payout_type");
        let payout_type = PayoutType::from_id(type_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Invalid payout_type: {}", type_id)))?;

        Ok(Payout {
            payout_id,
            user_id: row.get::<i64, _>("user_id") as UserId,
            wallet_id: row.get::<i64, _>("wallet_id") as WalletId,
            amount: row.get::<i64, _>("amount") as u64,
            fee: row.get::<i64, _>("fee") as u64,
            provider_fee: row.get::<i64, _>("provider_fee") as u64,
            total_debit: row.get::<i64, _>("total_debit") as u64,
            destination: Destination {
                account_number: row.get("account_number"),
                bank_code: row.get("bank_code"),
                account_name: row.get("account_name"),
            },
            payout_type,
            reference: TxRef::new(row.get::<String, _>("reference")),
            idempotency_key: row.get("idempotency_key"),
            external_ref: row.get("external_ref"),
            status,
            retry_count: row.get::<i32, _>("retry_count") as u32,
            failure_reason: row.get("failure_reason"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
        })
    }

    fn row_to_webhook_log(row: &PgRow) -> StoreResult<WebhookLog> {
        let dispatch_id: i16 = row.get("dispatch_status");
        let dispatch_status = DispatchStatus::from_id(dispatch_id).ok_or_else(|| {
            StoreError::Corrupt(format!("Invalid dispatch_status: {}", dispatch_id))
        })?;
        let payload: serde_json::Value = serde_json::from_str(&row.get::<String, _>("payload"))?;

        Ok(WebhookLog {
            log_id: row.get("log_id"),
            source: row.get("source"),
            event_type: row.get("event_type"),
            payload,
            signature: row.get("signature"),
            signature_valid: row.get("signature_valid"),
            dispatch_status,
            dispatch_attempts: row.get::<i32, _>("dispatch_attempts") as u32,
            received_at: row.get("received_at"),
        })
    }

    fn row_to_virtual_account(row: &PgRow) -> VirtualAccount {
        VirtualAccount {
            account_reference: row.get("account_reference"),
            user_id: row.get::<i64, _>("user_id") as UserId,
            wallet_id: row.get::<i64, _>("wallet_id") as WalletId,
            account_number: row.get("account_number"),
            bank_code: row.get("bank_code"),
            settlement_configured: row.get("settlement_configured"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_wallet(&self, wallet: &Wallet) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets_tb (wallet_id, user_id, currency, active, balance, cleared, locked, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (wallet_id) DO NOTHING
            "#,
        )
        .bind(wallet.wallet_id as i64)
        .bind(wallet.user_id as i64)
        .bind(&wallet.currency)
        .bind(wallet.active)
        .bind(wallet.balance() as i64)
        .bind(wallet.cleared() as i64)
        .bind(wallet.locked() as i64)
        .bind(wallet.version() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn wallet(&self, wallet_id: WalletId) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query("SELECT * FROM wallets_tb WHERE wallet_id = $1")
            .bind(wallet_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_wallet(&r)).transpose()
    }

    async fn wallet_by_user(&self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query("SELECT * FROM wallets_tb WHERE user_id = $1")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_wallet(&r)).transpose()
    }

    async fn update_wallet(&self, wallet: &Wallet, expected_version: u64) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallets_tb
            SET balance = $1, cleared = $2, locked = $3, active = $4, version = $5
            WHERE wallet_id = $6 AND version = $7
            "#,
        )
        .bind(wallet.balance() as i64)
        .bind(wallet.cleared() as i64)
        .bind(wallet.locked() as i64)
        .bind(wallet.active)
        .bind(wallet.version() as i64)
        .bind(wallet.wallet_id as i64)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_transaction(&self, tx: &Transaction) -> StoreResult<bool> {
        let metadata = tx
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = sqlx::query(
            r#"
            INSERT INTO transactions_tb
                (reference, wallet_id, user_id, tx_type, category, amount, fee,
                 balance_before, balance_after, external_ref, status, is_cleared,
                 cleared_at, created_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(tx.reference.as_str())
        .bind(tx.wallet_id as i64)
        .bind(tx.user_id as i64)
        .bind(tx.tx_type.id())
        .bind(tx.category.id())
        .bind(tx.amount as i64)
        .bind(tx.fee as i64)
        .bind(tx.balance_before as i64)
        .bind(tx.balance_after as i64)
        .bind(&tx.external_ref)
        .bind(tx.status.id())
        .bind(tx.is_cleared)
        .bind(tx.cleared_at)
        .bind(tx.created_at)
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transaction_by_reference(
        &self,
        reference: &TxRef,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query("SELECT * FROM transactions_tb WHERE reference = $1")
            .bind(reference.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_transaction(&r)).transpose()
    }

    async fn transactions_for_wallet(
        &self,
        wallet_id: WalletId,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT * FROM transactions_tb WHERE wallet_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(wallet_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn clearable_transactions(
        &self,
        now: DateTime<Utc>,
        hold_window: Duration,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let matured_before = now - hold_window;
        let rows = sqlx::query(
            r#"
            SELECT * FROM transactions_tb
            WHERE tx_type = $1
              AND category IN ($2, $3)
              AND status = $4
              AND is_cleared = FALSE
              AND ((cleared_at IS NOT NULL AND cleared_at <= $5)
                   OR (cleared_at IS NULL AND created_at <= $6))
            ORDER BY created_at ASC
            LIMIT $7
            "#,
        )
        .bind(TxType::Credit.id())
        .bind(TxCategory::Deposit.id())
        .bind(TxCategory::Transfer.id())
        .bind(TxStatus::Success.id())
        .bind(now)
        .bind(matured_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn mark_transaction_cleared(
        &self,
        reference: &TxRef,
        cleared_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions_tb
            SET is_cleared = TRUE, cleared_at = $1
            WHERE reference = $2 AND is_cleared = FALSE
            "#,
        )
        .bind(cleared_at)
        .bind(reference.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_payout(&self, payout: &Payout) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payouts_tb
                (payout_id, user_id, wallet_id, amount, fee, provider_fee, total_debit,
                 account_number, bank_code, account_name, payout_type, reference,
                 idempotency_key, external_ref, status, retry_count, failure_reason,
                 created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20)
            "#,
        )
        .bind(payout.payout_id.to_string())
        .bind(payout.user_id as i64)
        .bind(payout.wallet_id as i64)
        .bind(payout.amount as i64)
        .bind(payout.fee as i64)
        .bind(payout.provider_fee as i64)
        .bind(payout.total_debit as i64)
        .bind(&payout.destination.account_number)
        .bind(&payout.destination.bank_code)
        .bind(&payout.destination.account_name)
        .bind(payout.payout_type.id())
        .bind(payout.reference.as_str())
        .bind(&payout.idempotency_key)
        .bind(&payout.external_ref)
        .bind(payout.status.id())
        .bind(payout.retry_count as i32)
        .bind(&payout.failure_reason)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .bind(payout.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn payout(&self, payout_id: PayoutId) -> StoreResult<Option<Payout>> {
        let row = sqlx::query("SELECT * FROM payouts_tb WHERE payout_id = $1")
            .bind(payout_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_payout(&r)).transpose()
    }

    async fn payout_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Payout>> {
        let row = sqlx::query("SELECT * FROM payouts_tb WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_payout(&r)).transpose()
    }

    async fn payout_by_external_ref(&self, external_ref: &str) -> StoreResult<Option<Payout>> {
        let row = sqlx::query("SELECT * FROM payouts_tb WHERE external_ref = $1")
            .bind(external_ref)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_payout(&r)).transpose()
    }

    async fn update_payout_status_if(
        &self,
        payout_id: PayoutId,
        expected: PayoutStatus,
        new: PayoutStatus,
        failure_reason: Option<&str>,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payouts_tb
            SET status = $1,
                failure_reason = COALESCE($2, failure_reason),
                completed_at = COALESCE($3, completed_at),
                updated_at = NOW()
            WHERE payout_id = $4 AND status = $5
            "#,
        )
        .bind(new.id())
        .bind(failure_reason)
        .bind(completed_at)
        .bind(payout_id.to_string())
        .bind(expected.id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_payout_external_ref(
        &self,
        payout_id: PayoutId,
        external_ref: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE payouts_tb SET external_ref = $1, updated_at = NOW() WHERE payout_id = $2",
        )
        .bind(external_ref)
        .bind(payout_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_payout_retry(&self, payout_id: PayoutId) -> StoreResult<u32> {
        let count: i32 = sqlx::query_scalar(
            r#"
            UPDATE payouts_tb
            SET retry_count = retry_count + 1, updated_at = NOW()
            WHERE payout_id = $1
            RETURNING retry_count
            "#,
        )
        .bind(payout_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }

    async fn payouts_for_review(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<Vec<Payout>> {
        let stale_cutoff = now - stale_after;
        let rows = sqlx::query(
            r#"
            SELECT * FROM payouts_tb
            WHERE status = $1 OR (status = $2 AND updated_at < $3)
            ORDER BY created_at ASC
            "#,
        )
        .bind(PayoutStatus::ManualReview.id())
        .bind(PayoutStatus::Processing.id())
        .bind(stale_cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_payout).collect()
    }

    async fn append_parent_entry(&self, entry: &ParentLedgerEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO parent_ledger_tb (payout_id, amount, narration, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.payout_id.to_string())
        .bind(entry.amount as i64)
        .bind(&entry.narration)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn parent_entries(&self, limit: u32) -> StoreResult<Vec<ParentLedgerEntry>> {
        let rows = sqlx::query(
            "SELECT payout_id, amount, narration, created_at FROM parent_ledger_tb ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let payout_id_str: String = row.get("payout_id");
                let payout_id = payout_id_str.parse().map_err(|_| {
                    StoreError::Corrupt(format!("Invalid payout_id: {}", payout_id_str))
                })?;
                Ok(ParentLedgerEntry {
                    payout_id,
                    amount: row.get::<i64, _>("amount") as u64,
                    narration: row.get("narration"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn insert_webhook_log(&self, log: &WebhookLog) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_logs_tb
                (log_id, source, event_type, payload, signature, signature_valid,
                 dispatch_status, dispatch_attempts, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(log.log_id)
        .bind(&log.source)
        .bind(&log.event_type)
        .bind(serde_json::to_string(&log.payload)?)
        .bind(&log.signature)
        .bind(log.signature_valid)
        .bind(log.dispatch_status.id())
        .bind(log.dispatch_attempts as i32)
        .bind(log.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn webhook_logs_by_source(
        &self,
        source: &str,
        limit: u32,
    ) -> StoreResult<Vec<WebhookLog>> {
        let rows = sqlx::query(
            "SELECT * FROM webhook_logs_tb WHERE source = $1 ORDER BY received_at DESC LIMIT $2",
        )
        .bind(source)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_webhook_log).collect()
    }

    async fn record_webhook_dispatch(
        &self,
        log_id: Uuid,
        status: DispatchStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_logs_tb
            SET dispatch_status = $1, dispatch_attempts = dispatch_attempts + 1
            WHERE log_id = $2
            "#,
        )
        .bind(status.id())
        .bind(log_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn try_acquire_job_lock(
        &self,
        job_name: &str,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> StoreResult<bool> {
        let stale_cutoff = now - stale_after;
        let result = sqlx::query(
            r#"
            INSERT INTO job_locks_tb (job_name, is_locked, locked_at)
            VALUES ($1, TRUE, $2)
            ON CONFLICT (job_name) DO UPDATE
            SET is_locked = TRUE, locked_at = $2
            WHERE job_locks_tb.is_locked = FALSE
               OR job_locks_tb.locked_at IS NULL
               OR job_locks_tb.locked_at < $3
            "#,
        )
        .bind(job_name)
        .bind(now)
        .bind(stale_cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_job_lock(
        &self,
        job_name: &str,
        last_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE job_locks_tb
            SET is_locked = FALSE, locked_at = NULL, last_run_at = $1
            WHERE job_name = $2
            "#,
        )
        .bind(last_run_at)
        .bind(job_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn job_lock(&self, job_name: &str) -> StoreResult<Option<JobLock>> {
        let row = sqlx::query("SELECT * FROM job_locks_tb WHERE job_name = $1")
            .bind(job_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| JobLock {
            job_name: r.get("job_name"),
            is_locked: r.get("is_locked"),
            locked_at: r.get("locked_at"),
            last_run_at: r.get("last_run_at"),
        }))
    }

    async fn insert_virtual_account(&self, account: &VirtualAccount) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO virtual_accounts_tb
                (account_reference, user_id, wallet_id, account_number, bank_code,
                 settlement_configured, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (account_reference) DO NOTHING
            "#,
        )
        .bind(&account.account_reference)
        .bind(account.user_id as i64)
        .bind(account.wallet_id as i64)
        .bind(&account.account_number)
        .bind(&account.bank_code)
        .bind(account.settlement_configured)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn virtual_account_by_reference(
        &self,
        account_reference: &str,
    ) -> StoreResult<Option<VirtualAccount>> {
        let row = sqlx::query("SELECT * FROM virtual_accounts_tb WHERE account_reference = $1")
            .bind(account_reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Self::row_to_virtual_account(&r)))
    }

    async fn list_virtual_accounts(&self) -> StoreResult<Vec<VirtualAccount>> {
        let rows = sqlx::query("SELECT * FROM virtual_accounts_tb ORDER BY account_reference")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::row_to_virtual_account).collect())
    }

    async fn mark_virtual_account_configured(
        &self,
        account_reference: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE virtual_accounts_tb SET settlement_configured = TRUE WHERE account_reference = $1",
        )
        .bind(account_reference)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_settlement_config(&self, config: &SettlementConfig) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settlement_config_tb (id, config, updated_at)
            VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET config = $1, updated_at = NOW()
            "#,
        )
        .bind(serde_json::to_string(config)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_settlement_config(&self) -> StoreResult<Option<SettlementConfig>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT config FROM settlement_config_tb WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS wallets_tb (
    wallet_id BIGINT PRIMARY KEY,
    user_id BIGINT NOT NULL UNIQUE,
    currency TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    balance BIGINT NOT NULL DEFAULT 0,
    cleared BIGINT NOT NULL DEFAULT 0,
    locked BIGINT NOT NULL DEFAULT 0,
    version BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS transactions_tb (
    reference TEXT PRIMARY KEY,
    wallet_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    tx_type SMALLINT NOT NULL,
    category SMALLINT NOT NULL,
    amount BIGINT NOT NULL,
    fee BIGINT NOT NULL DEFAULT 0,
    balance_before BIGINT NOT NULL,
    balance_after BIGINT NOT NULL,
    external_ref TEXT,
    status SMALLINT NOT NULL,
    is_cleared BOOLEAN NOT NULL DEFAULT FALSE,
    cleared_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_transactions_clearable
    ON transactions_tb (created_at) WHERE is_cleared = FALSE;

CREATE INDEX IF NOT EXISTS idx_transactions_wallet
    ON transactions_tb (wallet_id, created_at);

CREATE TABLE IF NOT EXISTS payouts_tb (
    payout_id TEXT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    wallet_id BIGINT NOT NULL,
    amount BIGINT NOT NULL,
    fee BIGINT NOT NULL DEFAULT 0,
    provider_fee BIGINT NOT NULL DEFAULT 0,
    total_debit BIGINT NOT NULL,
    account_number TEXT NOT NULL,
    bank_code TEXT NOT NULL,
    account_name TEXT,
    payout_type SMALLINT NOT NULL,
    reference TEXT NOT NULL UNIQUE,
    idempotency_key TEXT UNIQUE,
    external_ref TEXT,
    status SMALLINT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    failure_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_payouts_external_ref ON payouts_tb (external_ref);

CREATE TABLE IF NOT EXISTS parent_ledger_tb (
    id BIGSERIAL PRIMARY KEY,
    payout_id TEXT NOT NULL,
    amount BIGINT NOT NULL,
    narration TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS webhook_logs_tb (
    log_id UUID PRIMARY KEY,
    source TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    signature TEXT,
    signature_valid BOOLEAN NOT NULL,
    dispatch_status SMALLINT NOT NULL,
    dispatch_attempts INTEGER NOT NULL DEFAULT 0,
    received_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS job_locks_tb (
    job_name TEXT PRIMARY KEY,
    is_locked BOOLEAN NOT NULL DEFAULT FALSE,
    locked_at TIMESTAMPTZ,
    last_run_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS virtual_accounts_tb (
    account_reference TEXT PRIMARY KEY,
    user_id BIGINT NOT NULL,
    wallet_id BIGINT NOT NULL,
    account_number TEXT NOT NULL,
    bank_code TEXT NOT NULL,
    settlement_configured BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS settlement_config_tb (
    id SMALLINT PRIMARY KEY CHECK (id = 1),
    config TEXT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)
"#;

//! HTTP handlers
//!
//! The inbound webhook endpoint consumes the raw body bytes so signature
//! verification sees exactly what was on the wire. Per the provider
//! contract it answers 401 only for signature failures; every other
//! processed-or-acknowledged outcome is a 200 with the result in the body,
//! which keeps provider-side retry storms bounded.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core_types::{Amount, PayoutId, UserId};
use crate::jobs::JobStatus;
use crate::ledger::LedgerError;
use crate::payout::engine::{PayoutError, PayoutRequest};
use crate::payout::types::{Destination, Payout, PayoutType};
use crate::settlement::{ConfigureSummary, SettlementConfig, SettlementError};
use crate::wallet::Wallet;
use crate::webhook::WebhookError;
use crate::webhook::service::IngestOutcome;

use super::state::AppState;
use super::types::{ApiResponse, error_codes};

/// Header carrying the provider's HMAC signature
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

type HandlerError = (StatusCode, Json<ApiResponse<()>>);

fn reject(status: StatusCode, code: i32, msg: impl Into<String>) -> HandlerError {
    (status, Json(ApiResponse::<()>::error(code, msg)))
}

// --- Requests ---

#[derive(Debug, Deserialize)]
pub struct PayoutApplyRequest {
    pub user_id: UserId,
    pub amount: Amount,
    pub account_number: String,
    pub bank_code: String,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub payout_type: Option<PayoutType>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

// --- Responses ---

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayoutView {
    pub payout_id: String,
    pub status: String,
    pub amount: Amount,
    pub fee: Amount,
    pub provider_fee: Amount,
    pub total_debit: Amount,
    pub account_number: String,
    pub bank_code: String,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Payout> for PayoutView {
    fn from(p: Payout) -> Self {
        Self {
            payout_id: p.payout_id.to_string(),
            status: p.status.to_string(),
            amount: p.amount,
            fee: p.fee,
            provider_fee: p.provider_fee,
            total_debit: p.total_debit,
            account_number: p.destination.account_number,
            bank_code: p.destination.bank_code,
            retry_count: p.retry_count,
            failure_reason: p.failure_reason,
            created_at: p.created_at,
            completed_at: p.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletView {
    pub wallet_id: u64,
    pub user_id: UserId,
    pub currency: String,
    pub balance: Amount,
    pub cleared_balance: Amount,
    pub locked_balance: Amount,
    pub available_balance: Amount,
    pub active: bool,
}

impl From<Wallet> for WalletView {
    fn from(w: Wallet) -> Self {
        Self {
            wallet_id: w.wallet_id,
            user_id: w.user_id,
            currency: w.currency.clone(),
            balance: w.balance(),
            cleared_balance: w.cleared(),
            locked_balance: w.locked(),
            available_balance: w.available(),
            active: w.active,
        }
    }
}

// --- Handlers ---

/// Inbound provider webhook
/// POST /webhook/{source}
pub async fn inbound_webhook(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, HandlerError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.webhooks.ingest(&source, &body, signature).await {
        Ok(outcome) => {
            let detail = match outcome {
                IngestOutcome::DepositApplied { reference } => {
                    format!("deposit applied: {}", reference)
                }
                IngestOutcome::PayoutReconciled { status } => {
                    format!("payout reconciled: {}", status)
                }
            };
            Ok(Json(ApiResponse::success(WebhookAck {
                processed: true,
                detail: Some(detail),
            })))
        }
        // Signature failure is the only 401; the provider should not retry
        // a payload it failed to sign correctly.
        Err(WebhookError::InvalidSignature) => Err(reject(
            StatusCode::UNAUTHORIZED,
            error_codes::INVALID_SIGNATURE,
            "Invalid webhook signature",
        )),
        // Everything else is acknowledged: the event is logged and safe to
        // inspect; failing the request would only trigger retry storms.
        Err(e) => Ok(Json(ApiResponse::success(WebhookAck {
            processed: false,
            detail: Some(e.to_string()),
        }))),
    }
}

/// Request a payout
/// POST /api/v1/payouts
pub async fn request_payout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PayoutApplyRequest>,
) -> Result<Json<ApiResponse<PayoutView>>, HandlerError> {
    let payout = state
        .payouts
        .request(PayoutRequest {
            user_id: req.user_id,
            amount: req.amount,
            destination: Destination {
                account_number: req.account_number,
                bank_code: req.bank_code,
                account_name: req.account_name,
            },
            payout_type: req.payout_type.unwrap_or(PayoutType::External),
            idempotency_key: req.idempotency_key,
        })
        .await
        .map_err(map_payout_error)?;

    // Dispatch runs out of band; the caller polls the payout status or
    // waits for the provider webhook to settle it.
    let engine = state.payouts.clone();
    let payout_id = payout.payout_id;
    tokio::spawn(async move {
        if let Err(e) = engine.dispatch(payout_id).await {
            error!(payout_id = %payout_id, error = %e, "Background dispatch failed");
        }
    });

    Ok(Json(ApiResponse::success(payout.into())))
}

/// Payout status query
/// GET /api/v1/payouts/{payout_id}
pub async fn get_payout(
    State(state): State<Arc<AppState>>,
    Path(payout_id): Path<String>,
) -> Result<Json<ApiResponse<PayoutView>>, HandlerError> {
    let payout_id: PayoutId = payout_id.parse().map_err(|_| {
        reject(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            "Invalid payout id",
        )
    })?;

    let payout = state
        .payouts
        .payout(payout_id)
        .await
        .map_err(map_payout_error)?;
    Ok(Json(ApiResponse::success(payout.into())))
}

/// Reconciliation queue for operational tooling
/// GET /api/v1/payouts/review
pub async fn payouts_for_review(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<PayoutView>>>, HandlerError> {
    let payouts = state
        .payouts
        .for_review()
        .await
        .map_err(map_payout_error)?;
    Ok(Json(ApiResponse::success(
        payouts.into_iter().map(PayoutView::from).collect(),
    )))
}

/// Wallet balances for a user
/// GET /api/v1/wallets/{user_id}
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ApiResponse<WalletView>>, HandlerError> {
    let wallet = state
        .ledger
        .wallet_for_user(user_id)
        .await
        .map_err(map_ledger_error)?;
    Ok(Json(ApiResponse::success(wallet.into())))
}

/// Recent transactions for a user's wallet
/// GET /api/v1/wallets/{user_id}/transactions
pub async fn get_wallet_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ApiResponse<Vec<crate::transaction::Transaction>>>, HandlerError> {
    let wallet = state
        .ledger
        .wallet_for_user(user_id)
        .await
        .map_err(map_ledger_error)?;
    let transactions = state
        .store
        .transactions_for_wallet(wallet.wallet_id, 50)
        .await
        .map_err(|e| {
            reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                e.to_string(),
            )
        })?;
    Ok(Json(ApiResponse::success(transactions)))
}

/// Supported destination banks, straight from the provider
/// GET /api/v1/banks
pub async fn get_banks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<crate::payout::provider::Bank>>>, HandlerError> {
    let banks = state.provider.get_bank_list().await.map_err(|e| {
        reject(
            StatusCode::BAD_GATEWAY,
            error_codes::PROVIDER_UNAVAILABLE,
            e.to_string(),
        )
    })?;
    Ok(Json(ApiResponse::success(banks)))
}

/// Clearance job status
/// GET /api/v1/jobs/clearance
pub async fn clearance_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<JobStatus>>, HandlerError> {
    let status = state.clearance.status().await.map_err(|e| {
        reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            e.to_string(),
        )
    })?;
    Ok(Json(ApiResponse::success(status)))
}

/// Replace the settlement configuration. Percentage lists that do not sum
/// to 100 (within tolerance) are rejected before anything is saved.
/// PUT /api/v1/settlement/config
pub async fn update_settlement_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<SettlementConfig>,
) -> Result<Json<ApiResponse<SettlementConfig>>, HandlerError> {
    state
        .settlement
        .update_config(config.clone())
        .await
        .map_err(map_settlement_error)?;
    Ok(Json(ApiResponse::success(config)))
}

/// GET /api/v1/settlement/config
pub async fn get_settlement_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SettlementConfig>>, HandlerError> {
    let config = state
        .settlement
        .config()
        .await
        .map_err(map_settlement_error)?
        .ok_or_else(|| {
            reject(
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                "No settlement configuration saved",
            )
        })?;
    Ok(Json(ApiResponse::success(config)))
}

/// Apply the saved configuration to every virtual account
/// POST /api/v1/settlement/configure
pub async fn auto_configure_settlement(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ConfigureSummary>>, HandlerError> {
    let config = state
        .settlement
        .config()
        .await
        .map_err(map_settlement_error)?
        .ok_or_else(|| {
            reject(
                StatusCode::CONFLICT,
                error_codes::NOT_FOUND,
                "No settlement configuration saved",
            )
        })?;

    let summary = state
        .settlement
        .auto_configure_all(&config)
        .await
        .map_err(map_settlement_error)?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Health check
/// GET /health
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}

// --- Error mapping ---

fn map_ledger_error(e: LedgerError) -> HandlerError {
    match e {
        LedgerError::InsufficientFunds => reject(
            StatusCode::BAD_REQUEST,
            error_codes::INSUFFICIENT_BALANCE,
            "Insufficient funds",
        ),
        LedgerError::WalletNotFound(_) | LedgerError::NoWalletForUser(_) => reject(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            e.to_string(),
        ),
        LedgerError::WalletInactive(_) => reject(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            e.to_string(),
        ),
        other => reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            other.to_string(),
        ),
    }
}

fn map_payout_error(e: PayoutError) -> HandlerError {
    match e {
        PayoutError::Ledger(inner) => map_ledger_error(inner),
        PayoutError::NotFound(_) | PayoutError::UnknownExternalRef(_) => reject(
            StatusCode::NOT_FOUND,
            error_codes::NOT_FOUND,
            e.to_string(),
        ),
        PayoutError::InvalidAmount | PayoutError::Fee(_) => reject(
            StatusCode::BAD_REQUEST,
            error_codes::INVALID_PARAMETER,
            e.to_string(),
        ),
        PayoutError::Store(_) => reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            e.to_string(),
        ),
    }
}

fn map_settlement_error(e: SettlementError) -> HandlerError {
    match e {
        SettlementError::PercentageMismatch { .. }
        | SettlementError::EmptySplitList
        | SettlementError::InvalidPercentage(_) => reject(
            StatusCode::BAD_REQUEST,
            error_codes::PERCENTAGE_MISMATCH,
            e.to_string(),
        ),
        SettlementError::Store(_) => reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            e.to_string(),
        ),
    }
}

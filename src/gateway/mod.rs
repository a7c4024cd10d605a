//! HTTP Gateway
//!
//! Axum router over the ledger core: the inbound webhook endpoint, payout
//! request/query routes, and the reconciliation and job-status queries used
//! by operational tooling.

pub mod handlers;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tracing::info;

pub use state::AppState;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/payouts", post(handlers::request_payout))
        .route("/payouts/review", get(handlers::payouts_for_review))
        .route("/payouts/{payout_id}", get(handlers::get_payout))
        .route("/wallets/{user_id}", get(handlers::get_wallet))
        .route(
            "/wallets/{user_id}/transactions",
            get(handlers::get_wallet_transactions),
        )
        .route("/banks", get(handlers::get_banks))
        .route("/jobs/clearance", get(handlers::clearance_status))
        .route(
            "/settlement/config",
            put(handlers::update_settlement_config).get(handlers::get_settlement_config),
        )
        .route(
            "/settlement/configure",
            post(handlers::auto_configure_settlement),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/webhook/{source}", post(handlers::inbound_webhook))
        .nest("/api/v1", api_routes)
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

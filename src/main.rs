//! payvault - Wallet Ledger & Settlement Engine
//!
//! Main entry point. Architecture:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌───────────┐    ┌──────────┐
//! │ Webhook  │───▶│  Ledger  │───▶│ Tx Log +  │    │Clearance │
//! │ Gateway  │    │ (locks)  │    │  Wallets  │◀───│Scheduler │
//! └──────────┘    └──────────┘    └───────────┘    └──────────┘
//!       │               ▲
//!       ▼               │
//! ┌──────────┐    ┌──────────┐
//! │  Payout  │───▶│ Provider │
//! │  Engine  │    │  Client  │
//! └──────────┘    └──────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use payvault::clearance::ClearanceScheduler;
use payvault::config::AppConfig;
use payvault::gateway::{self, AppState};
use payvault::ledger::LedgerService;
use payvault::logging::init_logging;
use payvault::payout::engine::{PayoutEngine, PayoutPolicy};
use payvault::payout::http::HttpProviderClient;
use payvault::payout::provider::{MockProvider, ProviderClient};
use payvault::payout::retry::RetryStrategy;
use payvault::settlement::SettlementService;
use payvault::store::{LedgerStore, MemoryStore, PgStore};
use payvault::webhook::WebhookProcessor;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = init_logging(&config);

    info!(env = %env, "payvault starting");

    // Store: Postgres when configured, in-memory otherwise (dev only)
    let store: Arc<dyn LedgerStore> = match &config.postgres_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            Arc::new(store)
        }
        None => {
            info!("No postgres_url configured - using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let ledger = Arc::new(LedgerService::new(store.clone()));

    let provider: Arc<dyn ProviderClient> = if config.provider.use_mock {
        info!("Using mock payment provider");
        Arc::new(MockProvider::new())
    } else {
        Arc::new(HttpProviderClient::new(
            config.provider.base_url.clone(),
            config.provider.secret_key.clone(),
            Duration::from_secs(config.provider.timeout_secs),
        )?)
    };

    let policy = PayoutPolicy {
        fee_rule: config.payout.fee_rule.clone(),
        provider_fee: config.payout.provider_fee,
        max_dispatch_attempts: config.payout.max_dispatch_attempts,
        retry: RetryStrategy::Exponential {
            initial: Duration::from_secs(config.payout.retry_initial_secs),
            max: Duration::from_secs(config.payout.retry_max_secs),
            multiplier: 2.0,
        },
        review_stale_after: chrono::Duration::minutes(config.payout.review_stale_minutes),
    };
    let payouts = Arc::new(PayoutEngine::new(
        store.clone(),
        ledger.clone(),
        provider.clone(),
        policy,
    ));

    let webhooks = Arc::new(WebhookProcessor::new(
        store.clone(),
        ledger.clone(),
        payouts.clone(),
        config.webhook.secret.as_bytes().to_vec(),
        config.webhook.allow_unverified,
    ));

    let settlement = Arc::new(SettlementService::new(store.clone(), provider.clone()));

    let clearance = Arc::new(ClearanceScheduler::new(
        store.clone(),
        ledger.clone(),
        Duration::from_secs(config.clearance.tick_interval_secs),
        chrono::Duration::hours(config.clearance.hold_window_hours),
        config.clearance.batch_size,
        chrono::Duration::minutes(config.clearance.lock_stale_minutes),
    ));

    // Scheduler ticks in the background; the job lock keeps it single-flight
    // across every running instance.
    let scheduler = clearance.clone();
    tokio::spawn(async move {
        scheduler.run().await;
    });

    let state = Arc::new(AppState::new(
        store,
        ledger,
        payouts,
        webhooks,
        settlement,
        clearance,
        provider,
    ));

    gateway::serve(state, &config.gateway.host, config.gateway.port).await
}

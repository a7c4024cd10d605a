//! Gateway application state (shared)

use std::sync::Arc;

use crate::clearance::ClearanceScheduler;
use crate::ledger::LedgerService;
use crate::payout::engine::PayoutEngine;
use crate::payout::provider::ProviderClient;
use crate::settlement::SettlementService;
use crate::store::LedgerStore;
use crate::webhook::WebhookProcessor;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub ledger: Arc<LedgerService>,
    pub payouts: Arc<PayoutEngine>,
    pub webhooks: Arc<WebhookProcessor>,
    pub settlement: Arc<SettlementService>,
    pub clearance: Arc<ClearanceScheduler>,
    pub provider: Arc<dyn ProviderClient>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<LedgerService>,
        payouts: Arc<PayoutEngine>,
        webhooks: Arc<WebhookProcessor>,
        settlement: Arc<SettlementService>,
        clearance: Arc<ClearanceScheduler>,
        provider: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            store,
            ledger,
            payouts,
            webhooks,
            settlement,
            clearance,
            provider,
        }
    }
}

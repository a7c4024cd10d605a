use serde::{Deserialize, Serialize};
use std::fs;

use crate::fees::FeeRule;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL; without it the in-memory store backs the
    /// process (local development only)
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub clearance: ClearanceConfig,
    #[serde(default)]
    pub payout: PayoutConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Shared secret for inbound HMAC verification
    pub secret: String,
    /// Non-production override: process deliveries that fail verification
    pub allow_unverified: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: "whsec_dev_only".to_string(),
            allow_unverified: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClearanceConfig {
    pub tick_interval_secs: u64,
    pub hold_window_hours: i64,
    pub batch_size: u32,
    /// A job lock held longer than this belongs to a crashed worker
    pub lock_stale_minutes: i64,
}

impl Default for ClearanceConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            hold_window_hours: 24,
            batch_size: 50,
            lock_stale_minutes: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PayoutConfig {
    pub fee_rule: FeeRule,
    /// Flat provider charge per transfer, in minor units
    pub provider_fee: u64,
    pub max_dispatch_attempts: u32,
    pub retry_initial_secs: u64,
    pub retry_max_secs: u64,
    pub review_stale_minutes: i64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            fee_rule: FeeRule::default(),
            provider_fee: 0,
            max_dispatch_attempts: 3,
            retry_initial_secs: 2,
            retry_max_secs: 60,
            review_stale_minutes: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_secs: u64,
    /// Run against the in-process mock provider instead of HTTP
    pub use_mock: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.provider.example".to_string(),
            secret_key: "sk_dev_only".to_string(),
            timeout_secs: 30,
            use_mock: true,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}

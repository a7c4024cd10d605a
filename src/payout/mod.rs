//! Payout / Settlement Engine
//!
//! Fee computation, the payout state machine, and the narrow
//! payment-provider client contract it dispatches through.

pub mod engine;
pub mod http;
pub mod provider;
pub mod retry;
pub mod types;

pub use engine::{PayoutEngine, PayoutError, PayoutPolicy, PayoutRequest};
pub use provider::{MockProvider, ProviderClient, ProviderError};
pub use retry::RetryStrategy;
pub use types::{Destination, Payout, PayoutStatus, PayoutType, TransferOutcome};

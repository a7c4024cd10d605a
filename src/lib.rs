//! payvault - Wallet Ledger & Settlement Engine
//!
//! The ledger core of a multi-tenant virtual-account payment platform:
//! every movement of money is recorded exactly once, provisional deposits
//! mature into spendable funds after a holding window, and settled funds
//! split across destination accounts to the exact minor unit.
//!
//! # Modules
//!
//! - [`core_types`] - Ids, references and the money primitive
//! - [`money`] - Decimal string <-> minor-unit conversion
//! - [`wallet`] - Enforced wallet balance type
//! - [`transaction`] - Immutable transaction log records
//! - [`ledger`] - Invariant-preserving credit/debit/reserve operations
//! - [`fees`] - Flat / percentage / tiered fee rules
//! - [`settlement`] - Percentage split validation and exact splitting
//! - [`store`] - Persistence seam (Postgres + in-memory)
//! - [`jobs`] - Persisted job locks for single-flight schedulers
//! - [`clearance`] - Deposit clearance scheduler
//! - [`webhook`] - Signed webhook ingestion gateway
//! - [`payout`] - Payout state machine and provider client
//! - [`gateway`] - HTTP API

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod logging;
pub mod money;

// Ledger core
pub mod fees;
pub mod ledger;
pub mod settlement;
pub mod transaction;
pub mod wallet;

// Persistence and jobs
pub mod jobs;
pub mod store;

// Flows
pub mod clearance;
pub mod gateway;
pub mod payout;
pub mod webhook;

// Convenient re-exports at crate root
pub use core_types::{Amount, PayoutId, TxRef, UserId, WalletId};
pub use ledger::{LedgerError, LedgerService};
pub use payout::{PayoutEngine, PayoutStatus};
pub use store::{LedgerStore, MemoryStore, PgStore};
pub use transaction::{Transaction, TxCategory, TxStatus, TxType};
pub use wallet::Wallet;
pub use webhook::WebhookProcessor;

//! Core types used throughout the system
//!
//! Fundamental identifiers and the money primitive shared by all modules.
//! They provide semantic meaning and enable future type evolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// User ID - globally unique, immutable after assignment.
///
/// # Usage:
/// - Primary key for user accounts
/// - Used in HashMap for O(1) wallet lookup
pub type UserId = u64;

/// Wallet ID - one wallet per user, unique within the system
pub type WalletId = u64;

/// Money amount in integer minor units of the wallet currency
/// (e.g. kobo for NGN, cents for USD). Never a float.
pub type Amount = u64;

/// Payout ID - ULID-based unique identifier
///
/// Using ULID provides:
/// - Monotonic, sortable IDs
/// - No coordination needed (no machine_id)
/// - 128-bit with good entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayoutId(ulid::Ulid);

impl PayoutId {
    /// Generate a new unique PayoutId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for PayoutId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PayoutId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Idempotency reference for a ledger transaction.
///
/// Globally unique; a financial event carrying an already-seen reference is
/// applied at most once no matter how many times it is delivered. For
/// provider-originated deposits this is the provider's own order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TxRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TxRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_id_unique() {
        let id1 = PayoutId::new();
        let id2 = PayoutId::new();

        assert_ne!(id1, id2);
    }

    #[test]
    fn test_payout_id_roundtrip() {
        let id = PayoutId::new();
        let parsed: PayoutId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_tx_ref_display() {
        let r = TxRef::new("PV-ORD-123");
        assert_eq!(r.as_str(), "PV-ORD-123");
        assert_eq!(r.to_string(), "PV-ORD-123");
    }
}

//! ENFORCED WALLET TYPE - the single source of truth for balance state.
//!
//! ALL balance mutations MUST go through these methods.
//!
//! # Enforcement Strategy:
//! 1. Balance fields are PRIVATE - no direct access
//! 2. All mutations return Result - errors are explicit
//! 3. Version auto-increments - CAS persistence and audit trail
//! 4. checked_add/sub - overflow protection
//! 5. Type system prevents bypassing validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::{Amount, UserId, WalletId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Insufficient locked funds")]
    InsufficientLocked,
    #[error("Balance arithmetic overflow")]
    Overflow,
    #[error("Wallet is deactivated")]
    Inactive,
}

/// Wallet for a single user.
///
/// # Invariants (ENFORCED by private fields):
/// - `0 <= locked <= cleared <= balance`
/// - `available = cleared - locked` is always derived, never stored
/// - Version increments on every mutation
/// - No overflow/underflow (checked arithmetic)
///
/// `balance` is the total ledger value, `cleared` the funds past the deposit
/// holding window, `locked` the subset of cleared funds reserved against
/// in-flight payouts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub currency: String,
    pub active: bool,
    balance: Amount,
    cleared: Amount,
    locked: Amount,
    version: u64,
}

impl Wallet {
    /// Create a fresh empty wallet at user onboarding.
    pub fn new(wallet_id: WalletId, user_id: UserId, currency: impl Into<String>) -> Self {
        Self {
            wallet_id,
            user_id,
            currency: currency.into(),
            active: true,
            balance: 0,
            cleared: 0,
            locked: 0,
            version: 0,
        }
    }

    /// Rehydrate a wallet from storage. Only the store layer should call this.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        wallet_id: WalletId,
        user_id: UserId,
        currency: String,
        active: bool,
        balance: Amount,
        cleared: Amount,
        locked: Amount,
        version: u64,
    ) -> Self {
        Self {
            wallet_id,
            user_id,
            currency,
            active,
            balance,
            cleared,
            locked,
            version,
        }
    }

    // ============================================================
    // READ-ONLY GETTERS (safe to expose)
    // ============================================================

    /// Total ledger value (read-only)
    #[inline(always)]
    pub const fn balance(&self) -> Amount {
        self.balance
    }

    /// Funds past the holding window (read-only)
    #[inline(always)]
    pub const fn cleared(&self) -> Amount {
        self.cleared
    }

    /// Funds reserved against in-flight payouts (read-only)
    #[inline(always)]
    pub const fn locked(&self) -> Amount {
        self.locked
    }

    /// Available-for-withdrawal: `cleared - locked`.
    ///
    /// Derived on read; persisting it would let it drift from its inputs.
    #[inline(always)]
    pub const fn available(&self) -> Amount {
        self.cleared - self.locked
    }

    /// Mutation counter, used for CAS writes in the store layer
    #[inline(always)]
    pub const fn version(&self) -> u64 {
        self.version
    }

    // ============================================================
    // VALIDATED MUTATIONS (ENFORCED operations)
    // ============================================================

    /// Credit funds without clearing them (deposit entering the holding
    /// window). Increases `balance` only.
    pub fn credit(&mut self, amount: Amount) -> Result<(), WalletError> {
        self.ensure_active()?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        self.bump();
        Ok(())
    }

    /// Credit funds that are spendable immediately (transfer, refund, ...).
    /// Increases both `balance` and `cleared`.
    pub fn credit_cleared(&mut self, amount: Amount) -> Result<(), WalletError> {
        self.ensure_active()?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        self.cleared = self
            .cleared
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        self.bump();
        Ok(())
    }

    /// Promote previously-credited funds past the holding window.
    /// Increases `cleared`; `balance` is untouched.
    pub fn clear(&mut self, amount: Amount) -> Result<(), WalletError> {
        let cleared = self
            .cleared
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        if cleared > self.balance {
            // Would break cleared <= balance: the amount was never credited.
            return Err(WalletError::InsufficientFunds);
        }
        self.cleared = cleared;
        self.bump();
        Ok(())
    }

    /// Debit available funds. Fails unless `cleared - locked >= amount`.
    /// Decreases `balance` and `cleared`.
    pub fn debit(&mut self, amount: Amount) -> Result<(), WalletError> {
        self.ensure_active()?;
        if self.available() < amount {
            return Err(WalletError::InsufficientFunds);
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(WalletError::Overflow)?;
        self.cleared = self
            .cleared
            .checked_sub(amount)
            .ok_or(WalletError::Overflow)?;
        self.bump();
        Ok(())
    }

    /// Reserve available funds against an in-flight payout.
    /// Increases `locked`; `balance` and `cleared` are untouched.
    pub fn reserve(&mut self, amount: Amount) -> Result<(), WalletError> {
        self.ensure_active()?;
        if self.available() < amount {
            return Err(WalletError::InsufficientFunds);
        }
        self.locked = self
            .locked
            .checked_add(amount)
            .ok_or(WalletError::Overflow)?;
        self.bump();
        Ok(())
    }

    /// Release a reservation without spending it (payout failed).
    pub fn release(&mut self, amount: Amount) -> Result<(), WalletError> {
        if self.locked < amount {
            return Err(WalletError::InsufficientLocked);
        }
        self.locked -= amount;
        self.bump();
        Ok(())
    }

    /// Spend reserved funds (payout confirmed): the reservation is consumed
    /// and the debit committed in one step, so released funds can never be
    /// claimed by a concurrent request in between.
    pub fn commit_locked(&mut self, amount: Amount) -> Result<(), WalletError> {
        if self.locked < amount {
            return Err(WalletError::InsufficientLocked);
        }
        self.locked -= amount;
        self.cleared = self
            .cleared
            .checked_sub(amount)
            .ok_or(WalletError::Overflow)?;
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(WalletError::Overflow)?;
        self.bump();
        Ok(())
    }

    /// Deactivate with the owning account. Wallets are never deleted.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.bump();
    }

    fn ensure_active(&self) -> Result<(), WalletError> {
        if self.active {
            Ok(())
        } else {
            Err(WalletError::Inactive)
        }
    }

    #[inline]
    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

// ============================================================
// TESTS - Prove enforcement works
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Wallet {
        Wallet::new(1, 1001, "NGN")
    }

    #[test]
    fn test_credit_enters_holding_window() {
        let mut w = wallet();
        w.credit(500_000).unwrap();

        assert_eq!(w.balance(), 500_000);
        assert_eq!(w.cleared(), 0);
        assert_eq!(w.available(), 0);
        assert_eq!(w.version(), 1);
    }

    #[test]
    fn test_credit_cleared_is_spendable() {
        let mut w = wallet();
        w.credit_cleared(500_000).unwrap();

        assert_eq!(w.balance(), 500_000);
        assert_eq!(w.cleared(), 500_000);
        assert_eq!(w.available(), 500_000);
    }

    #[test]
    fn test_clear_promotes() {
        let mut w = wallet();
        w.credit(500_000).unwrap();
        w.clear(500_000).unwrap();

        assert_eq!(w.cleared(), 500_000);
        assert_eq!(w.balance(), 500_000);
    }

    #[test]
    fn test_clear_cannot_exceed_balance() {
        let mut w = wallet();
        w.credit(100).unwrap();

        assert_eq!(w.clear(200), Err(WalletError::InsufficientFunds));
        assert_eq!(w.cleared(), 0); // Unchanged
    }

    #[test]
    fn test_debit_requires_available() {
        let mut w = wallet();
        w.credit(500_000).unwrap();

        // Credited but not cleared - nothing is available yet
        assert_eq!(w.debit(1), Err(WalletError::InsufficientFunds));

        w.clear(500_000).unwrap();
        w.debit(200_000).unwrap();
        assert_eq!(w.balance(), 300_000);
        assert_eq!(w.cleared(), 300_000);
    }

    #[test]
    fn test_reserve_release() {
        let mut w = wallet();
        w.credit_cleared(1_000).unwrap();

        w.reserve(600).unwrap();
        assert_eq!(w.available(), 400);
        assert_eq!(w.balance(), 1_000); // Total untouched

        // Reservation caps further debits
        assert_eq!(w.debit(500), Err(WalletError::InsufficientFunds));

        w.release(600).unwrap();
        assert_eq!(w.available(), 1_000);
    }

    #[test]
    fn test_reserve_beyond_available_fails() {
        let mut w = wallet();
        w.credit_cleared(1_000).unwrap();
        w.reserve(800).unwrap();

        assert_eq!(w.reserve(300), Err(WalletError::InsufficientFunds));
        assert_eq!(w.locked(), 800); // Unchanged
    }

    #[test]
    fn test_commit_locked() {
        let mut w = wallet();
        w.credit_cleared(1_000).unwrap();
        w.reserve(600).unwrap();

        w.commit_locked(600).unwrap();
        assert_eq!(w.balance(), 400);
        assert_eq!(w.cleared(), 400);
        assert_eq!(w.locked(), 0);
        assert_eq!(w.available(), 400);
    }

    #[test]
    fn test_release_more_than_locked_fails() {
        let mut w = wallet();
        w.credit_cleared(1_000).unwrap();
        w.reserve(100).unwrap();

        assert_eq!(w.release(200), Err(WalletError::InsufficientLocked));
    }

    #[test]
    fn test_overflow_guard() {
        let mut w = wallet();
        w.credit(u64::MAX).unwrap();

        assert_eq!(w.credit(1), Err(WalletError::Overflow));
    }

    #[test]
    fn test_inactive_wallet_rejects_mutations() {
        let mut w = wallet();
        w.credit_cleared(1_000).unwrap();
        w.deactivate();

        assert_eq!(w.credit(1), Err(WalletError::Inactive));
        assert_eq!(w.debit(1), Err(WalletError::Inactive));
        assert_eq!(w.reserve(1), Err(WalletError::Inactive));
        // In-flight payout resolution still works on a deactivated wallet
        assert!(w.release(0).is_ok());
    }

    #[test]
    fn test_invariant_chain() {
        let mut w = wallet();
        w.credit(500).unwrap();
        w.credit_cleared(300).unwrap();
        w.reserve(200).unwrap();

        assert!(w.locked() <= w.cleared());
        assert!(w.cleared() <= w.balance());
        assert_eq!(w.available(), w.cleared() - w.locked());
    }
}

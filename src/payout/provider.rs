//! Payment-provider client contract
//!
//! The payout engine and virtual-account provisioning depend only on this
//! narrow trait, so the provider can be swapped without touching the
//! ledger. The HTTP implementation lives in [`super::http`]; `MockProvider`
//! backs tests and local development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core_types::Amount;
use crate::settlement::SplitEntry;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Provider request timed out")]
    Timeout,
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
    #[error("Provider rejected the request: {0}")]
    Rejected(String),
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Retryable errors leave the real outcome unknown; only an explicit
    /// rejection is terminal.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Rejected(_))
    }
}

/// A provisioned virtual account as the provider reports it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualAccountDetails {
    pub account_reference: String,
    pub account_number: String,
    pub bank_code: String,
    pub bank_name: String,
}

/// A resolved bank account holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bank {
    pub name: String,
    pub code: String,
}

/// Outbound transfer instruction
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    /// Our payout reference; the provider echoes it for reconciliation
    pub reference: String,
    pub amount: Amount,
    pub currency: String,
    pub account_number: String,
    pub bank_code: String,
    pub narration: String,
}

/// Acknowledgement of an accepted transfer. Final status arrives later via
/// webhook or polling; dispatch acceptance is not completion.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferReceipt {
    /// Provider's own order number
    pub order_no: String,
}

#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provision a virtual account for a customer.
    async fn create_virtual_account(
        &self,
        customer_name: &str,
        reference: &str,
    ) -> Result<VirtualAccountDetails, ProviderError>;

    /// Look up the holder of a bank account.
    async fn resolve_bank_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> Result<BankAccount, ProviderError>;

    /// Dispatch an outbound transfer. Irreversible once accepted.
    async fn initiate_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, ProviderError>;

    /// List supported destination banks.
    async fn get_bank_list(&self) -> Result<Vec<Bank>, ProviderError>;

    /// Attach a settlement split to a virtual account.
    async fn apply_split_config(
        &self,
        account_number: &str,
        splits: &[SplitEntry],
    ) -> Result<(), ProviderError>;
}

/// Scriptable in-memory provider for tests and local development.
///
/// Transfer outcomes are consumed from a queue; when the queue is empty
/// every transfer succeeds with a generated order number.
#[derive(Default)]
pub struct MockProvider {
    transfer_script: Mutex<VecDeque<Result<TransferReceipt, ProviderError>>>,
    split_script: Mutex<VecDeque<Result<(), ProviderError>>>,
    transfer_calls: AtomicU64,
    counter: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next `initiate_transfer` call.
    pub async fn script_transfer(&self, result: Result<TransferReceipt, ProviderError>) {
        self.transfer_script.lock().await.push_back(result);
    }

    /// Queue `n` consecutive failures of the given kind.
    pub async fn script_transfer_failures(&self, error: ProviderError, n: usize) {
        let mut script = self.transfer_script.lock().await;
        for _ in 0..n {
            script.push_back(Err(error.clone()));
        }
    }

    /// Queue the outcome of the next `apply_split_config` call.
    pub async fn script_split(&self, result: Result<(), ProviderError>) {
        self.split_script.lock().await.push_back(result);
    }

    /// Number of transfer dispatch attempts seen so far.
    pub fn transfer_calls(&self) -> u64 {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    async fn create_virtual_account(
        &self,
        _customer_name: &str,
        reference: &str,
    ) -> Result<VirtualAccountDetails, ProviderError> {
        Ok(VirtualAccountDetails {
            account_reference: reference.to_string(),
            account_number: format!("90{:08}", self.next_id()),
            bank_code: "999".to_string(),
            bank_name: "Mock Bank".to_string(),
        })
    }

    async fn resolve_bank_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> Result<BankAccount, ProviderError> {
        Ok(BankAccount {
            account_number: account_number.to_string(),
            account_name: "Mock Account Holder".to_string(),
            bank_code: bank_code.to_string(),
        })
    }

    async fn initiate_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, ProviderError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.transfer_script.lock().await.pop_front() {
            return scripted;
        }
        Ok(TransferReceipt {
            order_no: format!("MOCK-TRF-{}-{}", request.reference, self.next_id()),
        })
    }

    async fn get_bank_list(&self) -> Result<Vec<Bank>, ProviderError> {
        Ok(vec![
            Bank {
                name: "Mock Bank".to_string(),
                code: "999".to_string(),
            },
            Bank {
                name: "Second Mock Bank".to_string(),
                code: "998".to_string(),
            },
        ])
    }

    async fn apply_split_config(
        &self,
        _account_number: &str,
        _splits: &[SplitEntry],
    ) -> Result<(), ProviderError> {
        if let Some(scripted) = self.split_script.lock().await.pop_front() {
            return scripted;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Unavailable("503".to_string()).is_retryable());
        assert!(ProviderError::Malformed("bad json".to_string()).is_retryable());
        assert!(!ProviderError::Rejected("invalid account".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_mock_scripts_then_succeeds() {
        let provider = MockProvider::new();
        provider
            .script_transfer(Err(ProviderError::Timeout))
            .await;

        let request = TransferRequest {
            reference: "P1".to_string(),
            amount: 1_000,
            currency: "NGN".to_string(),
            account_number: "0123456789".to_string(),
            bank_code: "058".to_string(),
            narration: "test".to_string(),
        };

        assert!(provider.initiate_transfer(&request).await.is_err());
        assert!(provider.initiate_transfer(&request).await.is_ok());
        assert_eq!(provider.transfer_calls(), 2);
    }
}

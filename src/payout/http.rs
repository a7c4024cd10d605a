//! HTTP payment-provider client
//!
//! reqwest implementation of [`ProviderClient`] against the provider's REST
//! API. Every call carries the client-level fixed timeout; retry policy is
//! the payout engine's concern, not this layer's.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::settlement::SplitEntry;

use super::provider::{
    Bank, BankAccount, ProviderClient, ProviderError, TransferReceipt, TransferRequest,
    VirtualAccountDetails,
};

pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

/// Provider response envelope: `{"status": true, "message": ..., "data": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl HttpProviderClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn post<B: serde::Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Provider POST");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::unwrap_envelope(response).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Provider GET");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::unwrap_envelope(response).await
    }

    /// Acknowledge-only POST: the provider returns no payload of interest,
    /// only the envelope status.
    async fn post_expect_ack<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Provider POST");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        Self::parse_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn unwrap_envelope<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<R, ProviderError> {
        Self::parse_envelope::<R>(response)
            .await?
            .data
            .ok_or_else(|| ProviderError::Malformed("missing data field".to_string()))
    }

    async fn parse_envelope<R: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Envelope<R>, ProviderError> {
        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        let envelope: Envelope<R> = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if status.is_client_error() || !envelope.status {
            return Err(ProviderError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }

        Ok(envelope)
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn create_virtual_account(
        &self,
        customer_name: &str,
        reference: &str,
    ) -> Result<VirtualAccountDetails, ProviderError> {
        self.post(
            "/v1/virtual-accounts",
            &serde_json::json!({
                "customer_name": customer_name,
                "reference": reference,
            }),
        )
        .await
    }

    async fn resolve_bank_account(
        &self,
        account_number: &str,
        bank_code: &str,
    ) -> Result<BankAccount, ProviderError> {
        self.post(
            "/v1/accounts/resolve",
            &serde_json::json!({
                "account_number": account_number,
                "bank_code": bank_code,
            }),
        )
        .await
    }

    async fn initiate_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, ProviderError> {
        self.post("/v1/transfers", request).await
    }

    async fn get_bank_list(&self) -> Result<Vec<Bank>, ProviderError> {
        self.get("/v1/banks").await
    }

    async fn apply_split_config(
        &self,
        account_number: &str,
        splits: &[SplitEntry],
    ) -> Result<(), ProviderError> {
        self.post_expect_ack(
            &format!("/v1/virtual-accounts/{}/split", account_number),
            &serde_json::json!({ "splits": splits }),
        )
        .await
    }
}

//! HTTP client for the external telephony provider.
//!
//! This crate speaks the two messages the orchestrator exchanges with the
//! provider: the outbound `initiate-call` request and the shape of the
//! inbound callback body (parsed by the server crate, not here).

pub mod models;

use reqwest::Client;
use std::time::Duration;

pub use models::{InitiateCallRequest, InitiateCallResponse};

/// Connection options for the provider client.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// Base URL of the provider, e.g. `https://telephony.example.com`.
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request to provider failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned non-2xx status {status}: {body}")]
    NonSuccess { status: u16, body: String },
}

impl ProviderError {
    /// True for errors worth retrying (network failure or 5xx); false for
    /// errors the provider will never resolve on its own (4xx).
    pub fn is_retriable(&self) -> bool {
        match self {
            ProviderError::Request(_) => true,
            ProviderError::NonSuccess { status, .. } => *status >= 500,
        }
    }
}

/// Trait abstraction over the provider so lifecycle code can be tested
/// against a mock without making real HTTP calls.
#[async_trait::async_trait]
pub trait CallInitiator: Send + Sync {
    async fn initiate_call(
        &self,
        request: InitiateCallRequest,
    ) -> Result<InitiateCallResponse, ProviderError>;
}

/// Real HTTP-backed provider client.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    options: ProviderOptions,
    http: Client,
}

impl ProviderClient {
    pub fn new(options: ProviderOptions) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client should build with static config");
        Self { options, http }
    }
}

#[async_trait::async_trait]
impl CallInitiator for ProviderClient {
    async fn initiate_call(
        &self,
        request: InitiateCallRequest,
    ) -> Result<InitiateCallResponse, ProviderError> {
        let url = format!("{}/api/initiate-call", self.options.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.options.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%url, %status, "provider initiate-call returned non-2xx");
            return Err(ProviderError::NonSuccess {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.json::<InitiateCallResponse>().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_success_error_below_500_is_not_retriable() {
        let err = ProviderError::NonSuccess {
            status: 422,
            body: "bad number".into(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn non_success_error_5xx_is_retriable() {
        let err = ProviderError::NonSuccess {
            status: 503,
            body: "".into(),
        };
        assert!(err.is_retriable());
    }
}

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MarketplaceError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("NFT not found: {0}")]
    NftNotFound(Uuid),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Ownership record returned by the marketplace service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOwner {
    pub seller_id: Uuid,
}

/// HTTP client for the marketplace service. Resolves the current owner of
/// an NFT, which becomes the seller on a new transaction.
#[derive(Clone)]
pub struct MarketplaceClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl MarketplaceClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        Self::with_circuit_breaker(base_url, timeout_secs, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration.
    pub fn with_circuit_breaker(
        base_url: String,
        timeout_secs: u64,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        MarketplaceClient {
            client,
            base_url,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Resolves the current owner of an NFT.
    pub async fn get_nft_owner(&self, nft_id: Uuid) -> Result<NftOwner, MarketplaceError> {
        let url = format!(
            "{}/api/nfts/{}/owner",
            self.base_url.trim_end_matches('/'),
            nft_id
        );
        let client = self.client.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?;

                if response.status() == 404 {
                    return Err(MarketplaceError::NftNotFound(nft_id));
                }

                let owner = response.json::<NftOwner>().await?;
                Ok(owner)
            })
            .await;

        match result {
            Ok(owner) => Ok(owner),
            Err(FailsafeError::Rejected) => Err(MarketplaceError::CircuitBreakerOpen(
                "marketplace circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

//! Outbound notifications for transaction status changes.
//!
//! Delivery is best effort: the webhook processor logs failures and moves
//! on, it never re-drives a state transition because a notification could
//! not be sent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::domain::StarknetTransactionEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notification rejected: HTTP {0}")]
    Rejected(u16),
}

/// Delivery seam for status-change notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_transaction(
        &self,
        event: &StarknetTransactionEvent,
    ) -> Result<(), NotifyError>;
}

/// Posts the verified chain event to the notification service.
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self { client, base_url }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_transaction(
        &self,
        event: &StarknetTransactionEvent,
    ) -> Result<(), NotifyError> {
        let url = format!(
            "{}/api/notifications/transaction",
            self.base_url.trim_end_matches('/')
        );
        let response = self.client.post(&url).json(event).send().await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        debug!(tx_hash = %event.tx_hash, "notification delivered");
        Ok(())
    }
}

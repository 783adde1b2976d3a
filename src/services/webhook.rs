//! Webhook-driven transaction state machine.
//!
//! Verified chain events are the only path that moves a transaction
//! forward (escrow updates aside). Everything here is idempotent:
//! duplicates, unknown hashes and illegal transitions are logged no-ops,
//! so a relay may deliver the same event as often as it likes.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::domain::{StarknetTransactionEvent, TransactionStatus};
use crate::error::AppError;
use crate::metrics::SharedMetrics;
use crate::ports::{StoreError, TransactionStore};
use crate::services::notifier::Notifier;
use crate::signature;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

pub struct WebhookProcessor {
    store: Arc<dyn TransactionStore>,
    notifier: Arc<dyn Notifier>,
    metrics: SharedMetrics,
    secret: String,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        notifier: Arc<dyn Notifier>,
        metrics: SharedMetrics,
        secret: String,
    ) -> Self {
        Self {
            store,
            notifier,
            metrics,
            secret,
        }
    }

    /// Authenticates and applies one chain event.
    ///
    /// The signature is an HMAC-SHA256 over the canonical JSON serialization
    /// of the event, base64-encoded. A bad signature fails immediately and
    /// is never retried; transient store outages are retried with
    /// exponential backoff before giving up.
    pub async fn verify_and_process(
        &self,
        supplied_signature: &str,
        event: &StarknetTransactionEvent,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_vec(event)
            .map_err(|err| AppError::Unexpected(format!("failed to serialize event: {err}")))?;

        if !signature::verify(&self.secret, &payload, supplied_signature) {
            self.metrics.webhook_invalid_signature_total.inc();
            warn!(tx_hash = %event.tx_hash, "webhook signature verification failed");
            return Err(AppError::InvalidSignature);
        }

        self.metrics.webhook_events_total.inc();

        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.apply_event(event).await {
                Ok(()) => return Ok(()),
                Err(AppError::Store(StoreError::Unavailable(reason))) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        tx_hash = %event.tx_hash,
                        attempt,
                        %reason,
                        "store unavailable, retrying webhook processing"
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One attempt at driving the state machine for `event`.
    async fn apply_event(&self, event: &StarknetTransactionEvent) -> Result<(), AppError> {
        let Some(mut transaction) = self.store.find_by_hash(&event.tx_hash).await? else {
            warn!(tx_hash = %event.tx_hash, "webhook for unknown transaction hash, ignoring");
            return Ok(());
        };

        if transaction.status == event.status {
            debug!(
                transaction_id = %transaction.id,
                status = %transaction.status,
                "duplicate webhook delivery, ignoring"
            );
            self.metrics.webhook_duplicates_total.inc();
            return Ok(());
        }

        if !transaction.status.can_transition_to(event.status) {
            warn!(
                transaction_id = %transaction.id,
                from = %transaction.status,
                to = %event.status,
                "illegal status transition from webhook, ignoring"
            );
            return Ok(());
        }

        let previous = transaction.status;
        transaction.status = event.status;
        if event.status == TransactionStatus::Disputed {
            if let Some(escrow) = &mut transaction.escrow_details {
                escrow.is_disputed = true;
            }
        }
        transaction.updated_at = Utc::now();
        self.store.update(&transaction).await?;

        info!(
            transaction_id = %transaction.id,
            from = %previous,
            to = %transaction.status,
            block_number = event.block_number,
            "transaction status updated from webhook"
        );

        // Best effort: a failed notification never rolls back the
        // transition or surfaces to the relay.
        match self.notifier.notify_transaction(event).await {
            Ok(()) => self.metrics.notifications_sent_total.inc(),
            Err(err) => {
                self.metrics.notifications_failed_total.inc();
                warn!(
                    tx_hash = %event.tx_hash,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }

        Ok(())
    }
}

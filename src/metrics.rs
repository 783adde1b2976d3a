//! Prometheus metrics for webhook processing and fraud scoring, exposed at
//! `/metrics` in text exposition format.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::services::fraud::FraudCheckResult;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Transactions persisted through the create endpoint.
    pub transactions_created_total: IntCounter,
    /// Webhook events that passed signature verification.
    pub webhook_events_total: IntCounter,
    /// Webhook deliveries that matched the stored status (no-ops).
    pub webhook_duplicates_total: IntCounter,
    /// Webhook requests rejected for a bad signature.
    pub webhook_invalid_signature_total: IntCounter,
    /// Webhook requests rejected by the rate limiter.
    pub webhook_rate_limited_total: IntCounter,
    /// Status notifications that reached the notification service.
    pub notifications_sent_total: IntCounter,
    /// Status notifications that failed (logged and dropped).
    pub notifications_failed_total: IntCounter,
    /// Fraud evaluations performed.
    pub fraud_evaluations_total: IntCounter,
    /// Evaluations that flagged the transaction as suspicious.
    pub fraud_suspicious_total: IntCounter,
    /// Per-rule trigger counts, labeled by rule name.
    pub fraud_rule_hits_total: IntCounterVec,
}

impl Metrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("payment".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let counter = IntCounter::new(name, help).expect("metric creation");
            registry
                .register(Box::new(counter.clone()))
                .expect("metric registration");
            counter
        }

        let transactions_created_total = counter(
            &registry,
            "transactions_created_total",
            "Transactions persisted through the create endpoint",
        );
        let webhook_events_total = counter(
            &registry,
            "webhook_events_total",
            "Webhook events accepted after signature verification",
        );
        let webhook_duplicates_total = counter(
            &registry,
            "webhook_duplicates_total",
            "Webhook deliveries ignored as duplicates",
        );
        let webhook_invalid_signature_total = counter(
            &registry,
            "webhook_invalid_signature_total",
            "Webhook requests rejected for an invalid signature",
        );
        let webhook_rate_limited_total = counter(
            &registry,
            "webhook_rate_limited_total",
            "Webhook requests rejected by the rate limiter",
        );
        let notifications_sent_total = counter(
            &registry,
            "notifications_sent_total",
            "Transaction status notifications delivered",
        );
        let notifications_failed_total = counter(
            &registry,
            "notifications_failed_total",
            "Transaction status notifications that failed",
        );
        let fraud_evaluations_total = counter(
            &registry,
            "fraud_evaluations_total",
            "Fraud evaluations performed",
        );
        let fraud_suspicious_total = counter(
            &registry,
            "fraud_suspicious_total",
            "Fraud evaluations that flagged the transaction",
        );

        let fraud_rule_hits_total = IntCounterVec::new(
            Opts::new("fraud_rule_hits_total", "Fraud rule triggers by rule name"),
            &["rule"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(fraud_rule_hits_total.clone()))
            .expect("metric registration");

        Self {
            registry,
            transactions_created_total,
            webhook_events_total,
            webhook_duplicates_total,
            webhook_invalid_signature_total,
            webhook_rate_limited_total,
            notifications_sent_total,
            notifications_failed_total,
            fraud_evaluations_total,
            fraud_suspicious_total,
            fraud_rule_hits_total,
        }
    }

    /// Records the outcome of one fraud evaluation.
    pub fn record_fraud_result(&self, result: &FraudCheckResult) {
        self.fraud_evaluations_total.inc();
        if result.suspicious {
            self.fraud_suspicious_total.inc();
        }
        for rule in &result.triggered_rules {
            self.fraud_rule_hits_total.with_label_values(&[*rule]).inc();
        }
    }

    /// Share of evaluations flagged as suspicious, zero before the first
    /// evaluation.
    pub fn fraud_detection_rate(&self) -> f64 {
        let total = self.fraud_evaluations_total.get();
        if total == 0 {
            return 0.0;
        }
        self.fraud_suspicious_total.get() as f64 / total as f64
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

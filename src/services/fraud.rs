//! Fraud heuristics for newly created transactions.
//!
//! Scoring itself is a pure function over the transaction and the buyer's
//! recent history. It runs off the request path: the lifecycle service
//! enqueues onto a bounded channel drained by a single worker, and a
//! periodic sweep re-scores pending transactions in batches.

use std::fmt;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::domain::{Transaction, TransactionStatus};
use crate::metrics::SharedMetrics;
use crate::ports::{StoreError, TransactionStore};

const VELOCITY_WINDOW_MINUTES: i64 = 60;
const VELOCITY_MAX_PER_WINDOW: usize = 5;
const AMOUNT_SPIKE_FACTOR: i32 = 3;
/// History rows pulled per evaluation; also bounds the velocity count.
const HISTORY_LIMIT: u32 = 50;
const SWEEP_BATCH_SIZE: u32 = 50;
const QUEUE_CAPACITY: usize = 256;

/// Severity assigned by the rules. Rules only ever escalate, so the
/// derived ordering (`Low < Medium < High < Critical`) is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do with a flagged transaction. Ordered by
/// severity; `Block`, once reached, is never downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Recommendation {
    Allow,
    Review,
    Block,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Allow => "ALLOW",
            Recommendation::Review => "REVIEW",
            Recommendation::Block => "BLOCK",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation. Never persisted; consumed by the metrics
/// sink and the logs.
#[derive(Debug, Clone, PartialEq)]
pub struct FraudCheckResult {
    pub suspicious: bool,
    pub risk_level: RiskLevel,
    pub triggered_rules: Vec<&'static str>,
    pub recommendation: Recommendation,
}

impl FraudCheckResult {
    pub fn clean() -> Self {
        Self {
            suspicious: false,
            risk_level: RiskLevel::Low,
            triggered_rules: Vec::new(),
            recommendation: Recommendation::Allow,
        }
    }

    fn flag(&mut self, rule: &'static str, risk: RiskLevel, action: Recommendation) {
        self.suspicious = true;
        self.risk_level = self.risk_level.max(risk);
        self.recommendation = self.recommendation.max(action);
        self.triggered_rules.push(rule);
    }
}

/// Scores a transaction against the buyer's history.
///
/// `history` holds the buyer's other persisted transactions, the current
/// row excluded. Rules run in a fixed order; each one can only raise the
/// risk level and recommendation, so the final values are the maximum any
/// rule reached regardless of evaluation order.
pub fn apply_rules(transaction: &Transaction, history: &[Transaction]) -> FraudCheckResult {
    let mut result = FraudCheckResult::clean();

    // Velocity: more than 5 transactions in the last hour, current included.
    let window_start =
        transaction.created_at - chrono::Duration::minutes(VELOCITY_WINDOW_MINUTES);
    let recent = history
        .iter()
        .filter(|t| t.created_at > window_start)
        .count();
    if 1 + recent > VELOCITY_MAX_PER_WINDOW {
        result.flag("Velocity Check", RiskLevel::Medium, Recommendation::Review);
    }

    if let Some(signals) = &transaction.fraud_signals {
        // Geo discrepancy: IP geolocation disagrees with the billing country.
        if let (Some(ip), Some(billing)) = (&signals.ip_country, &signals.billing_country) {
            if !ip.eq_ignore_ascii_case(billing) {
                result.flag("Geo Discrepancy", RiskLevel::High, Recommendation::Block);
            }
        }

        // Device anomaly: a fingerprint this buyer has never used before.
        if let Some(fingerprint) = &signals.device_fingerprint {
            let seen = history.iter().any(|t| {
                t.fraud_signals
                    .as_ref()
                    .and_then(|s| s.device_fingerprint.as_deref())
                    == Some(fingerprint.as_str())
            });
            if !seen {
                result.flag("Device Anomaly", RiskLevel::Medium, Recommendation::Review);
            }
        }
    }

    // Amount spike: more than 3x the buyer's historical mean.
    if !history.is_empty() {
        let total = history
            .iter()
            .fold(BigDecimal::from(0), |acc, t| acc + &t.amount);
        let mean = total / BigDecimal::from(history.len() as i64);
        if mean > BigDecimal::from(0)
            && transaction.amount > &mean * BigDecimal::from(AMOUNT_SPIKE_FACTOR)
        {
            result.flag("Amount Spike", RiskLevel::Critical, Recommendation::Review);
        }
    }

    result
}

/// Store-backed scoring shared by the queue worker and the sweep loop.
#[derive(Clone)]
pub struct FraudService {
    store: Arc<dyn TransactionStore>,
    metrics: SharedMetrics,
}

impl FraudService {
    pub fn new(store: Arc<dyn TransactionStore>, metrics: SharedMetrics) -> Self {
        Self { store, metrics }
    }

    /// Loads the buyer's history, scores the transaction and records the
    /// outcome. A failed history lookup degrades to scoring against an
    /// empty history instead of failing the evaluation.
    pub async fn evaluate(&self, transaction: &Transaction) -> FraudCheckResult {
        let history: Vec<Transaction> = match self
            .store
            .find_by_buyer(transaction.buyer_id, HISTORY_LIMIT)
            .await
        {
            Ok(rows) => rows.into_iter().filter(|t| t.id != transaction.id).collect(),
            Err(err) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %err,
                    "fraud history lookup failed, scoring without history"
                );
                Vec::new()
            }
        };

        let result = apply_rules(transaction, &history);
        self.metrics.record_fraud_result(&result);

        if result.suspicious {
            warn!(
                transaction_id = %transaction.id,
                risk_level = %result.risk_level,
                recommendation = %result.recommendation,
                rules = ?result.triggered_rules,
                "transaction flagged by fraud rules"
            );
        } else {
            debug!(transaction_id = %transaction.id, "transaction passed fraud rules");
        }

        result
    }

    /// Re-scores one batch of pending transactions, oldest first.
    pub async fn sweep_pending(&self) -> Result<usize, StoreError> {
        let batch = self
            .store
            .find_with_status(TransactionStatus::Pending, SWEEP_BATCH_SIZE)
            .await?;
        for transaction in &batch {
            self.evaluate(transaction).await;
        }
        Ok(batch.len())
    }
}

/// Sending half of the evaluation queue, handed to the lifecycle service.
#[derive(Clone)]
pub struct FraudHandle {
    sender: mpsc::Sender<Transaction>,
}

impl FraudHandle {
    /// Queues a transaction for evaluation. A full or closed queue drops
    /// the job with a warning and the caller proceeds normally.
    pub fn enqueue(&self, transaction: Transaction) {
        match self.sender.try_send(transaction) {
            Ok(()) => {}
            Err(TrySendError::Full(t)) => {
                warn!(transaction_id = %t.id, "fraud queue full, dropping evaluation");
            }
            Err(TrySendError::Closed(t)) => {
                warn!(transaction_id = %t.id, "fraud worker stopped, dropping evaluation");
            }
        }
    }
}

/// Spawns the queue worker and returns the handle that feeds it.
pub fn spawn_worker(service: FraudService) -> FraudHandle {
    let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
    tokio::spawn(run_worker(service, receiver));
    FraudHandle { sender }
}

async fn run_worker(service: FraudService, mut receiver: mpsc::Receiver<Transaction>) {
    info!("fraud worker started");
    while let Some(transaction) = receiver.recv().await {
        service.evaluate(&transaction).await;
    }
    info!("fraud worker stopped");
}

/// Periodic re-scoring of pending transactions. An interval of zero
/// disables the sweep.
pub async fn run_sweep(service: FraudService, interval_secs: u64) {
    if interval_secs == 0 {
        info!("fraud sweep disabled");
        return;
    }
    info!(interval_secs, "fraud sweep started");

    loop {
        sleep(Duration::from_secs(interval_secs)).await;

        match service.sweep_pending().await {
            Ok(0) => {}
            Ok(count) => debug!(count, "fraud sweep re-scored pending transactions"),
            Err(err) => error!(error = %err, "fraud sweep batch failed"),
        }
    }
}

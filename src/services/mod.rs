pub mod fraud;
pub mod idempotency;
pub mod notifier;
pub mod transactions;
pub mod webhook;

pub use fraud::{apply_rules, run_sweep, spawn_worker, FraudCheckResult, FraudHandle, FraudService};
pub use notifier::{HttpNotifier, Notifier};
pub use transactions::TransactionService;
pub use webhook::WebhookProcessor;

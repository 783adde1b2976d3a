//! Inbound Starknet webhook event shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::transaction::TransactionStatus;

/// Confirmation event emitted by the chain watcher for a submitted
/// transaction. The webhook signature is computed over the canonical JSON
/// serialization of this structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarknetTransactionEvent {
    pub tx_hash: String,
    pub status: TransactionStatus,
    pub block_timestamp: DateTime<Utc>,
    pub block_number: u64,
    #[serde(default)]
    pub logs: Vec<StarknetEventLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarknetEventLog {
    pub contract_address: String,
    pub event_type: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

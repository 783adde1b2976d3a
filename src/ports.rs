//! Storage capability traits. Concrete backends live in `crate::adapters`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness invariant (idempotency key, transaction hash,
    /// fingerprint key) rejected the write.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// Transient backend failure. Callers with a retry budget may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Predicates for the list endpoint. `None` means "not filtered", never
/// "matches null".
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub nft_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub offset: u64,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Record linking an idempotency key to the request it first arrived with
/// and the response that was produced. Insert-once, never updated.
#[derive(Debug, Clone)]
pub struct IdempotencyFingerprint {
    pub key: String,
    pub request_hash: String,
    pub response_json: String,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyFingerprint {
    pub fn new(key: String, request_hash: String, response_json: String) -> Self {
        Self {
            key,
            request_hash,
            response_json,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction>;
    async fn update(&self, tx: &Transaction) -> StoreResult<Transaction>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>>;
    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<Transaction>>;
    async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Transaction>>;
    /// A buyer's persisted transactions, most recent first.
    async fn find_by_buyer(&self, buyer_id: Uuid, limit: u32) -> StoreResult<Vec<Transaction>>;
    /// Oldest-first batch in a given status, for sweep jobs.
    async fn find_with_status(
        &self,
        status: TransactionStatus,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>>;
    async fn query(&self, query: &TransactionQuery) -> StoreResult<Page<Transaction>>;
}

#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn insert(&self, fingerprint: &IdempotencyFingerprint) -> StoreResult<()>;
    async fn find(&self, key: &str) -> StoreResult<Option<IdempotencyFingerprint>>;
}

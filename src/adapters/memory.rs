//! In-memory implementations of the storage ports. Useful for tests and
//! local runs; state is lost on restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::ports::{
    FingerprintStore, IdempotencyFingerprint, Page, StoreError, StoreResult, TransactionQuery,
    TransactionStore,
};

#[derive(Clone, Default)]
pub struct InMemoryTransactionStore {
    inner: Arc<Mutex<HashMap<Uuid, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut inner = self.inner.lock().await;

        if let Some(key) = &tx.idempotency_key {
            if inner
                .values()
                .any(|t| t.idempotency_key.as_deref() == Some(key.as_str()))
            {
                return Err(StoreError::UniqueViolation {
                    constraint: "idx_transactions_idempotency_key".to_string(),
                });
            }
        }
        if let Some(hash) = &tx.transaction_hash {
            if inner
                .values()
                .any(|t| t.transaction_hash.as_deref() == Some(hash.as_str()))
            {
                return Err(StoreError::UniqueViolation {
                    constraint: "idx_transactions_hash".to_string(),
                });
            }
        }

        inner.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn update(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(&tx.id) {
            Some(existing) => {
                existing.status = tx.status;
                existing.transaction_hash = tx.transaction_hash.clone();
                existing.escrow_details = tx.escrow_details.clone();
                existing.updated_at = tx.updated_at;
                Ok(existing.clone())
            }
            None => Err(StoreError::Other(format!(
                "transaction {} disappeared during update",
                tx.id
            ))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner.get(&id).cloned())
    }

    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .values()
            .find(|t| t.transaction_hash.as_deref() == Some(hash))
            .cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Transaction>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .values()
            .find(|t| t.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn find_by_buyer(&self, buyer_id: Uuid, limit: u32) -> StoreResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<Transaction> = inner
            .values()
            .filter(|t| t.buyer_id == buyer_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn find_with_status(
        &self,
        status: TransactionStatus,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<Transaction> = inner
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn query(&self, query: &TransactionQuery) -> StoreResult<Page<Transaction>> {
        let inner = self.inner.lock().await;
        let mut matching: Vec<Transaction> = inner
            .values()
            .filter(|t| query.nft_id.map_or(true, |id| t.nft_id == id))
            .filter(|t| {
                query
                    .user_id
                    .map_or(true, |id| t.buyer_id == id || t.seller_id == id)
            })
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();

        Ok(Page { items, total })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFingerprintStore {
    inner: Arc<Mutex<HashMap<String, IdempotencyFingerprint>>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn insert(&self, fingerprint: &IdempotencyFingerprint) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.contains_key(&fingerprint.key) {
            return Err(StoreError::UniqueViolation {
                constraint: "idempotency_fingerprints_pkey".to_string(),
            });
        }
        inner.insert(fingerprint.key.clone(), fingerprint.clone());
        Ok(())
    }

    async fn find(&self, key: &str) -> StoreResult<Option<IdempotencyFingerprint>> {
        let inner = self.inner.lock().await;
        Ok(inner.get(key).cloned())
    }
}

//! Postgres implementations of the storage ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::domain::{PaymentMethod, Transaction, TransactionStatus};
use crate::ports::{
    FingerprintStore, IdempotencyFingerprint, Page, StoreError, StoreResult, TransactionQuery,
    TransactionStore,
};

const TRANSACTION_COLUMNS: &str = "id, buyer_id, seller_id, receiver_id, nft_id, auction_id, \
     amount, payment_method, transaction_hash, status, escrow_details, royalty_split, \
     fraud_signals, idempotency_key, created_at, updated_at";

/// Postgres-backed transaction store.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let escrow_json = encode_json(&tx.escrow_details)?;
        let signals_json = encode_json(&tx.fraud_signals)?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, buyer_id, seller_id, receiver_id, nft_id, auction_id,
                amount, payment_method, transaction_hash, status, escrow_details,
                royalty_split, fraud_signals, idempotency_key, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(tx.id)
        .bind(tx.buyer_id)
        .bind(tx.seller_id)
        .bind(tx.receiver_id)
        .bind(tx.nft_id)
        .bind(tx.auction_id)
        .bind(&tx.amount)
        .bind(tx.payment_method.as_str())
        .bind(&tx.transaction_hash)
        .bind(tx.status.as_str())
        .bind(escrow_json)
        .bind(&tx.royalty_split)
        .bind(signals_json)
        .bind(&tx.idempotency_key)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.into_domain()
    }

    async fn update(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let escrow_json = encode_json(&tx.escrow_details)?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET status = $2, transaction_hash = $3, escrow_details = $4, updated_at = $5
            WHERE id = $1
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(tx.id)
        .bind(tx.status.as_str())
        .bind(&tx.transaction_hash)
        .bind(escrow_json)
        .bind(tx.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(StoreError::Other(format!(
                "transaction {} disappeared during update",
                tx.id
            ))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_hash(&self, hash: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_hash = $1"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_idempotency_key(&self, key: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_buyer(&self, buyer_id: Uuid, limit: u32) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE buyer_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(buyer_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn find_with_status(
        &self,
        status: TransactionStatus,
        limit: u32,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE status = $1 ORDER BY created_at ASC LIMIT $2"
        ))
        .bind(status.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn query(&self, query: &TransactionQuery) -> StoreResult<Page<Transaction>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM transactions WHERE 1=1");
        push_predicates(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut select = QueryBuilder::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1=1"
        ));
        push_predicates(&mut select, query);
        select.push(" ORDER BY created_at DESC LIMIT ");
        select.push_bind(i64::from(query.limit));
        select.push(" OFFSET ");
        select.push_bind(query.offset as i64);

        let rows: Vec<TransactionRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let items = rows
            .into_iter()
            .map(TransactionRow::into_domain)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
        })
    }
}

fn push_predicates(builder: &mut QueryBuilder<'_, sqlx::Postgres>, query: &TransactionQuery) {
    if let Some(nft_id) = query.nft_id {
        builder.push(" AND nft_id = ");
        builder.push_bind(nft_id);
    }
    if let Some(user_id) = query.user_id {
        // A user participates as buyer or seller.
        builder.push(" AND (buyer_id = ");
        builder.push_bind(user_id);
        builder.push(" OR seller_id = ");
        builder.push_bind(user_id);
        builder.push(")");
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
}

/// Postgres-backed fingerprint store.
#[derive(Clone)]
pub struct PostgresFingerprintStore {
    pool: PgPool,
}

impl PostgresFingerprintStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintStore for PostgresFingerprintStore {
    async fn insert(&self, fingerprint: &IdempotencyFingerprint) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_fingerprints (key, request_hash, response_json, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&fingerprint.key)
        .bind(&fingerprint.request_hash)
        .bind(&fingerprint.response_json)
        .bind(fingerprint.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn find(&self, key: &str) -> StoreResult<Option<IdempotencyFingerprint>> {
        let row = sqlx::query_as::<_, FingerprintRow>(
            "SELECT key, request_hash, response_json, created_at \
             FROM idempotency_fingerprints WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(FingerprintRow::into_domain))
    }
}

fn map_sqlx(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(error.to_string())
        }
        _ => StoreError::Other(error.to_string()),
    }
}

fn encode_json<T: serde::Serialize>(value: &Option<T>) -> StoreResult<Option<serde_json::Value>> {
    value
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| StoreError::Other(format!("json encoding failed: {e}")))
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    receiver_id: Uuid,
    nft_id: Uuid,
    auction_id: Uuid,
    amount: BigDecimal,
    payment_method: String,
    transaction_hash: Option<String>,
    status: String,
    escrow_details: Option<serde_json::Value>,
    royalty_split: Option<serde_json::Value>,
    fraud_signals: Option<serde_json::Value>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(StoreError::Other)?;
        let payment_method = self
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(StoreError::Other)?;
        let escrow_details = self
            .escrow_details
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::Other(format!("corrupt escrow_details: {e}")))?;
        let fraud_signals = self
            .fraud_signals
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::Other(format!("corrupt fraud_signals: {e}")))?;

        Ok(Transaction {
            id: self.id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            receiver_id: self.receiver_id,
            nft_id: self.nft_id,
            auction_id: self.auction_id,
            amount: self.amount,
            payment_method,
            transaction_hash: self.transaction_hash,
            status,
            escrow_details,
            royalty_split: self.royalty_split,
            fraud_signals,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FingerprintRow {
    key: String,
    request_hash: String,
    response_json: String,
    created_at: DateTime<Utc>,
}

impl FingerprintRow {
    fn into_domain(self) -> IdempotencyFingerprint {
        IdempotencyFingerprint {
            key: self.key,
            request_hash: self.request_hash,
            response_json: self.response_json,
            created_at: self.created_at,
        }
    }
}

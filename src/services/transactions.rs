//! Transaction lifecycle: idempotent creation, reads, filtering and escrow
//! updates.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{EscrowDetails, Transaction, TransactionStatus};
use crate::error::AppError;
use crate::marketplace::MarketplaceClient;
use crate::metrics::SharedMetrics;
use crate::ports::{FingerprintStore, TransactionQuery, TransactionStore};
use crate::schemas::{
    CreateTransactionRequest, EscrowDetailsRequest, PageResponse, TransactionFilterParams,
    TransactionResponse,
};
use crate::services::fraud::FraudHandle;
use crate::services::idempotency;
use crate::validation::{validate_amount, validate_future_date, validate_required};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn TransactionStore>,
    fingerprints: Arc<dyn FingerprintStore>,
    marketplace: MarketplaceClient,
    fraud: FraudHandle,
    metrics: SharedMetrics,
    explorer_base_url: String,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        fingerprints: Arc<dyn FingerprintStore>,
        marketplace: MarketplaceClient,
        fraud: FraudHandle,
        metrics: SharedMetrics,
        explorer_base_url: String,
    ) -> Self {
        Self {
            store,
            fingerprints,
            marketplace,
            fraud,
            metrics,
            explorer_base_url,
        }
    }

    /// Creates a transaction under the idempotency protocol.
    ///
    /// The key may arrive in the body or in the `Idempotency-Key` header;
    /// the body wins when both are present. The request hash is computed
    /// with the key stripped, so the same payload hashes identically no
    /// matter how the key travels.
    pub async fn create(
        &self,
        request: CreateTransactionRequest,
        header_key: Option<String>,
    ) -> Result<TransactionResponse, AppError> {
        validate_amount(&request.amount)?;
        if let Some(escrow) = &request.escrow_details {
            validate_required("escrowDetails.conditions", &escrow.conditions)?;
            validate_future_date("escrowDetails.releaseDate", &escrow.release_date)?;
        }

        // A blank key is no key at all; it must not reach the fingerprint
        // store or the row's unique index.
        let key = request
            .idempotency_key
            .clone()
            .or(header_key)
            .filter(|k| !k.trim().is_empty());

        let mut normalized = request;
        normalized.idempotency_key = None;
        let hash = idempotency::request_hash(&normalized)?;

        idempotency::execute(self.fingerprints.as_ref(), key.as_deref(), &hash, || {
            self.persist_new(normalized, key.clone())
        })
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<TransactionResponse, AppError> {
        let transaction = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {id} not found")))?;
        Ok(self.project(&transaction))
    }

    /// Pages transactions matching every supplied predicate. `user_id`
    /// matches the buyer or the seller side.
    pub async fn filter(
        &self,
        params: TransactionFilterParams,
    ) -> Result<PageResponse<TransactionResponse>, AppError> {
        let size = params.size.clamp(1, MAX_PAGE_SIZE);
        let query = TransactionQuery {
            nft_id: params.nft_id,
            user_id: params.user_id,
            status: params.status,
            offset: u64::from(params.page) * u64::from(size),
            limit: size,
        };

        let page = self.store.query(&query).await?;
        let total_pages = page.total.div_ceil(u64::from(size)) as u32;

        Ok(PageResponse {
            content: page.items.iter().map(|t| self.project(t)).collect(),
            page: params.page,
            size,
            total_elements: page.total,
            total_pages,
        })
    }

    /// Overwrites the escrow payload. Legal from `PENDING` (which enters
    /// `ESCROW`) and from `ESCROW` itself; any other state is rejected.
    pub async fn update_escrow(
        &self,
        id: Uuid,
        escrow: EscrowDetailsRequest,
    ) -> Result<TransactionResponse, AppError> {
        validate_required("conditions", &escrow.conditions)?;
        validate_future_date("releaseDate", &escrow.release_date)?;

        let mut transaction = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {id} not found")))?;

        match transaction.status {
            TransactionStatus::Pending => transaction.status = TransactionStatus::Escrow,
            TransactionStatus::Escrow => {}
            other => {
                return Err(AppError::InvalidStateTransition {
                    from: other.to_string(),
                    to: TransactionStatus::Escrow.to_string(),
                })
            }
        }

        let is_disputed = transaction
            .escrow_details
            .as_ref()
            .map(|e| e.is_disputed)
            .unwrap_or(false);
        transaction.escrow_details = Some(EscrowDetails {
            release_date: escrow.release_date,
            conditions: escrow.conditions,
            is_disputed,
        });
        transaction.updated_at = Utc::now();

        let persisted = self
            .store
            .update(&transaction)
            .await
            .map_err(|err| AppError::EscrowUpdate(err.to_string()))?;

        info!(transaction_id = %persisted.id, status = %persisted.status, "escrow details updated");
        Ok(self.project(&persisted))
    }

    /// The actual create operation, run at most once per idempotency key.
    async fn persist_new(
        &self,
        request: CreateTransactionRequest,
        idempotency_key: Option<String>,
    ) -> Result<TransactionResponse, AppError> {
        let owner = self
            .marketplace
            .get_nft_owner(request.nft_id)
            .await
            .map_err(|err| AppError::SellerResolution(err.to_string()))?;

        let CreateTransactionRequest {
            nft_id,
            receiver_id,
            auction_id,
            transaction_hash,
            amount,
            payment_method,
            escrow_details,
            royalty_split,
            fraud_signals,
            idempotency_key: _,
        } = request;

        // The paying party doubles as the buyer reference.
        let mut transaction = Transaction::new(
            receiver_id,
            owner.seller_id,
            receiver_id,
            nft_id,
            auction_id,
            amount,
            payment_method,
            escrow_details.map(|e| EscrowDetails {
                release_date: e.release_date,
                conditions: e.conditions,
                is_disputed: false,
            }),
            royalty_split,
            fraud_signals,
            idempotency_key,
        );
        transaction.transaction_hash = transaction_hash;

        let persisted = self.store.insert(&transaction).await?;

        self.metrics.transactions_created_total.inc();
        info!(
            transaction_id = %persisted.id,
            nft_id = %persisted.nft_id,
            seller_id = %persisted.seller_id,
            "transaction created"
        );

        self.fraud.enqueue(persisted.clone());

        Ok(self.project(&persisted))
    }

    fn project(&self, transaction: &Transaction) -> TransactionResponse {
        TransactionResponse {
            id: transaction.id,
            status: transaction.status,
            created_at: transaction.created_at,
            blockchain_explorer_url: transaction
                .transaction_hash
                .as_ref()
                .map(|hash| format!("{}{}", self.explorer_base_url, hash)),
        }
    }
}

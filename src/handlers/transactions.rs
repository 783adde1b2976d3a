//! REST surface for the transaction lifecycle.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::schemas::{CreateTransactionRequest, EscrowDetailsRequest, TransactionFilterParams};
use crate::AppState;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

pub async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let header_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let response = state.transactions.create(request, header_key).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.transactions.get(id).await?;
    Ok(Json(response))
}

pub async fn filter_transactions(
    State(state): State<AppState>,
    Query(params): Query<TransactionFilterParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.transactions.filter(params).await?;
    Ok(Json(page))
}

pub async fn update_escrow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(escrow): Json<EscrowDetailsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.transactions.update_escrow(id, escrow).await?;
    Ok(Json(response))
}

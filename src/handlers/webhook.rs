//! Inbound chain-event webhook.
//!
//! Rate limiting runs before signature verification; rejected calls must
//! not consume verification cost.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::domain::StarknetTransactionEvent;
use crate::error::AppError;
use crate::rate_limit;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-starknet-signature";

pub async fn receive_event(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(event): Json<StarknetTransactionEvent>,
) -> Result<impl IntoResponse, AppError> {
    let source = rate_limit::source_ip(&headers, peer);
    if !state.rate_limiter.check(source) {
        state.metrics.webhook_rate_limited_total.inc();
        return Err(AppError::RateLimitExceeded);
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    state.webhooks.verify_and_process(signature, &event).await?;
    Ok(StatusCode::ACCEPTED)
}

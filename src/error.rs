use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::OnceLock;
use thiserror::Error;

use crate::ports::StoreError;
use crate::validation::ValidationError;

static PROBLEMS_BASE: OnceLock<String> = OnceLock::new();

/// Installs the base URL used to build problem `type` URIs. First caller wins;
/// later calls are ignored so tests can share a process.
pub fn set_problems_base_url(base: &str) {
    let _ = PROBLEMS_BASE.set(base.trim_end_matches('/').to_string());
}

fn problems_base() -> &'static str {
    PROBLEMS_BASE
        .get()
        .map(String::as_str)
        .unwrap_or("http://localhost:9003/problems")
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("Idempotency key reused with a different request body")]
    IdempotencyConflict,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Illegal status transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Escrow update rejected: {0}")]
    EscrowUpdate(String),

    #[error("Seller resolution failed: {0}")]
    SellerResolution(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Unexpected(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::IdempotencyConflict => StatusCode::CONFLICT,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidStateTransition { .. } => StatusCode::FORBIDDEN,
            AppError::EscrowUpdate(_) => StatusCode::BAD_REQUEST,
            AppError::SellerResolution(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not-found",
            AppError::IdempotencyConflict => "idempotency-conflict",
            AppError::InvalidSignature => "invalid-signature",
            AppError::RateLimitExceeded => "rate-limit",
            AppError::InvalidStateTransition { .. } => "invalid-state-transition",
            AppError::EscrowUpdate(_) => "escrow-update",
            AppError::SellerResolution(_) => "seller-resolution",
            AppError::Store(_) => "storage",
            AppError::Unexpected(_) => "internal-error",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation Failed",
            AppError::NotFound(_) => "Resource Not Found",
            AppError::IdempotencyConflict => "Idempotency Conflict",
            AppError::InvalidSignature => "Invalid Signature",
            AppError::RateLimitExceeded => "Rate Limit Exceeded",
            AppError::InvalidStateTransition { .. } => "Invalid State Transition",
            AppError::EscrowUpdate(_) => "Escrow Update Rejected",
            AppError::SellerResolution(_) => "Seller Resolution Failed",
            AppError::Store(_) => "Storage Error",
            AppError::Unexpected(_) => "Internal Server Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Server-side faults keep their detail in the logs, not the response.
        let detail = match &self {
            AppError::Store(e) => {
                tracing::error!(error = %e, "storage error surfaced to client");
                "A storage error occurred".to_string()
            }
            AppError::Unexpected(e) => {
                tracing::error!(error = %e, "unexpected error surfaced to client");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "type": format!("{}/{}", problems_base(), self.slug()),
            "title": self.title(),
            "status": status.as_u16(),
            "detail": detail,
            "timestamp": Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

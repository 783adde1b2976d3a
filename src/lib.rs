pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod marketplace;
pub mod metrics;
pub mod ports;
pub mod rate_limit;
pub mod schemas;
pub mod services;
pub mod signature;
pub mod validation;

use std::sync::Arc;

use axum::{
    http::Method,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::marketplace::MarketplaceClient;
use crate::metrics::SharedMetrics;
use crate::rate_limit::WebhookRateLimiter;
use crate::services::{TransactionService, WebhookProcessor};

#[derive(Clone)]
pub struct AppState {
    pub transactions: TransactionService,
    pub webhooks: Arc<WebhookProcessor>,
    pub rate_limiter: Arc<WebhookRateLimiter>,
    pub marketplace: MarketplaceClient,
    pub metrics: SharedMetrics,
    /// Absent when the service runs against the in-memory stores.
    pub db: Option<sqlx::PgPool>,
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    let metrics_routes = Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state.metrics.clone());

    Router::new()
        .route(
            "/api/transactions",
            post(handlers::transactions::create_transaction)
                .get(handlers::transactions::filter_transactions),
        )
        .route(
            "/api/transactions/webhook",
            post(handlers::webhook::receive_event),
        )
        .route(
            "/api/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/api/transactions/:id/escrow",
            patch(handlers::transactions::update_escrow),
        )
        .route("/health", get(handlers::health))
        .route("/problems/:slug", get(handlers::problems::describe))
        .with_state(state)
        .merge(metrics_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

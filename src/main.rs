use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use sqlx::migrate::Migrator;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payment_service::adapters::{PostgresFingerprintStore, PostgresTransactionStore};
use payment_service::cli::{self, Cli, Commands, DbCommands};
use payment_service::config::Config;
use payment_service::marketplace::MarketplaceClient;
use payment_service::metrics::Metrics;
use payment_service::ports::{FingerprintStore, TransactionStore};
use payment_service::rate_limit::WebhookRateLimiter;
use payment_service::services::{
    self, FraudService, HttpNotifier, Notifier, TransactionService, WebhookProcessor,
};
use payment_service::{create_app, db, error, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Config) => cli::handle_config_validate(&config),
        Some(Commands::Serve) | None => serve(config).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    error::set_problems_base_url(&config.problems_base_url);

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let store: Arc<dyn TransactionStore> = Arc::new(PostgresTransactionStore::new(pool.clone()));
    let fingerprints: Arc<dyn FingerprintStore> =
        Arc::new(PostgresFingerprintStore::new(pool.clone()));

    let metrics = Arc::new(Metrics::new());

    let marketplace = MarketplaceClient::new(
        config.marketplace_base_url.clone(),
        config.marketplace_timeout_secs,
    );
    tracing::info!(
        "Marketplace client initialized with URL: {}",
        config.marketplace_base_url
    );

    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(
        config.notification_base_url.clone(),
        config.notification_timeout_secs,
    ));

    // Fraud evaluation runs off the request path: one queue worker plus a
    // periodic sweep over pending transactions.
    let fraud_service = FraudService::new(store.clone(), metrics.clone());
    let fraud = services::spawn_worker(fraud_service.clone());
    tokio::spawn(services::run_sweep(
        fraud_service,
        config.fraud_sweep_interval_secs,
    ));

    let transactions = TransactionService::new(
        store.clone(),
        fingerprints,
        marketplace.clone(),
        fraud,
        metrics.clone(),
        config.explorer_base_url.clone(),
    );

    let webhooks = Arc::new(WebhookProcessor::new(
        store,
        notifier,
        metrics.clone(),
        config.webhook_secret.clone(),
    ));

    let rate_limiter = Arc::new(WebhookRateLimiter::new(
        config.webhook_rate_limit,
        config.webhook_rate_window_secs,
    ));

    let state = AppState {
        transactions,
        webhooks,
        rate_limiter,
        marketplace,
        metrics,
        db: Some(pool),
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

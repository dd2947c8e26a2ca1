// Main entry point for the API server

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use extraction::{ai::OpenAI, PostgresStore};
use gmail_client::OAuthConfig;
use server_core::kernel::{
    GmailSourceFactory, PgAccountStore, PostgresJobStore, SyncDefaults, SyncManager,
};
use server_core::server::{build_production_app, AppState, JwtService};
use server_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Email2KG API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Stores run their own migrations
    let store = Arc::new(
        PostgresStore::from_pool(pool.clone())
            .await
            .context("Failed to initialize knowledge store")?,
    );
    let jobs = Arc::new(
        PostgresJobStore::new(pool.clone())
            .await
            .context("Failed to initialize job store")?,
    );
    let accounts = Arc::new(
        PgAccountStore::new(pool.clone())
            .await
            .context("Failed to initialize account store")?,
    );
    tracing::info!("Stores ready");

    // External collaborators
    let mut extractor = OpenAI::new(config.openai_api_key.clone());
    if let Some(model) = &config.openai_model {
        extractor = extractor.with_model(model.clone());
    }
    let oauth = OAuthConfig::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );

    let sync = Arc::new(SyncManager::new(
        jobs,
        accounts.clone(),
        store.clone(),
        Arc::new(extractor),
        Arc::new(GmailSourceFactory::new(oauth)),
        SyncDefaults {
            page_size: config.sync_page_size,
            concurrency: config.sync_concurrency,
            ..SyncDefaults::default()
        },
    ));

    let state = AppState {
        store,
        accounts,
        sync,
        jwt: Arc::new(JwtService::new(&config.jwt_secret, config.jwt_issuer.clone())),
        query_timeout: Duration::from_millis(config.query_timeout_ms),
    };

    let app = build_production_app(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

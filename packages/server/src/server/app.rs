//! Application setup and router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use extraction::KnowledgeStore;

use crate::kernel::accounts::AccountStore;
use crate::kernel::jobs::SyncManager;
use crate::server::auth::{jwt_auth_middleware, JwtService};
use crate::server::routes::{
    cancel_sync_handler, connect_account_handler, dashboard_stats_handler,
    disconnect_account_handler, health_handler, list_entities_handler,
    list_relationships_handler, run_query_handler, start_sync_handler, sync_status_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KnowledgeStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub sync: Arc<SyncManager>,
    pub jwt: Arc<JwtService>,
    pub query_timeout: Duration,
}

/// Build the router: API routes, JWT middleware, shared state.
///
/// Transport-level layers (CORS, tracing, rate limiting) are added by
/// [`build_production_app`]; tests drive this router directly.
pub fn build_app(state: AppState) -> Router {
    let jwt = state.jwt.clone();

    let api = Router::new()
        .route("/emails/sync", post(start_sync_handler))
        .route("/emails/sync/status", get(sync_status_handler))
        .route("/emails/sync/cancel", post(cancel_sync_handler))
        .route("/graph/entities", get(list_entities_handler))
        .route("/graph/relationships", get(list_relationships_handler))
        .route("/graph/query", post(run_query_handler))
        .route("/dashboard/stats", get(dashboard_stats_handler))
        .route("/accounts", post(connect_account_handler))
        .route("/accounts/:id", delete(disconnect_account_handler));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(jwt.clone(), req, next)
        }))
        .layer(Extension(state))
}

/// Production router: adds rate limiting, CORS, and request tracing.
pub fn build_production_app(state: AppState) -> Router {
    // 10 requests per second with bursts of 20, keyed by client IP
    let rate_limit_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .use_headers()
            .finish()
            .expect("rate limiter configuration is valid"),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    build_app(state)
        .layer(GovernorLayer {
            config: rate_limit_config,
        })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

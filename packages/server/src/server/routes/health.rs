use axum::{extract::Extension, http::StatusCode, Json};
use extraction::DocumentStore;
use serde::Serialize;
use uuid::Uuid;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    store: StoreHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Probes the knowledge store with a cheap read. Returns 200 OK when
/// healthy, 503 Service Unavailable otherwise. Unauthenticated.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state.store.count_documents(Uuid::nil()),
    )
    .await
    {
        Ok(Ok(_)) => StoreHealth {
            status: "ok".to_string(),
            error: None,
        },
        Ok(Err(e)) => StoreHealth {
            status: "error".to_string(),
            error: Some(format!("store probe failed: {}", e)),
        },
        Err(_) => StoreHealth {
            status: "error".to_string(),
            error: Some("store probe timeout (>5s)".to_string()),
        },
    };

    let healthy = store_health.status == "ok";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            store: store_health,
        }),
    )
}

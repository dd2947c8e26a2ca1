//! Dashboard statistics.

use axum::extract::Extension;
use axum::Json;
use chrono::{DateTime, Utc};
use extraction::GraphStore;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::kernel::accounts::AccountStore;
use crate::server::app::AppState;
use crate::server::auth::AuthUser;
use crate::server::error::ApiError;

#[derive(Serialize)]
pub struct DashboardStats {
    pub total_emails: u64,
    pub total_entities: u64,
    pub total_relationships: u64,

    /// Entity counts keyed by type name
    pub entity_types: BTreeMap<String, u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,

    /// Status of the most recent sync job ("not_connected" / "idle" when
    /// there is nothing to report)
    pub sync_status: String,
}

/// `GET /api/dashboard/stats`
pub async fn dashboard_stats_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
) -> Result<Json<DashboardStats>, ApiError> {
    let Some(account) = state.accounts.find_by_user(auth.user_id).await? else {
        return Ok(Json(DashboardStats {
            total_emails: 0,
            total_entities: 0,
            total_relationships: 0,
            entity_types: BTreeMap::new(),
            last_sync: None,
            sync_status: "not_connected".to_string(),
        }));
    };

    let stats = state.store.stats(account.id).await?;
    let latest = state.sync.latest(account.id).await?;

    Ok(Json(DashboardStats {
        total_emails: stats.total_documents,
        total_entities: stats.total_entities,
        total_relationships: stats.total_relationships,
        entity_types: stats
            .entity_type_counts
            .into_iter()
            .map(|(ty, count)| (ty.as_str().to_string(), count))
            .collect(),
        last_sync: account.last_synced_at,
        sync_status: latest
            .map(|job| job.status.as_str().to_string())
            .unwrap_or_else(|| "idle".to_string()),
    }))
}

//! Sync endpoints: trigger, status polling, cancellation.

use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::accounts::{Account, AccountStore};
use crate::kernel::jobs::SyncJob;
use crate::server::app::AppState;
use crate::server::auth::AuthUser;
use crate::server::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Lookback window in days; 0 or absent uses the account preference
    #[serde(default)]
    pub days: u32,

    /// Provider label ids restricting the run
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Serialize)]
pub struct SyncStartResponse {
    pub status: String,
    pub job_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub job_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct SyncStatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub status: String,
    pub emails_synced: u64,
    pub failed: u64,
    pub skipped: u64,
    pub messages_listed: u64,
    pub entities_merged: u64,
    pub relationships_merged: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncStatusResponse {
    fn from_job(job: &SyncJob, last_sync: Option<DateTime<Utc>>) -> Self {
        Self {
            job_id: Some(job.id),
            status: job.status.as_str().to_string(),
            emails_synced: job.counters.processed,
            failed: job.counters.failed,
            skipped: job.counters.skipped,
            messages_listed: job.counters.messages_listed,
            entities_merged: job.counters.entities_merged,
            relationships_merged: job.counters.relationships_merged,
            last_sync,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error: job.error.clone(),
        }
    }

    fn idle(last_sync: Option<DateTime<Utc>>) -> Self {
        Self {
            job_id: None,
            status: "idle".to_string(),
            emails_synced: 0,
            failed: 0,
            skipped: 0,
            messages_listed: 0,
            entities_merged: 0,
            relationships_merged: 0,
            last_sync,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub job_id: Uuid,
}

async fn account_for(state: &AppState, auth: &AuthUser) -> Result<Account, ApiError> {
    state
        .accounts
        .find_by_user(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("no connected account".to_string()))
}

/// `POST /api/emails/sync` - start a sync job, returns 202 with the job id.
pub async fn start_sync_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<(StatusCode, Json<SyncStartResponse>), ApiError> {
    let account = account_for(&state, &auth).await?;
    let job_id = state
        .sync
        .start_sync(&account, request.days, request.labels)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncStartResponse {
            status: "started".to_string(),
            job_id,
        }),
    ))
}

/// `GET /api/emails/sync/status[?job_id=…]` - non-blocking poll.
///
/// Without a job id, reports the account's most recent job (or an idle
/// response when the account has never synced).
pub async fn sync_status_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Query(params): Query<StatusParams>,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let account = account_for(&state, &auth).await?;

    let job = match params.job_id {
        Some(job_id) => {
            let job = state.sync.status(job_id).await?;
            if job.account_id != account.id {
                return Err(ApiError::NotFound("sync job not found".to_string()));
            }
            Some(job)
        }
        None => state.sync.latest(account.id).await?,
    };

    Ok(Json(match job {
        Some(job) => SyncStatusResponse::from_job(&job, account.last_synced_at),
        None => SyncStatusResponse::idle(account.last_synced_at),
    }))
}

/// `POST /api/emails/sync/cancel` - request cancellation.
///
/// In-flight documents finish their unit of work; the job then reaches the
/// terminal `cancelled` state, distinct from `failed`.
pub async fn cancel_sync_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let account = account_for(&state, &auth).await?;

    let job = state.sync.status(request.job_id).await?;
    if job.account_id != account.id {
        return Err(ApiError::NotFound("sync job not found".to_string()));
    }

    let job = state.sync.cancel(request.job_id).await?;
    Ok(Json(SyncStatusResponse::from_job(
        &job,
        account.last_synced_at,
    )))
}

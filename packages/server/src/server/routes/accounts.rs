//! Account connect/disconnect.
//!
//! The OAuth consent flow happens with the provider; these endpoints store
//! the resulting refresh token and tear everything down on disconnect.

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::accounts::{Account, AccountStore, Provider};
use crate::server::app::AppState;
use crate::server::auth::AuthUser;
use crate::server::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ConnectAccountRequest {
    pub email: String,

    /// Defaults to gmail
    pub provider: Option<String>,

    /// Refresh token obtained from the provider's OAuth consent flow
    pub refresh_token: String,

    pub sync_limit_days: Option<u32>,
}

/// Account representation; the refresh token is never echoed back.
#[derive(Serialize)]
pub struct AccountView {
    pub id: Uuid,
    pub email: String,
    pub provider: String,
    pub sync_limit_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            provider: account.provider.as_str().to_string(),
            sync_limit_days: account.sync_limit_days,
            last_synced_at: account.last_synced_at,
            created_at: account.created_at,
        }
    }
}

/// `POST /api/accounts` - connect (or replace) the user's mailbox.
pub async fn connect_account_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Json(request): Json<ConnectAccountRequest>,
) -> Result<(StatusCode, Json<AccountView>), ApiError> {
    if request.email.trim().is_empty() {
        return Err(ApiError::BadRequest("email must not be empty".to_string()));
    }
    if request.refresh_token.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "refresh_token must not be empty".to_string(),
        ));
    }

    let provider: Provider = match &request.provider {
        Some(raw) => raw.parse().map_err(|e: String| ApiError::BadRequest(e))?,
        None => Provider::Gmail,
    };

    let account = Account::builder()
        .user_id(auth.user_id)
        .email(request.email)
        .provider(provider)
        .refresh_token(request.refresh_token)
        .sync_limit_days(request.sync_limit_days.unwrap_or(30))
        .build();

    state.accounts.upsert(&account).await?;
    Ok((StatusCode::CREATED, Json(AccountView::from(account))))
}

/// `DELETE /api/accounts/:id` - disconnect and cascade.
///
/// Drops the account's jobs, documents, and graph. Entities referencing the
/// removed documents go with the account scope.
pub async fn disconnect_account_handler(
    auth: AuthUser,
    Extension(state): Extension<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let account = state
        .accounts
        .get(account_id)
        .await?
        .filter(|a| a.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound("account not found".to_string()))?;

    state.sync.disconnect(&account).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Connected mailbox accounts.
//!
//! An account is created when a user connects a mailbox (OAuth consent is
//! handled by the provider; we only store the resulting refresh token) and
//! destroyed on disconnect. Each user has at most one connected account,
//! which is what the sync endpoints resolve against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Mail provider for a connected account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gmail,
    Outlook,
    Imap,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Outlook => "outlook",
            Provider::Imap => "imap",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gmail" => Ok(Provider::Gmail),
            "outlook" => Ok(Provider::Outlook),
            "imap" => Ok(Provider::Imap),
            _ => Err(format!("unknown provider: {}", s)),
        }
    }
}

/// A connected mailbox.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Account {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    pub user_id: Uuid,
    pub email: String,

    #[builder(default = Provider::Gmail)]
    pub provider: Provider,

    /// Opaque OAuth refresh token reference
    pub refresh_token: String,

    /// Default lookback window preference, in days
    #[builder(default = 30)]
    pub sync_limit_days: u32,

    #[builder(default, setter(strip_option))]
    pub last_synced_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// Account persistence errors.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AccountError {
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        AccountError::Storage(err.into())
    }
}

/// Store for connected accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert or replace the user's connected account (one per user).
    async fn upsert(&self, account: &Account) -> Result<(), AccountError>;

    async fn get(&self, id: Uuid) -> Result<Option<Account>, AccountError>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Account>, AccountError>;

    async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AccountError>;

    async fn delete(&self, id: Uuid) -> Result<(), AccountError>;
}

/// In-memory account store for tests and development.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn upsert(&self, account: &Account) -> Result<(), AccountError> {
        let mut accounts = self.accounts.lock().expect("account store lock poisoned");
        // One account per user: replace any existing connection
        accounts.retain(|_, a| a.user_id != account.user_id || a.id == account.id);
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, AccountError> {
        Ok(self
            .accounts
            .lock()
            .expect("account store lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Account>, AccountError> {
        Ok(self
            .accounts
            .lock()
            .expect("account store lock poisoned")
            .values()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AccountError> {
        let mut accounts = self.accounts.lock().expect("account store lock poisoned");
        let account = accounts.get_mut(&id).ok_or(AccountError::NotFound)?;
        account.last_synced_at = Some(at);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AccountError> {
        self.accounts
            .lock()
            .expect("account store lock poisoned")
            .remove(&id)
            .map(|_| ())
            .ok_or(AccountError::NotFound)
    }
}

/// PostgreSQL account store.
pub struct PgAccountStore {
    pool: sqlx::PgPool,
}

impl PgAccountStore {
    /// Create the store and ensure its schema exists.
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, AccountError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL UNIQUE,
                email TEXT NOT NULL,
                provider TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                sync_limit_days INT NOT NULL DEFAULT 30,
                last_synced_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(AccountError::storage)?;
        Ok(Self { pool })
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    user_id: Uuid,
    email: String,
    provider: String,
    refresh_token: String,
    sync_limit_days: i32,
    last_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            user_id: row.user_id,
            email: row.email,
            provider: row.provider.parse().unwrap_or(Provider::Gmail),
            refresh_token: row.refresh_token,
            sync_limit_days: row.sync_limit_days.max(0) as u32,
            last_synced_at: row.last_synced_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn upsert(&self, account: &Account) -> Result<(), AccountError> {
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, user_id, email, provider, refresh_token, sync_limit_days,
                 last_synced_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                email = EXCLUDED.email,
                provider = EXCLUDED.provider,
                refresh_token = EXCLUDED.refresh_token,
                sync_limit_days = EXCLUDED.sync_limit_days
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(&account.email)
        .bind(account.provider.as_str())
        .bind(&account.refresh_token)
        .bind(account.sync_limit_days as i32)
        .bind(account.last_synced_at)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(AccountError::storage)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, AccountError> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AccountError::storage)?;
        Ok(row.map(Account::from))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Account>, AccountError> {
        let row: Option<AccountRow> =
            sqlx::query_as("SELECT * FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(AccountError::storage)?;
        Ok(row.map(Account::from))
    }

    async fn set_last_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AccountError> {
        let result = sqlx::query("UPDATE accounts SET last_synced_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(AccountError::storage)?;
        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AccountError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AccountError::storage)?;
        if result.rows_affected() == 0 {
            return Err(AccountError::NotFound);
        }
        Ok(())
    }
}

//! Job persistence.
//!
//! The store owns the "one non-terminal job per account" invariant:
//! creation checks it atomically (one lock in memory, one transaction plus a
//! partial unique index in Postgres), so two racing start requests produce
//! exactly one job and one `AlreadyRunning`.

use async_trait::async_trait;
use chrono::Utc;
use extraction::SyncCounters;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use super::job::{SyncJob, SyncJobStatus};

/// Job persistence errors.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("a sync job is already running for this account")]
    AlreadyRunning,

    #[error("job not found")]
    NotFound,

    #[error("job is in a terminal state")]
    TerminalState,

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl JobError {
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        JobError::Storage(err.into())
    }
}

fn check_transition(from: SyncJobStatus, to: SyncJobStatus) -> Result<(), JobError> {
    if from.is_terminal() {
        return Err(JobError::TerminalState);
    }
    if !from.can_transition(to) {
        return Err(JobError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    Ok(())
}

fn apply_transition(job: &mut SyncJob, status: SyncJobStatus, error: Option<String>) {
    job.status = status;
    if let Some(error) = error {
        job.error = Some(error);
    }
    match status {
        SyncJobStatus::Running => job.started_at = Some(Utc::now()),
        status if status.is_terminal() => job.finished_at = Some(Utc::now()),
        _ => {}
    }
}

/// Store for sync jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job; fails `AlreadyRunning` when the account already has a
    /// non-terminal job. The check and insert are atomic.
    async fn create(&self, job: &SyncJob) -> Result<(), JobError>;

    async fn get(&self, id: Uuid) -> Result<SyncJob, JobError>;

    /// Most recently created job for the account, if any.
    async fn latest_for_account(&self, account_id: Uuid) -> Result<Option<SyncJob>, JobError>;

    /// Move a job through its lifecycle; rejects non-monotonic transitions
    /// and any change to a terminal job. Returns the updated job.
    async fn transition(
        &self,
        id: Uuid,
        status: SyncJobStatus,
        error: Option<String>,
    ) -> Result<SyncJob, JobError>;

    async fn update_counters(&self, id: Uuid, counters: &SyncCounters) -> Result<(), JobError>;

    /// Remove all jobs for an account (disconnect cascade).
    async fn delete_for_account(&self, account_id: Uuid) -> Result<(), JobError>;
}

/// In-memory job store for tests and development.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, SyncJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &SyncJob) -> Result<(), JobError> {
        // One lock covers the check and the insert, so racing creates
        // serialize here.
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        if jobs
            .values()
            .any(|j| j.account_id == job.account_id && j.status.is_active())
        {
            return Err(JobError::AlreadyRunning);
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<SyncJob, JobError> {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound)
    }

    async fn latest_for_account(&self, account_id: Uuid) -> Result<Option<SyncJob>, JobError> {
        Ok(self
            .jobs
            .lock()
            .expect("job store lock poisoned")
            .values()
            .filter(|j| j.account_id == account_id)
            .max_by_key(|j| (j.created_at, j.id))
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        status: SyncJobStatus,
        error: Option<String>,
    ) -> Result<SyncJob, JobError> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound)?;
        check_transition(job.status, status)?;
        apply_transition(job, status, error);
        Ok(job.clone())
    }

    async fn update_counters(&self, id: Uuid, counters: &SyncCounters) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound)?;
        job.counters = *counters;
        Ok(())
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<(), JobError> {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .retain(|_, j| j.account_id != account_id);
        Ok(())
    }
}

/// PostgreSQL job store.
///
/// A partial unique index on active jobs backs the invariant even across
/// horizontally scaled workers.
pub struct PostgresJobStore {
    pool: sqlx::PgPool,
}

impl PostgresJobStore {
    /// Create the store and ensure its schema exists.
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, JobError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_jobs (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL,
                window_days INT NOT NULL,
                label_filter JSONB NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                counters JSONB NOT NULL DEFAULT '{}',
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                started_at TIMESTAMPTZ,
                finished_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(JobError::storage)?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS one_active_job_per_account \
             ON sync_jobs(account_id) \
             WHERE status IN ('pending', 'running', 'cancelling')",
        )
        .execute(&pool)
        .await
        .map_err(JobError::storage)?;

        Ok(Self { pool })
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<SyncJob, JobError> {
        let status: String = row.get("status");
        let label_filter: serde_json::Value = row.get("label_filter");
        let counters: serde_json::Value = row.get("counters");
        let window_days: i32 = row.get("window_days");

        Ok(SyncJob {
            id: row.get("id"),
            account_id: row.get("account_id"),
            window_days: window_days.max(0) as u32,
            label_filter: serde_json::from_value(label_filter).map_err(JobError::storage)?,
            status: status.parse().map_err(JobError::storage)?,
            counters: serde_json::from_value(counters).unwrap_or_default(),
            error: row.get("error"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
        })
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn create(&self, job: &SyncJob) -> Result<(), JobError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_jobs
                (id, account_id, window_days, label_filter, status, counters,
                 error, created_at, started_at, finished_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            WHERE NOT EXISTS (
                SELECT 1 FROM sync_jobs
                WHERE account_id = $2
                  AND status IN ('pending', 'running', 'cancelling')
            )
            "#,
        )
        .bind(job.id)
        .bind(job.account_id)
        .bind(job.window_days as i32)
        .bind(serde_json::to_value(&job.label_filter).map_err(JobError::storage)?)
        .bind(job.status.as_str())
        .bind(serde_json::to_value(job.counters).map_err(JobError::storage)?)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            // The partial unique index catches the insert/insert race
            if let sqlx::Error::Database(db) = &err {
                if db.is_unique_violation() {
                    return JobError::AlreadyRunning;
                }
            }
            JobError::storage(err)
        })?;

        if result.rows_affected() == 0 {
            return Err(JobError::AlreadyRunning);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<SyncJob, JobError> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(JobError::storage)?
            .ok_or(JobError::NotFound)?;
        Self::row_to_job(&row)
    }

    async fn latest_for_account(&self, account_id: Uuid) -> Result<Option<SyncJob>, JobError> {
        let row = sqlx::query(
            "SELECT * FROM sync_jobs WHERE account_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(JobError::storage)?;
        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        status: SyncJobStatus,
        error: Option<String>,
    ) -> Result<SyncJob, JobError> {
        let mut tx = self.pool.begin().await.map_err(JobError::storage)?;

        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(JobError::storage)?
            .ok_or(JobError::NotFound)?;
        let mut job = Self::row_to_job(&row)?;

        check_transition(job.status, status)?;
        apply_transition(&mut job, status, error);

        sqlx::query(
            "UPDATE sync_jobs SET status = $2, error = $3, started_at = $4, \
             finished_at = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&mut *tx)
        .await
        .map_err(JobError::storage)?;

        tx.commit().await.map_err(JobError::storage)?;
        Ok(job)
    }

    async fn update_counters(&self, id: Uuid, counters: &SyncCounters) -> Result<(), JobError> {
        let result = sqlx::query("UPDATE sync_jobs SET counters = $2 WHERE id = $1")
            .bind(id)
            .bind(serde_json::to_value(counters).map_err(JobError::storage)?)
            .execute(&self.pool)
            .await
            .map_err(JobError::storage)?;
        if result.rows_affected() == 0 {
            return Err(JobError::NotFound);
        }
        Ok(())
    }

    async fn delete_for_account(&self, account_id: Uuid) -> Result<(), JobError> {
        sqlx::query("DELETE FROM sync_jobs WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(JobError::storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn job_for(account: Uuid) -> SyncJob {
        SyncJob::builder().account_id(account).build()
    }

    #[tokio::test]
    async fn second_active_job_is_rejected() {
        let store = MemoryJobStore::new();
        let account = Uuid::now_v7();

        store.create(&job_for(account)).await.unwrap();
        let err = store.create(&job_for(account)).await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyRunning));
    }

    #[tokio::test]
    async fn terminal_job_unblocks_the_account() {
        let store = MemoryJobStore::new();
        let account = Uuid::now_v7();

        let first = job_for(account);
        store.create(&first).await.unwrap();
        store
            .transition(first.id, SyncJobStatus::Running, None)
            .await
            .unwrap();
        store
            .transition(first.id, SyncJobStatus::Completed, None)
            .await
            .unwrap();

        store.create(&job_for(account)).await.unwrap();
    }

    #[tokio::test]
    async fn racing_creates_yield_exactly_one_job() {
        let store = Arc::new(MemoryJobStore::new());
        let account = Uuid::now_v7();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(&job_for(account)).await
            }));
        }

        let mut created = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => created += 1,
                Err(JobError::AlreadyRunning) => rejected += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(rejected, 7);
    }

    #[tokio::test]
    async fn terminal_jobs_are_immutable() {
        let store = MemoryJobStore::new();
        let job = job_for(Uuid::now_v7());
        store.create(&job).await.unwrap();
        store
            .transition(job.id, SyncJobStatus::Running, None)
            .await
            .unwrap();
        store
            .transition(job.id, SyncJobStatus::Failed, Some("boom".into()))
            .await
            .unwrap();

        let err = store
            .transition(job.id, SyncJobStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::TerminalState));

        let stored = store.get(job.id).await.unwrap();
        assert_eq!(stored.status, SyncJobStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("boom"));
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn latest_returns_newest_job() {
        let store = MemoryJobStore::new();
        let account = Uuid::now_v7();

        let first = job_for(account);
        store.create(&first).await.unwrap();
        store
            .transition(first.id, SyncJobStatus::Running, None)
            .await
            .unwrap();
        store
            .transition(first.id, SyncJobStatus::Completed, None)
            .await
            .unwrap();

        let second = job_for(account);
        store.create(&second).await.unwrap();

        let latest = store.latest_for_account(account).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }
}

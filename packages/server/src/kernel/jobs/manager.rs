//! Sync orchestration.
//!
//! `SyncManager` owns job lifecycle: it checks credentials before a job is
//! created, enforces the one-active-job invariant through the job store,
//! runs the pipeline on a background task with a cancellation token, and
//! mirrors pipeline progress into the job record for status polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use extraction::{
    run_sync, ExtractionError, Extractor, FetchWindow, GraphStore, KnowledgeStore, MailSource,
    SyncConfig, SyncCounters, SyncObserver,
};
use gmail_client::OAuthConfig;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::job::{SyncJob, SyncJobStatus};
use super::store::{JobError, JobStore};
use crate::kernel::accounts::{Account, AccountStore, Provider};

/// Orchestration errors surfaced to the API layer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync job is already running for this account")]
    AlreadyRunning,

    #[error("authorization expired: {0}")]
    AuthExpired(String),

    #[error("job not found")]
    NotFound,

    #[error("job already finished")]
    NotCancellable,

    #[error("sync error: {0}")]
    Internal(String),
}

impl From<JobError> for SyncError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::AlreadyRunning => SyncError::AlreadyRunning,
            JobError::NotFound => SyncError::NotFound,
            JobError::TerminalState => SyncError::NotCancellable,
            other => SyncError::Internal(other.to_string()),
        }
    }
}

/// Builds a mail source for an account, refreshing credentials.
///
/// Fails with [`ExtractionError::AuthExpired`] when the stored token can no
/// longer be refreshed, which `start_sync` surfaces before any job exists.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn create_source(&self, account: &Account) -> extraction::Result<Box<dyn MailSource>>;
}

/// Gmail-backed source factory.
pub struct GmailSourceFactory {
    oauth: OAuthConfig,
}

impl GmailSourceFactory {
    pub fn new(oauth: OAuthConfig) -> Self {
        Self { oauth }
    }
}

#[async_trait]
impl SourceFactory for GmailSourceFactory {
    async fn create_source(&self, account: &Account) -> extraction::Result<Box<dyn MailSource>> {
        match account.provider {
            Provider::Gmail => {
                let source =
                    extraction::GmailSource::connect(&self.oauth, &account.refresh_token).await?;
                Ok(Box::new(source))
            }
            other => Err(ExtractionError::Config(format!(
                "provider not supported yet: {}",
                other.as_str()
            ))),
        }
    }
}

// Mirrors pipeline counters into the job record after every document.
struct JobProgressObserver {
    job_id: Uuid,
    jobs: Arc<dyn JobStore>,
}

#[async_trait]
impl SyncObserver for JobProgressObserver {
    async fn on_progress(&self, counters: &SyncCounters) {
        if let Err(err) = self.jobs.update_counters(self.job_id, counters).await {
            warn!(job_id = %self.job_id, error = %err, "failed to persist progress");
        }
    }
}

/// Pipeline tuning shared by all jobs.
#[derive(Debug, Clone)]
pub struct SyncDefaults {
    pub page_size: u32,
    pub concurrency: usize,
    pub max_extract_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            page_size: 100,
            concurrency: 4,
            max_extract_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Orchestrates sync jobs: one background task per job, one non-terminal
/// job per account.
pub struct SyncManager {
    jobs: Arc<dyn JobStore>,
    accounts: Arc<dyn AccountStore>,
    store: Arc<dyn KnowledgeStore>,
    extractor: Arc<dyn Extractor>,
    sources: Arc<dyn SourceFactory>,
    defaults: SyncDefaults,
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl SyncManager {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        accounts: Arc<dyn AccountStore>,
        store: Arc<dyn KnowledgeStore>,
        extractor: Arc<dyn Extractor>,
        sources: Arc<dyn SourceFactory>,
        defaults: SyncDefaults,
    ) -> Self {
        Self {
            jobs,
            accounts,
            store,
            extractor,
            sources,
            defaults,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a sync for the account; returns the job id immediately.
    ///
    /// `days == 0` falls back to the account's sync window preference.
    pub async fn start_sync(
        &self,
        account: &Account,
        days: u32,
        labels: Vec<String>,
    ) -> Result<Uuid, SyncError> {
        // Credentials are checked before a job exists, so auth failures
        // never leave a failed job behind.
        let source = self
            .sources
            .create_source(account)
            .await
            .map_err(|err| match err {
                ExtractionError::AuthExpired(reason) => SyncError::AuthExpired(reason),
                other => SyncError::Internal(other.to_string()),
            })?;

        let days = if days == 0 { account.sync_limit_days } else { days };
        let job = SyncJob::builder()
            .account_id(account.id)
            .window_days(days)
            .label_filter(labels.clone())
            .build();
        self.jobs.create(&job).await?;
        let job_id = job.id;

        self.jobs
            .transition(job_id, SyncJobStatus::Running, None)
            .await?;

        let cancel = CancellationToken::new();
        self.active
            .lock()
            .expect("active job map poisoned")
            .insert(job_id, cancel.clone());

        let config = SyncConfig::new(days)
            .with_window(FetchWindow::days(days).with_labels(labels))
            .with_page_size(self.defaults.page_size)
            .with_concurrency(self.defaults.concurrency)
            .with_max_extract_attempts(self.defaults.max_extract_attempts)
            .with_retry_backoff(self.defaults.retry_backoff);

        let jobs = self.jobs.clone();
        let accounts = self.accounts.clone();
        let store = self.store.clone();
        let extractor = self.extractor.clone();
        let active = self.active.clone();
        let account_id = account.id;

        tokio::spawn(async move {
            let observer = JobProgressObserver {
                job_id,
                jobs: jobs.clone(),
            };

            let result = run_sync(
                account_id,
                &config,
                source.as_ref(),
                extractor.as_ref(),
                store.as_ref(),
                &observer,
                &cancel,
            )
            .await;

            match result {
                Ok(counters) => {
                    if let Err(err) = jobs.update_counters(job_id, &counters).await {
                        warn!(job_id = %job_id, error = %err, "failed to persist final counters");
                    }
                    if let Err(err) = jobs
                        .transition(job_id, SyncJobStatus::Completed, None)
                        .await
                    {
                        warn!(job_id = %job_id, error = %err, "failed to complete job");
                    }
                    if let Err(err) = accounts.set_last_synced(account_id, Utc::now()).await {
                        warn!(account_id = %account_id, error = %err, "failed to stamp last sync");
                    }
                    info!(
                        job_id = %job_id,
                        processed = counters.processed,
                        failed = counters.failed,
                        "sync job completed"
                    );
                }
                Err(ExtractionError::Cancelled) => {
                    if let Err(err) = jobs
                        .transition(job_id, SyncJobStatus::Cancelled, None)
                        .await
                    {
                        warn!(job_id = %job_id, error = %err, "failed to mark job cancelled");
                    }
                    info!(job_id = %job_id, "sync job cancelled");
                }
                Err(fault) => {
                    if let Err(err) = jobs
                        .transition(job_id, SyncJobStatus::Failed, Some(fault.to_string()))
                        .await
                    {
                        warn!(job_id = %job_id, error = %err, "failed to mark job failed");
                    }
                    warn!(job_id = %job_id, error = %fault, "sync job failed");
                }
            }

            active
                .lock()
                .expect("active job map poisoned")
                .remove(&job_id);
        });

        Ok(job_id)
    }

    /// Non-blocking job status poll.
    pub async fn status(&self, job_id: Uuid) -> Result<SyncJob, SyncError> {
        Ok(self.jobs.get(job_id).await?)
    }

    /// Latest job for the account, if any.
    pub async fn latest(&self, account_id: Uuid) -> Result<Option<SyncJob>, SyncError> {
        Ok(self.jobs.latest_for_account(account_id).await?)
    }

    /// Request cancellation; in-flight documents finish their unit of work.
    pub async fn cancel(&self, job_id: Uuid) -> Result<SyncJob, SyncError> {
        let job = self.jobs.get(job_id).await?;
        if job.status.is_terminal() {
            return Err(SyncError::NotCancellable);
        }

        let token = self
            .active
            .lock()
            .expect("active job map poisoned")
            .get(&job_id)
            .cloned();

        match token {
            Some(token) => {
                let job = if job.status == SyncJobStatus::Cancelling {
                    job
                } else {
                    self.jobs
                        .transition(job_id, SyncJobStatus::Cancelling, None)
                        .await?
                };
                token.cancel();
                Ok(job)
            }
            None => {
                // No live task (e.g. after a restart): finalize directly
                if job.status != SyncJobStatus::Cancelling {
                    self.jobs
                        .transition(job_id, SyncJobStatus::Cancelling, None)
                        .await?;
                }
                Ok(self
                    .jobs
                    .transition(job_id, SyncJobStatus::Cancelled, None)
                    .await?)
            }
        }
    }

    /// Disconnect cascade: stop any active job, then drop the account's
    /// jobs, documents, and graph.
    pub async fn disconnect(&self, account: &Account) -> Result<(), SyncError> {
        if let Some(latest) = self.jobs.latest_for_account(account.id).await? {
            if latest.status.is_active() {
                if let Err(err) = self.cancel(latest.id).await {
                    warn!(job_id = %latest.id, error = %err, "failed to cancel job on disconnect");
                }
            }
        }

        self.jobs.delete_for_account(account.id).await?;
        self.store
            .delete_account_data(account.id)
            .await
            .map_err(|err| SyncError::Internal(err.to_string()))?;
        self.accounts
            .delete(account.id)
            .await
            .map_err(|err| SyncError::Internal(err.to_string()))?;

        info!(account_id = %account.id, "account disconnected");
        Ok(())
    }
}

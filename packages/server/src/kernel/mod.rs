//! Server kernel: connected accounts and sync orchestration.

pub mod accounts;
pub mod jobs;

pub use accounts::{
    Account, AccountError, AccountStore, MemoryAccountStore, PgAccountStore, Provider,
};
pub use jobs::{
    GmailSourceFactory, JobError, JobStore, MemoryJobStore, PostgresJobStore, SourceFactory,
    SyncDefaults, SyncError, SyncJob, SyncJobStatus, SyncManager,
};

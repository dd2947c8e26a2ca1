//! Sync job orchestration: model, persistence, manager.

pub mod job;
pub mod manager;
pub mod store;

pub use job::{SyncJob, SyncJobStatus};
pub use manager::{GmailSourceFactory, SourceFactory, SyncDefaults, SyncError, SyncManager};
pub use store::{JobError, JobStore, MemoryJobStore, PostgresJobStore};

//! SyncJob model.

use chrono::{DateTime, Utc};
use extraction::SyncCounters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Lifecycle of a sync job.
///
/// `pending → running → completed | failed`, with `cancelling → cancelled`
/// branching off at any non-terminal point. Transitions are monotonic and
/// terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    #[default]
    Pending,
    Running,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl SyncJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "pending",
            SyncJobStatus::Running => "running",
            SyncJobStatus::Cancelling => "cancelling",
            SyncJobStatus::Completed => "completed",
            SyncJobStatus::Failed => "failed",
            SyncJobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this state can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncJobStatus::Completed | SyncJobStatus::Failed | SyncJobStatus::Cancelled
        )
    }

    /// Whether a job in this state blocks new jobs for the account.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving to `next` preserves monotonicity.
    pub fn can_transition(&self, next: SyncJobStatus) -> bool {
        use SyncJobStatus::*;
        match self {
            Pending => matches!(next, Running | Cancelling | Failed),
            Running => matches!(next, Completed | Failed | Cancelling | Cancelled),
            // A cancelling job may still finish its last unit of work
            Cancelling => matches!(next, Cancelled | Completed | Failed),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl std::str::FromStr for SyncJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncJobStatus::Pending),
            "running" => Ok(SyncJobStatus::Running),
            "cancelling" => Ok(SyncJobStatus::Cancelling),
            "completed" => Ok(SyncJobStatus::Completed),
            "failed" => Ok(SyncJobStatus::Failed),
            "cancelled" => Ok(SyncJobStatus::Cancelled),
            _ => Err(format!("unknown job status: {}", s)),
        }
    }
}

/// One sync run for an account.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct SyncJob {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    pub account_id: Uuid,

    /// Requested lookback window in days
    #[builder(default = 30)]
    pub window_days: u32,

    /// Provider label ids restricting the run
    #[builder(default)]
    pub label_filter: Vec<String>,

    #[builder(default)]
    pub status: SyncJobStatus,

    #[builder(default)]
    pub counters: SyncCounters,

    /// Account-level fault detail for failed jobs
    #[builder(default, setter(strip_option))]
    pub error: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,

    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_no_transition() {
        for terminal in [
            SyncJobStatus::Completed,
            SyncJobStatus::Failed,
            SyncJobStatus::Cancelled,
        ] {
            for next in [
                SyncJobStatus::Pending,
                SyncJobStatus::Running,
                SyncJobStatus::Cancelling,
                SyncJobStatus::Completed,
                SyncJobStatus::Failed,
                SyncJobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn cancel_path_is_distinct_from_failure() {
        assert!(SyncJobStatus::Running.can_transition(SyncJobStatus::Cancelling));
        assert!(SyncJobStatus::Cancelling.can_transition(SyncJobStatus::Cancelled));
        assert!(!SyncJobStatus::Cancelled.can_transition(SyncJobStatus::Failed));
    }

    #[test]
    fn builder_defaults() {
        let job = SyncJob::builder().account_id(Uuid::now_v7()).build();
        assert_eq!(job.status, SyncJobStatus::Pending);
        assert_eq!(job.window_days, 30);
        assert!(job.error.is_none());
        assert!(job.status.is_active());
    }
}

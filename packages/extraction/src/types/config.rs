//! Configuration types for the sync pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hard cap on the provider list page size.
pub const MAX_LIST_PAGE_SIZE: u32 = 500;

/// What slice of the mailbox a sync run covers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchWindow {
    /// Lookback window in days (0 = no time bound)
    pub days: u32,

    /// Restrict to messages carrying all of these provider label ids
    pub label_ids: Vec<String>,
}

impl FetchWindow {
    /// Create a lookback window of `days` days.
    pub fn days(days: u32) -> Self {
        Self {
            days,
            label_ids: Vec::new(),
        }
    }

    /// Restrict to the given labels.
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.label_ids = labels.into_iter().map(|l| l.into()).collect();
        self
    }
}

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Mailbox slice to cover
    pub window: FetchWindow,

    /// Provider list page size (clamped to [`MAX_LIST_PAGE_SIZE`])
    pub page_size: u32,

    /// Documents in flight at once (fetch/extract overlap)
    pub concurrency: usize,

    /// Attempts per document when the extraction service is unavailable
    pub max_extract_attempts: u32,

    /// Base delay for exponential backoff between extraction attempts
    pub retry_backoff: Duration,

    /// Re-fetch and re-process messages already stored
    pub force_refetch: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window: FetchWindow::days(30),
            page_size: 100,
            concurrency: 4,
            max_extract_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            force_refetch: false,
        }
    }
}

impl SyncConfig {
    /// Create a config covering the last `days` days.
    pub fn new(days: u32) -> Self {
        Self {
            window: FetchWindow::days(days),
            ..Default::default()
        }
    }

    /// Set the fetch window.
    pub fn with_window(mut self, window: FetchWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the list page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the worker pool size.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the extraction retry budget.
    pub fn with_max_extract_attempts(mut self, attempts: u32) -> Self {
        self.max_extract_attempts = attempts;
        self
    }

    /// Set the backoff base delay.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Force re-fetch of already stored messages.
    pub fn force_refetch(mut self) -> Self {
        self.force_refetch = true;
        self
    }

    /// Page size after clamping to the provider cap.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_LIST_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(SyncConfig::new(7).with_page_size(0).effective_page_size(), 1);
        assert_eq!(
            SyncConfig::new(7).with_page_size(9999).effective_page_size(),
            MAX_LIST_PAGE_SIZE
        );
        assert_eq!(
            SyncConfig::new(7).with_page_size(50).effective_page_size(),
            50
        );
    }
}

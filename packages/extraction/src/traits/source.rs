//! MailSource trait for pluggable message ingestion.
//!
//! A mail source hides the provider behind two operations: paged id listing
//! for a window, and full message fetch. Implementations wrap provider APIs
//! (Gmail today) or serve fixtures in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::config::FetchWindow;
use crate::types::document::RawMessage;

/// One page of provider message ids.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    /// Provider message ids on this page
    pub ids: Vec<String>,

    /// Continuation token; `None` means this was the last page
    pub next_page_token: Option<String>,

    /// Provider-side estimate of the total match count
    pub estimate: u64,
}

impl MessagePage {
    /// Create a final page from a list of ids.
    pub fn of(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let ids: Vec<String> = ids.into_iter().map(|id| id.into()).collect();
        Self {
            estimate: ids.len() as u64,
            ids,
            next_page_token: None,
        }
    }

    /// Set the continuation token.
    pub fn with_next_page(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }
}

/// Source of raw messages for the sync pipeline.
///
/// Errors signal scope: [`AuthExpired`](crate::error::ExtractionError::AuthExpired)
/// and [`Provider`](crate::error::ExtractionError::Provider) abort the job,
/// [`MessageUnavailable`](crate::error::ExtractionError::MessageUnavailable)
/// skips the one document.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// List message ids for the window, one page at a time.
    async fn list_messages(
        &self,
        window: &FetchWindow,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    /// Fetch one message with decoded parts.
    async fn fetch_message(&self, provider_message_id: &str) -> Result<RawMessage>;
}

// A shared source is a source; lets callers hand out Arc-backed sources.
#[async_trait]
impl<T: MailSource + ?Sized> MailSource for std::sync::Arc<T> {
    async fn list_messages(
        &self,
        window: &FetchWindow,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        (**self).list_messages(window, page_size, page_token).await
    }

    async fn fetch_message(&self, provider_message_id: &str) -> Result<RawMessage> {
        (**self).fetch_message(provider_message_id).await
    }
}

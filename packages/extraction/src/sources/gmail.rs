//! Gmail implementation of the MailSource trait.
//!
//! Thin adapter over [`gmail_client`]: builds the provider search query from
//! the fetch window, decodes MIME parts into [`RawMessage`]s, and maps
//! provider errors onto the pipeline's failure scopes.

use async_trait::async_trait;
use gmail_client::{GmailClient, GmailError, ListMessagesRequest, OAuthConfig};
use tracing::debug;

use crate::error::{ExtractionError, Result};
use crate::traits::source::{MailSource, MessagePage};
use crate::types::config::FetchWindow;
use crate::types::document::{RawMessage, RawPart};

/// Gmail-backed mail source.
pub struct GmailSource {
    client: GmailClient,
}

impl GmailSource {
    /// Wrap an already-authenticated client.
    pub fn new(client: GmailClient) -> Self {
        Self { client }
    }

    /// Refresh the stored token and build a source.
    ///
    /// Surfaces [`ExtractionError::AuthExpired`] when the refresh token is no
    /// longer valid, before any job is created.
    pub async fn connect(oauth: &OAuthConfig, refresh_token: &str) -> Result<Self> {
        let client = GmailClient::connect(oauth, refresh_token)
            .await
            .map_err(map_account_error)?;
        Ok(Self::new(client))
    }

    fn search_query(window: &FetchWindow) -> Option<String> {
        (window.days > 0).then(|| format!("newer_than:{}d", window.days))
    }
}

#[async_trait]
impl MailSource for GmailSource {
    async fn list_messages(
        &self,
        window: &FetchWindow,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut request = ListMessagesRequest::new()
            .with_labels(window.label_ids.iter().cloned())
            .with_max_results(page_size);
        if let Some(q) = Self::search_query(window) {
            request = request.with_query(q);
        }
        if let Some(token) = page_token {
            request = request.with_page_token(token);
        }

        let list = self
            .client
            .list_messages(request)
            .await
            .map_err(map_account_error)?;

        Ok(MessagePage {
            ids: list.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: list.next_page_token,
            estimate: list.result_size_estimate,
        })
    }

    async fn fetch_message(&self, provider_message_id: &str) -> Result<RawMessage> {
        let message = self
            .client
            .get_message(provider_message_id)
            .await
            .map_err(|err| map_fetch_error(provider_message_id, err))?;

        let mut raw = RawMessage::new(&message.id);
        raw.thread_id = Some(message.thread_id.clone());
        raw.internal_date_ms = message.internal_date_ms();
        raw.label_ids = message.label_ids.clone();
        raw.snippet = message.snippet.clone();
        raw.size_estimate = message.size_estimate;
        raw.headers = message
            .payload
            .headers
            .iter()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect();

        for part in message.payload.walk() {
            // Container nodes carry no content of their own
            if part.mime_type.starts_with("multipart/") {
                continue;
            }
            let text = if part.is_attachment() {
                None
            } else {
                part.body
                    .decoded_text()
                    .map_err(|err| map_fetch_error(provider_message_id, err))?
            };
            raw.parts.push(RawPart {
                mime_type: part.mime_type.clone(),
                filename: part.filename.clone(),
                text,
                attachment_id: part.body.attachment_id.clone(),
                size: part.body.size,
            });
        }

        debug!(
            id = %raw.provider_message_id,
            parts = raw.parts.len(),
            "fetched message"
        );
        Ok(raw)
    }
}

// Listing/auth failures stop the whole job.
fn map_account_error(err: GmailError) -> ExtractionError {
    match err {
        GmailError::AuthExpired(reason) => ExtractionError::AuthExpired(reason),
        other => ExtractionError::Provider(other.to_string()),
    }
}

// A single message failing to fetch only fails that document, unless the
// account itself is the problem.
fn map_fetch_error(provider_message_id: &str, err: GmailError) -> ExtractionError {
    match err {
        GmailError::AuthExpired(reason) => ExtractionError::AuthExpired(reason),
        GmailError::RateLimited => ExtractionError::Provider("rate limited".to_string()),
        _ => ExtractionError::MessageUnavailable {
            provider_message_id: provider_message_id.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_encodes_the_window() {
        assert_eq!(
            GmailSource::search_query(&FetchWindow::days(7)).as_deref(),
            Some("newer_than:7d")
        );
        assert_eq!(GmailSource::search_query(&FetchWindow::days(0)), None);
    }

    #[test]
    fn auth_errors_are_account_level() {
        let err = map_account_error(GmailError::AuthExpired("revoked".into()));
        assert!(matches!(err, ExtractionError::AuthExpired(_)));
        assert!(!err.is_document_scoped());
    }

    #[test]
    fn missing_messages_are_document_scoped() {
        let err = map_fetch_error(
            "m-1",
            GmailError::Api {
                status: 404,
                message: "not found".into(),
            },
        );
        assert!(err.is_document_scoped());
    }
}

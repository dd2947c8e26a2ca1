//! Pure Gmail REST API client
//!
//! A clean, minimal client for the Gmail API v1 with no domain-specific logic.
//! Supports message listing with search queries and labels, full message
//! retrieval (MIME tree included), profile lookup, and OAuth token refresh.
//!
//! # Example
//!
//! ```rust,ignore
//! use gmail_client::{GmailClient, ListMessagesRequest, OAuthConfig};
//!
//! let oauth = OAuthConfig::from_env()?;
//! let client = GmailClient::connect(&oauth, stored_refresh_token).await?;
//!
//! // First page of last week's inbox
//! let page = client
//!     .list_messages(
//!         ListMessagesRequest::new()
//!             .with_query("newer_than:7d")
//!             .with_labels(["INBOX"])
//!             .with_max_results(100),
//!     )
//!     .await?;
//!
//! for msg_ref in &page.messages {
//!     let message = client.get_message(&msg_ref.id).await?;
//!     println!("{}: {}", message.id, message.snippet);
//! }
//! ```

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{exchange_refresh_token, AccessToken, OAuthConfig, DEFAULT_TOKEN_URL};
pub use error::{GmailError, Result};
pub use types::*;

use reqwest::Client;
use tracing::{debug, warn};

/// Default Gmail API base URL (paths are relative to the authenticated user).
pub const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Pure Gmail API client bound to one access token.
#[derive(Clone)]
pub struct GmailClient {
    http_client: Client,
    access_token: String,
    base_url: String,
}

impl GmailClient {
    /// Create a client from an existing access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            access_token: access_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Refresh the given token and build a client from the result.
    ///
    /// Fails with [`GmailError::AuthExpired`] when the refresh token has been
    /// revoked or aged out.
    pub async fn connect(oauth: &OAuthConfig, refresh_token: &str) -> Result<Self> {
        let http_client = Client::new();
        let token = auth::exchange_refresh_token(&http_client, oauth, refresh_token).await?;
        Ok(Self {
            http_client,
            access_token: token.token,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Set a custom base URL (for proxies and tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List message ids matching a query, one page at a time.
    pub async fn list_messages(&self, request: ListMessagesRequest) -> Result<MessageList> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(q) = &request.q {
            query.push(("q", q.clone()));
        }
        for label in &request.label_ids {
            query.push(("labelIds", label.clone()));
        }
        if let Some(max) = request.max_results {
            query.push(("maxResults", max.to_string()));
        }
        if let Some(token) = &request.page_token {
            query.push(("pageToken", token.clone()));
        }

        let list: MessageList = self
            .get_json(&format!("{}/messages", self.base_url), &query)
            .await?;

        debug!(
            count = list.messages.len(),
            has_next = list.next_page_token.is_some(),
            "listed messages"
        );
        Ok(list)
    }

    /// Fetch one message with the full MIME tree.
    pub async fn get_message(&self, id: &str) -> Result<Message> {
        self.get_json(
            &format!("{}/messages/{}", self.base_url, id),
            &[("format", "full".to_string())],
        )
        .await
    }

    /// Fetch the authenticated user's profile.
    pub async fn get_profile(&self) -> Result<Profile> {
        self.get_json(&format!("{}/profile", self.base_url), &[])
            .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, url = %url, "Gmail request failed");
                GmailError::Network(e.to_string())
            })?;

        let status = response.status();
        match status.as_u16() {
            200..=299 => {}
            401 => {
                return Err(GmailError::AuthExpired(
                    "access token rejected by Gmail API".into(),
                ))
            }
            429 => return Err(GmailError::RateLimited),
            code => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = code, body = %body, "Gmail API error");
                return Err(GmailError::Api {
                    status: code,
                    message: body,
                });
            }
        }

        response
            .json()
            .await
            .map_err(|e| GmailError::Parse(e.to_string()))
    }
}

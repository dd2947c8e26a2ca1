//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction
//! library without a mail provider or LLM on the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ExtractionError, Result};
use crate::traits::extractor::{ExtractionResponse, Extractor, RawEntity, RawRelationship};
use crate::traits::source::{MailSource, MessagePage};
use crate::types::config::FetchWindow;
use crate::types::document::{Document, RawMessage, RawPart};

/// How a mock operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Per-document: the message cannot be fetched
    MessageUnavailable,
    /// Account-level: credentials are no longer valid
    AuthExpired,
    /// Account-level: provider outage
    Provider,
}

impl MockFailure {
    fn into_error(self, id: &str) -> ExtractionError {
        match self {
            MockFailure::MessageUnavailable => ExtractionError::MessageUnavailable {
                provider_message_id: id.to_string(),
            },
            MockFailure::AuthExpired => ExtractionError::AuthExpired("mock auth expired".into()),
            MockFailure::Provider => ExtractionError::Provider("mock provider outage".into()),
        }
    }
}

/// Record of a call made to a mock source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockSourceCall {
    List { page_token: Option<String> },
    Fetch { id: String },
}

/// A mock mail source serving fixtures from memory.
///
/// Messages list in insertion order and page by the requested page size.
#[derive(Default)]
pub struct MockMailSource {
    messages: RwLock<Vec<RawMessage>>,
    fetch_failures: RwLock<HashMap<String, MockFailure>>,
    list_failure: RwLock<Option<MockFailure>>,
    calls: RwLock<Vec<MockSourceCall>>,
}

impl MockMailSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixture message.
    pub fn with_message(self, message: RawMessage) -> Self {
        self.messages.write().unwrap().push(message);
        self
    }

    /// Add several fixture messages.
    pub fn with_messages(self, messages: impl IntoIterator<Item = RawMessage>) -> Self {
        self.messages.write().unwrap().extend(messages);
        self
    }

    /// Make fetching one message fail.
    pub fn with_fetch_failure(self, id: impl Into<String>, failure: MockFailure) -> Self {
        self.fetch_failures
            .write()
            .unwrap()
            .insert(id.into(), failure);
        self
    }

    /// Make listing fail (provider outage / auth expiry).
    pub fn with_list_failure(self, failure: MockFailure) -> Self {
        *self.list_failure.write().unwrap() = Some(failure);
        self
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<MockSourceCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of fetch calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockSourceCall::Fetch { .. }))
            .count()
    }
}

#[async_trait]
impl MailSource for MockMailSource {
    async fn list_messages(
        &self,
        _window: &FetchWindow,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        self.calls.write().unwrap().push(MockSourceCall::List {
            page_token: page_token.map(|t| t.to_string()),
        });

        if let Some(failure) = *self.list_failure.read().unwrap() {
            return Err(failure.into_error(""));
        }

        let messages = self.messages.read().unwrap();
        let start: usize = page_token.map(|t| t.parse().unwrap_or(0)).unwrap_or(0);
        let end = (start + page_size as usize).min(messages.len());

        let ids = messages[start..end]
            .iter()
            .map(|m| m.provider_message_id.clone())
            .collect();
        let next_page_token = (end < messages.len()).then(|| end.to_string());

        Ok(MessagePage {
            ids,
            next_page_token,
            estimate: messages.len() as u64,
        })
    }

    async fn fetch_message(&self, provider_message_id: &str) -> Result<RawMessage> {
        self.calls.write().unwrap().push(MockSourceCall::Fetch {
            id: provider_message_id.to_string(),
        });

        if let Some(failure) = self
            .fetch_failures
            .read()
            .unwrap()
            .get(provider_message_id)
        {
            return Err(failure.into_error(provider_message_id));
        }

        self.messages
            .read()
            .unwrap()
            .iter()
            .find(|m| m.provider_message_id == provider_message_id)
            .cloned()
            .ok_or_else(|| ExtractionError::MessageUnavailable {
                provider_message_id: provider_message_id.to_string(),
            })
    }
}

/// A mock extractor returning deterministic, configurable responses.
#[derive(Default)]
pub struct MockExtractor {
    responses: RwLock<HashMap<String, ExtractionResponse>>,
    default_response: RwLock<ExtractionResponse>,
    unavailable_budget: RwLock<HashMap<String, u32>>,
    always_unavailable: AtomicBool,
    delay: RwLock<Option<std::time::Duration>>,
    calls: RwLock<Vec<String>>,
}

impl MockExtractor {
    /// Create a mock that returns an empty response for everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response for one document (by provider message id).
    pub fn with_response(self, id: impl Into<String>, response: ExtractionResponse) -> Self {
        self.responses.write().unwrap().insert(id.into(), response);
        self
    }

    /// Set the response returned for documents without a specific fixture.
    pub fn with_default_response(self, response: ExtractionResponse) -> Self {
        *self.default_response.write().unwrap() = response;
        self
    }

    /// Fail the first `attempts` extraction calls for one document with
    /// `Unavailable`, then answer normally (exercises retry/backoff).
    pub fn unavailable_first(self, id: impl Into<String>, attempts: u32) -> Self {
        self.unavailable_budget
            .write()
            .unwrap()
            .insert(id.into(), attempts);
        self
    }

    /// Fail every call with `Unavailable`.
    pub fn always_unavailable(self) -> Self {
        self.always_unavailable.store(true, Ordering::SeqCst);
        self
    }

    /// Sleep before answering each call (simulates a slow service).
    pub fn with_delay(self, delay: std::time::Duration) -> Self {
        *self.delay.write().unwrap() = Some(delay);
        self
    }

    /// Provider message ids extraction was attempted for, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, document: &Document) -> Result<ExtractionResponse> {
        let id = document.provider_message_id.clone();
        self.calls.write().unwrap().push(id.clone());

        let delay = *self.delay.read().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.always_unavailable.load(Ordering::SeqCst) {
            return Err(ExtractionError::Unavailable("mock outage".into()));
        }

        {
            let mut budgets = self.unavailable_budget.write().unwrap();
            if let Some(remaining) = budgets.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ExtractionError::Unavailable("mock transient outage".into()));
                }
            }
        }

        Ok(self
            .responses
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.default_response.read().unwrap().clone()))
    }
}

// =============================================================================
// Fixture helpers
// =============================================================================

/// Build a plain-text email fixture.
pub fn raw_email(id: &str, from: &str, subject: &str, body: &str) -> RawMessage {
    RawMessage::new(id)
        .with_header("From", from)
        .with_header("To", "me@example.com")
        .with_header("Date", "Tue, 1 Jul 2025 10:30:00 +0000")
        .with_header("Subject", subject)
        .with_part(RawPart::text("text/plain", body))
}

/// Build an email fixture with no parsable headers (fails normalization).
pub fn malformed_email(id: &str) -> RawMessage {
    RawMessage::new(id).with_part(RawPart::text("text/plain", "body with no headers"))
}

/// Build a raw entity for a mock response.
pub fn raw_entity(name: &str, entity_type: &str, confidence: f64) -> RawEntity {
    RawEntity {
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        confidence,
        evidence: None,
    }
}

/// Build a raw relationship for a mock response.
pub fn raw_relationship(
    source: &str,
    target: &str,
    relationship_type: &str,
    confidence: f64,
) -> RawRelationship {
    RawRelationship {
        source: source.to_string(),
        target: target.to_string(),
        relationship_type: relationship_type.to_string(),
        confidence,
        evidence: None,
    }
}

//! Raw messages and normalized documents.
//!
//! [`RawMessage`] is what a [`MailSource`](crate::traits::source::MailSource)
//! hands the pipeline: decoded MIME parts plus provider metadata, still
//! provider-shaped. [`Document`] is the canonical, immutable record produced
//! by [`normalize`](crate::normalize::normalize).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A parsed RFC 2822 mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub name: Option<String>,
    pub address: String,
}

impl Mailbox {
    /// Create a mailbox with just an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The display name when present, otherwise the address.
    pub fn display(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} <{}>", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Attachment metadata carried on a document.
///
/// Content stays with the provider; text extraction/OCR is an external
/// collaborator keyed by `provider_attachment_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub provider_attachment_id: Option<String>,
}

/// One decoded MIME part of a raw message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPart {
    pub mime_type: String,

    /// Non-empty for attachment parts
    pub filename: String,

    /// Decoded text content for inline parts
    pub text: Option<String>,

    /// Provider id for separately stored bodies (attachments)
    pub attachment_id: Option<String>,

    pub size: u64,
}

impl RawPart {
    /// Create an inline text part.
    pub fn text(mime_type: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            mime_type: mime_type.into(),
            size: text.len() as u64,
            text: Some(text),
            ..Default::default()
        }
    }

    /// Create an attachment part.
    pub fn attachment(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            filename: filename.into(),
            size,
            ..Default::default()
        }
    }

    /// Whether this part is an attachment (has a filename).
    pub fn is_attachment(&self) -> bool {
        !self.filename.is_empty()
    }
}

/// A fetched message before normalization: decoded parts plus provider
/// metadata, not yet validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMessage {
    /// Provider message id, unique per account
    pub provider_message_id: String,

    pub thread_id: Option<String>,

    /// RFC 822 headers in wire order
    pub headers: Vec<(String, String)>,

    /// Flattened, decoded MIME parts
    pub parts: Vec<RawPart>,

    /// Provider delivery time in epoch milliseconds
    pub internal_date_ms: Option<i64>,

    pub label_ids: Vec<String>,

    /// Provider-generated plain-text preview
    pub snippet: String,

    pub size_estimate: u64,
}

impl RawMessage {
    /// Create a raw message with the given provider id.
    pub fn new(provider_message_id: impl Into<String>) -> Self {
        Self {
            provider_message_id: provider_message_id.into(),
            ..Default::default()
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a part.
    pub fn with_part(mut self, part: RawPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Set the provider delivery time.
    pub fn with_internal_date_ms(mut self, ms: i64) -> Self {
        self.internal_date_ms = Some(ms);
        self
    }

    /// Set the snippet.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    /// Look up a header by case-insensitive name (first match wins).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A normalized email, immutable once written.
///
/// Re-syncing the same provider message id overwrites this record in place
/// (same id, same `created_at`) rather than creating a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub account_id: Uuid,

    /// Provider message id, unique per account
    pub provider_message_id: String,

    pub thread_id: Option<String>,

    pub sender: Mailbox,
    pub recipients: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,

    pub sent_at: DateTime<Utc>,
    pub subject: String,

    /// Plain text body (HTML stripped when no plain part existed)
    pub body: String,

    pub snippet: String,
    pub attachments: Vec<AttachmentRef>,
    pub label_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Number of attachments on this document.
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// All mailboxes this document names (sender, recipients, cc).
    pub fn participants(&self) -> impl Iterator<Item = &Mailbox> {
        std::iter::once(&self.sender)
            .chain(self.recipients.iter())
            .chain(self.cc.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_display_prefers_name() {
        let boxed = Mailbox::new("ada@example.com").with_name("Ada Lovelace");
        assert_eq!(boxed.display(), "Ada Lovelace");
        assert_eq!(boxed.to_string(), "Ada Lovelace <ada@example.com>");

        let bare = Mailbox::new("ada@example.com");
        assert_eq!(bare.display(), "ada@example.com");
        assert_eq!(bare.to_string(), "ada@example.com");
    }

    #[test]
    fn header_lookup_is_case_insensitive_and_first_wins() {
        let raw = RawMessage::new("m1")
            .with_header("Received", "first-hop")
            .with_header("received", "second-hop")
            .with_header("Subject", "hello");

        assert_eq!(raw.header("RECEIVED"), Some("first-hop"));
        assert_eq!(raw.header("subject"), Some("hello"));
        assert_eq!(raw.header("from"), None);
    }

    #[test]
    fn raw_part_constructors() {
        let text = RawPart::text("text/plain", "body");
        assert!(!text.is_attachment());
        assert_eq!(text.size, 4);

        let pdf = RawPart::attachment("invoice.pdf", "application/pdf", 1024);
        assert!(pdf.is_attachment());
        assert!(pdf.text.is_none());
    }
}

//! Gmail API request and response types.
//!
//! Mirrors the `users.messages` resource of the Gmail REST API v1.
//! Field names follow the wire format (camelCase) via serde renames.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{GmailError, Result};

// =============================================================================
// Listing
// =============================================================================

/// Parameters for `users.messages.list`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListMessagesRequest {
    /// Gmail search query (same syntax as the search box, e.g. "newer_than:7d")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,

    /// Restrict to messages carrying all of these label ids
    #[serde(rename = "labelIds", skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<String>,

    /// Page size (the API caps this at 500)
    #[serde(rename = "maxResults", skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,

    /// Continuation token from a previous page
    #[serde(rename = "pageToken", skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl ListMessagesRequest {
    /// Create an empty list request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search query.
    pub fn with_query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Restrict to the given label ids.
    pub fn with_labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.label_ids = labels.into_iter().map(|l| l.into()).collect();
        self
    }

    /// Set the page size.
    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Set the continuation token.
    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }
}

/// One page of message references from `users.messages.list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageList {
    /// Message ids on this page (absent when the mailbox slice is empty)
    #[serde(default)]
    pub messages: Vec<MessageRef>,

    /// Token for the next page, if any
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,

    /// Server-side estimate of the total result count
    #[serde(rename = "resultSizeEstimate", default)]
    pub result_size_estimate: u64,
}

/// A message id/thread id pair as returned by list calls.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
    #[serde(rename = "threadId")]
    pub thread_id: String,
}

// =============================================================================
// Full messages
// =============================================================================

/// A full message from `users.messages.get` with `format=full`.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,

    #[serde(rename = "threadId")]
    pub thread_id: String,

    #[serde(rename = "labelIds", default)]
    pub label_ids: Vec<String>,

    /// Short plain-text preview of the message body
    #[serde(default)]
    pub snippet: String,

    /// Delivery time in epoch milliseconds (serialized as a string)
    #[serde(rename = "internalDate", default)]
    pub internal_date: Option<String>,

    /// MIME tree root
    pub payload: MessagePart,

    #[serde(rename = "sizeEstimate", default)]
    pub size_estimate: u64,
}

impl Message {
    /// Delivery time in epoch milliseconds, if the API provided one.
    pub fn internal_date_ms(&self) -> Option<i64> {
        self.internal_date.as_deref().and_then(|s| s.parse().ok())
    }

    /// Look up a top-level header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.header(name)
    }
}

/// One node of the MIME tree.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "partId", default)]
    pub part_id: String,

    #[serde(rename = "mimeType", default)]
    pub mime_type: String,

    /// Non-empty for attachment parts
    #[serde(default)]
    pub filename: String,

    #[serde(default)]
    pub headers: Vec<Header>,

    #[serde(default)]
    pub body: MessagePartBody,

    /// Child parts for multipart/* nodes
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// Look up a header on this part by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Whether this part is an attachment (has a filename).
    pub fn is_attachment(&self) -> bool {
        !self.filename.is_empty()
    }

    /// Depth-first iterator over this part and all descendants.
    pub fn walk(&self) -> Vec<&MessagePart> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let children: Vec<&MessagePart> = out[i].parts.iter().collect();
            out.extend(children);
            i += 1;
        }
        out
    }
}

/// Body payload of a MIME part.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePartBody {
    /// Set when the body is stored separately (attachments)
    #[serde(rename = "attachmentId")]
    pub attachment_id: Option<String>,

    #[serde(default)]
    pub size: u64,

    /// Base64url-encoded content for inline bodies
    pub data: Option<String>,
}

impl MessagePartBody {
    /// Decode the base64url body into raw bytes.
    pub fn decoded(&self) -> Result<Option<Vec<u8>>> {
        match &self.data {
            None => Ok(None),
            Some(data) => URL_SAFE_NO_PAD
                .decode(data.trim_end_matches('='))
                .map(Some)
                .map_err(|e| GmailError::Parse(format!("invalid base64url body: {}", e))),
        }
    }

    /// Decode the base64url body into UTF-8 text (lossy for odd charsets).
    pub fn decoded_text(&self) -> Result<Option<String>> {
        Ok(self
            .decoded()?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// A single RFC 822 header.
#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

// =============================================================================
// Profile
// =============================================================================

/// Response from `users.getProfile`.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(rename = "emailAddress")]
    pub email_address: String,

    #[serde(rename = "messagesTotal", default)]
    pub messages_total: u64,

    #[serde(rename = "historyId", default)]
    pub history_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64url_body() {
        let body = MessagePartBody {
            attachment_id: None,
            size: 11,
            // "hello world" without padding
            data: Some("aGVsbG8gd29ybGQ".to_string()),
        };
        assert_eq!(body.decoded_text().unwrap().unwrap(), "hello world");
    }

    #[test]
    fn decodes_padded_base64url_body() {
        let body = MessagePartBody {
            attachment_id: None,
            size: 2,
            data: Some("aGk=".to_string()),
        };
        assert_eq!(body.decoded_text().unwrap().unwrap(), "hi");
    }

    #[test]
    fn empty_body_decodes_to_none() {
        let body = MessagePartBody::default();
        assert!(body.decoded_text().unwrap().is_none());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let part = MessagePart {
            headers: vec![Header {
                name: "From".to_string(),
                value: "Ada <ada@example.com>".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(part.header("from"), Some("Ada <ada@example.com>"));
        assert_eq!(part.header("FROM"), Some("Ada <ada@example.com>"));
        assert_eq!(part.header("date"), None);
    }

    #[test]
    fn walk_visits_nested_parts() {
        let part = MessagePart {
            mime_type: "multipart/alternative".to_string(),
            parts: vec![
                MessagePart {
                    mime_type: "text/plain".to_string(),
                    ..Default::default()
                },
                MessagePart {
                    mime_type: "multipart/mixed".to_string(),
                    parts: vec![MessagePart {
                        mime_type: "text/html".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let mime_types: Vec<&str> = part.walk().iter().map(|p| p.mime_type.as_str()).collect();
        assert_eq!(
            mime_types,
            vec![
                "multipart/alternative",
                "text/plain",
                "multipart/mixed",
                "text/html"
            ]
        );
    }

    #[test]
    fn parses_list_response() {
        let json = r#"{
            "messages": [{"id": "m1", "threadId": "t1"}],
            "nextPageToken": "tok",
            "resultSizeEstimate": 42
        }"#;
        let list: MessageList = serde_json::from_str(json).unwrap();
        assert_eq!(list.messages.len(), 1);
        assert_eq!(list.messages[0].id, "m1");
        assert_eq!(list.next_page_token.as_deref(), Some("tok"));
        assert_eq!(list.result_size_estimate, 42);
    }

    #[test]
    fn parses_empty_list_response() {
        let list: MessageList = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.messages.is_empty());
        assert!(list.next_page_token.is_none());
    }
}

//! Document normalization - raw messages into canonical records.
//!
//! `normalize` is a deterministic, pure function: the same raw message
//! always yields the same document content. Failures are per-document
//! ([`MalformedMessage`](crate::error::ExtractionError::MalformedMessage));
//! the sync pipeline records them and moves on.

use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::types::document::{AttachmentRef, Document, Mailbox, RawMessage, RawPart};

fn mailbox_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Display Name <addr@host>" with optional quotes around the name
    RE.get_or_init(|| Regex::new(r#"^\s*"?([^"<]*?)"?\s*<([^<>\s]+@[^<>\s]+)>\s*$"#).unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<[^>]*>").unwrap())
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|head)\b[^>]*>.*?</(script|style|head)>").unwrap()
    })
}

fn block_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</(p|div|tr|li|h[1-6]|table|blockquote)>|<br\s*/?>").unwrap())
}

/// Normalize one raw message into a canonical [`Document`].
///
/// Required: a parsable `From` mailbox and a timestamp (the `Date` header or
/// the provider internal date). Everything else degrades gracefully.
pub fn normalize(account_id: Uuid, raw: &RawMessage) -> Result<Document> {
    if raw.provider_message_id.trim().is_empty() {
        return Err(ExtractionError::MalformedMessage {
            reason: "missing provider message id".to_string(),
        });
    }

    let sender = raw
        .header("From")
        .ok_or_else(|| ExtractionError::MalformedMessage {
            reason: "missing From header".to_string(),
        })
        .and_then(|value| {
            parse_mailbox(value).ok_or_else(|| ExtractionError::MalformedMessage {
                reason: format!("unparsable From header: {}", value),
            })
        })?;

    let sent_at = parse_sent_at(raw).ok_or_else(|| ExtractionError::MalformedMessage {
        reason: "no parsable Date header or internal date".to_string(),
    })?;

    let recipients = raw
        .header("To")
        .map(parse_mailbox_list)
        .unwrap_or_default();
    let cc = raw
        .header("Cc")
        .map(parse_mailbox_list)
        .unwrap_or_default();

    let subject = raw.header("Subject").unwrap_or("").trim().to_string();
    let body = extract_body(raw);
    let attachments = collect_attachments(&raw.parts);

    Ok(Document {
        id: Uuid::now_v7(),
        account_id,
        provider_message_id: raw.provider_message_id.clone(),
        thread_id: raw.thread_id.clone(),
        sender,
        recipients,
        cc,
        sent_at,
        subject,
        body,
        snippet: raw.snippet.clone(),
        attachments,
        label_ids: raw.label_ids.clone(),
        created_at: Utc::now(),
    })
}

/// Parse a single RFC 2822 mailbox ("Name <addr>" or a bare address).
pub fn parse_mailbox(value: &str) -> Option<Mailbox> {
    if let Some(caps) = mailbox_re().captures(value) {
        let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let address = caps.get(2)?.as_str().to_string();
        let mut mailbox = Mailbox::new(address);
        if !name.is_empty() {
            mailbox = mailbox.with_name(name);
        }
        return Some(mailbox);
    }

    let bare = value.trim().trim_matches(|c| c == '<' || c == '>');
    if bare.contains('@') && !bare.contains(char::is_whitespace) {
        return Some(Mailbox::new(bare));
    }
    None
}

/// Parse a comma-separated mailbox list, dropping unparsable members.
pub fn parse_mailbox_list(value: &str) -> Vec<Mailbox> {
    split_addresses(value)
        .iter()
        .filter_map(|part| parse_mailbox(part))
        .collect()
}

// Split on commas outside of quoted display names.
fn split_addresses(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in value.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn parse_sent_at(raw: &RawMessage) -> Option<DateTime<Utc>> {
    if let Some(date) = raw.header("Date") {
        if let Ok(parsed) = DateTime::parse_from_rfc2822(date.trim()) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    raw.internal_date_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

// Body selection: first non-empty text/plain part, else stripped text/html,
// else the provider snippet.
fn extract_body(raw: &RawMessage) -> String {
    if let Some(text) = first_inline_text(&raw.parts, "text/plain") {
        return text.trim().to_string();
    }
    if let Some(html) = first_inline_text(&raw.parts, "text/html") {
        let stripped = strip_html(&html);
        if !stripped.is_empty() {
            return stripped;
        }
    }
    raw.snippet.trim().to_string()
}

fn first_inline_text(parts: &[RawPart], mime_type: &str) -> Option<String> {
    parts
        .iter()
        .filter(|p| !p.is_attachment() && p.mime_type.eq_ignore_ascii_case(mime_type))
        .find_map(|p| {
            p.text
                .as_ref()
                .filter(|t| !t.trim().is_empty())
                .map(|t| t.to_string())
        })
}

/// Strip HTML down to readable plain text.
///
/// Block-level closers become newlines so paragraph structure survives;
/// script/style/head subtrees are dropped entirely.
pub fn strip_html(html: &str) -> String {
    let without_blocks = script_style_re().replace_all(html, " ");
    let with_breaks = block_end_re().replace_all(&without_blocks, "\n");
    let without_tags = tag_re().replace_all(&with_breaks, " ");
    let decoded = decode_entities(&without_tags);

    // Collapse runs of spaces but keep line structure
    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collect_attachments(parts: &[RawPart]) -> Vec<AttachmentRef> {
    parts
        .iter()
        .filter(|p| p.is_attachment())
        .map(|p| AttachmentRef {
            filename: p.filename.clone(),
            mime_type: p.mime_type.clone(),
            size: p.size,
            provider_attachment_id: p.attachment_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_message() -> RawMessage {
        RawMessage::new("m-1")
            .with_header("From", "Ada Lovelace <ada@example.com>")
            .with_header("To", "Charles Babbage <charles@example.com>, grace@example.com")
            .with_header("Date", "Tue, 1 Jul 2025 10:30:00 +0000")
            .with_header("Subject", "Engine schematics")
            .with_part(RawPart::text("text/plain", "Please find the schematics attached."))
    }

    #[test]
    fn normalizes_a_plain_message() {
        let account = Uuid::now_v7();
        let doc = normalize(account, &base_message()).unwrap();

        assert_eq!(doc.account_id, account);
        assert_eq!(doc.provider_message_id, "m-1");
        assert_eq!(doc.sender.address, "ada@example.com");
        assert_eq!(doc.sender.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(doc.recipients.len(), 2);
        assert_eq!(doc.recipients[1].address, "grace@example.com");
        assert_eq!(doc.subject, "Engine schematics");
        assert_eq!(doc.body, "Please find the schematics attached.");
        assert_eq!(doc.sent_at.to_rfc2822(), "Tue, 1 Jul 2025 10:30:00 +0000");
    }

    #[test]
    fn missing_from_is_malformed() {
        let raw = RawMessage::new("m-2").with_header("Date", "Tue, 1 Jul 2025 10:30:00 +0000");
        let err = normalize(Uuid::now_v7(), &raw).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedMessage { .. }));
        assert!(err.is_document_scoped());
    }

    #[test]
    fn garbage_from_is_malformed() {
        let mut raw = base_message();
        raw.headers.retain(|(n, _)| !n.eq_ignore_ascii_case("From"));
        let raw = raw.with_header("From", "not an address");
        let err = normalize(Uuid::now_v7(), &raw).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedMessage { .. }));
    }

    #[test]
    fn falls_back_to_internal_date() {
        let mut raw = base_message();
        raw.headers.retain(|(n, _)| !n.eq_ignore_ascii_case("Date"));
        let raw = raw.with_internal_date_ms(1_751_363_400_000);

        let doc = normalize(Uuid::now_v7(), &raw).unwrap();
        assert_eq!(doc.sent_at.timestamp_millis(), 1_751_363_400_000);
    }

    #[test]
    fn no_timestamp_at_all_is_malformed() {
        let mut raw = base_message();
        raw.headers.retain(|(n, _)| !n.eq_ignore_ascii_case("Date"));
        let err = normalize(Uuid::now_v7(), &raw).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedMessage { .. }));
    }

    #[test]
    fn prefers_plain_text_over_html() {
        let raw = base_message().with_part(RawPart::text("text/html", "<p>HTML body</p>"));
        let doc = normalize(Uuid::now_v7(), &raw).unwrap();
        assert_eq!(doc.body, "Please find the schematics attached.");
    }

    #[test]
    fn strips_html_when_no_plain_part() {
        let mut raw = base_message();
        raw.parts.clear();
        let raw = raw.with_part(RawPart::text(
            "text/html",
            "<html><head><title>x</title></head><body>\
             <style>p { color: red; }</style>\
             <p>First &amp; second</p><div>Third &lt;line&gt;</div></body></html>",
        ));

        let doc = normalize(Uuid::now_v7(), &raw).unwrap();
        assert_eq!(doc.body, "First & second\nThird <line>");
    }

    #[test]
    fn falls_back_to_snippet_when_no_text_parts() {
        let mut raw = base_message().with_snippet("Snippet preview");
        raw.parts.clear();
        let doc = normalize(Uuid::now_v7(), &raw).unwrap();
        assert_eq!(doc.body, "Snippet preview");
    }

    #[test]
    fn collects_attachment_metadata() {
        let raw = base_message().with_part(
            RawPart::attachment("invoice.pdf", "application/pdf", 2048),
        );
        let doc = normalize(Uuid::now_v7(), &raw).unwrap();

        assert_eq!(doc.attachments.len(), 1);
        assert_eq!(doc.attachments[0].filename, "invoice.pdf");
        assert_eq!(doc.attachments[0].mime_type, "application/pdf");
        assert_eq!(doc.attachments[0].size, 2048);
        // Attachment text is never inlined into the body
        assert_eq!(doc.body, "Please find the schematics attached.");
    }

    #[test]
    fn quoted_display_names_with_commas_split_correctly() {
        let boxes = parse_mailbox_list(r#""Lovelace, Ada" <ada@example.com>, bob@example.com"#);
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].name.as_deref(), Some("Lovelace, Ada"));
        assert_eq!(boxes[0].address, "ada@example.com");
        assert_eq!(boxes[1].address, "bob@example.com");
    }

    #[test]
    fn unparsable_recipients_are_dropped_not_fatal() {
        let boxes = parse_mailbox_list("undisclosed-recipients:;, carol@example.com");
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].address, "carol@example.com");
    }

    #[test]
    fn br_tags_become_newlines() {
        assert_eq!(strip_html("one<br>two<br />three"), "one\ntwo\nthree");
    }
}

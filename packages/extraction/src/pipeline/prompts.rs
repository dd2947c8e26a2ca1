//! Prompt construction for the extraction service.
//!
//! Prompts are deterministic functions of the document so identical inputs
//! produce identical requests; `extraction_prompt_hash` versions the prompt
//! text for cache invalidation and observability.

use sha2::{Digest, Sha256};

use crate::types::document::Document;

/// Maximum body characters sent to the extraction service.
pub const MAX_BODY_CHARS: usize = 12_000;

/// System prompt for entity/relationship extraction.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You extract structured knowledge from emails.

Identify real-world entities (people, organizations, locations, dates, \
monetary amounts) and the relationships between them. For every item report:
- a type label
- a confidence between 0.0 and 1.0
- the exact text span that supports it

Only report what the email states or directly implies. Do not invent \
entities, do not resolve entities across emails, and keep names exactly as \
written.";

/// Build the user prompt for one document.
pub fn format_extraction_prompt(document: &Document) -> String {
    let mut body = document.body.as_str();
    if body.len() > MAX_BODY_CHARS {
        let mut cut = MAX_BODY_CHARS;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body = &body[..cut];
    }

    let recipients = document
        .recipients
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let attachments = if document.attachments.is_empty() {
        String::new()
    } else {
        format!(
            "\nAttachments: {}",
            document
                .attachments
                .iter()
                .map(|a| a.filename.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    format!(
        "From: {}\nTo: {}\nDate: {}\nSubject: {}{}\n\n{}",
        document.sender,
        recipients,
        document.sent_at.to_rfc3339(),
        document.subject,
        attachments,
        body
    )
}

/// Hash of the extraction prompt text.
///
/// Changes whenever the system prompt changes, so stored results can be
/// tied to the prompt version that produced them.
pub fn extraction_prompt_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(EXTRACTION_SYSTEM_PROMPT.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

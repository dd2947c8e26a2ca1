//! Extracted entities and the closed entity type enumeration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed entity type enumeration.
///
/// Free-text labels from the extraction service map onto this set; anything
/// unrecognized lands in `Other` rather than being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Date,
    Amount,
    Other,
}

impl EntityType {
    /// All types, in display order.
    pub const ALL: [EntityType; 6] = [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Location,
        EntityType::Date,
        EntityType::Amount,
        EntityType::Other,
    ];

    /// Stable string form (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Date => "date",
            EntityType::Amount => "amount",
            EntityType::Other => "other",
        }
    }

    /// Map a free-text label onto the closed set.
    ///
    /// Unrecognized labels become `Other`.
    pub fn parse_label(label: &str) -> EntityType {
        match label.trim().to_ascii_lowercase().as_str() {
            "person" | "people" | "individual" | "name" | "contact" => EntityType::Person,
            "organization" | "organisation" | "org" | "company" | "business" | "vendor"
            | "institution" | "agency" => EntityType::Organization,
            "location" | "place" | "address" | "city" | "country" | "region" => {
                EntityType::Location
            }
            "date" | "datetime" | "time" | "deadline" => EntityType::Date,
            "amount" | "money" | "price" | "payment" | "currency" | "total" | "cost" => {
                EntityType::Amount
            }
            _ => EntityType::Other,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "organization" => Ok(EntityType::Organization),
            "location" => Ok(EntityType::Location),
            "date" => Ok(EntityType::Date),
            "amount" => Ok(EntityType::Amount),
            "other" => Ok(EntityType::Other),
            _ => Err(format!("unknown entity type: {}", s)),
        }
    }
}

/// Canonical name normalization for the entity merge key.
///
/// Lowercases, collapses internal whitespace, and trims surrounding
/// punctuation so "  ACME  Corp. " and "Acme Corp" merge.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() && c != '$' && c != '@');
    let mut out = String::with_capacity(trimmed.len());
    let mut last_was_space = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// A deduplicated real-world object in the knowledge graph.
///
/// Merge key is `(account_id, entity_type, normalized_name)`; `confidence`
/// is the running maximum across extractions and `mention_count` equals the
/// number of distinct evidence documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub account_id: Uuid,

    /// Canonical display name (as first extracted)
    pub name: String,

    pub normalized_name: String,
    pub entity_type: EntityType,

    /// Running maximum, in [0, 1]
    pub confidence: f32,

    /// Number of distinct documents providing evidence
    pub mention_count: u64,

    pub created_at: DateTime<Utc>,
}

/// A validated entity candidate from one document, ready to merge.
///
/// Produced by [`transform_response`](crate::pipeline::transform::transform_response);
/// confidence is already clamped and the type label already mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntity {
    pub name: String,
    pub normalized_name: String,
    pub entity_type: EntityType,
    pub confidence: f32,

    /// Supporting text span from the source document
    pub evidence_text: Option<String>,
}

impl CandidateEntity {
    /// Build a candidate from a display name, normalizing the merge key.
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence: f32) -> Self {
        let name = name.into();
        Self {
            normalized_name: normalize_name(&name),
            name,
            entity_type,
            confidence,
            evidence_text: None,
        }
    }

    /// Attach a supporting text span.
    pub fn with_evidence(mut self, text: impl Into<String>) -> Self {
        self.evidence_text = Some(text.into());
        self
    }

    /// The entity merge key within an account.
    pub fn key(&self) -> (EntityType, &str) {
        (self.entity_type, self.normalized_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_whitespace_and_punctuation() {
        assert_eq!(normalize_name("  ACME   Corp. "), "acme corp");
        assert_eq!(normalize_name("Ada Lovelace"), "ada lovelace");
        assert_eq!(normalize_name("\"Quoted Name\""), "quoted name");
        assert_eq!(normalize_name("tabs\tand\nnewlines"), "tabs and newlines");
    }

    #[test]
    fn normalization_keeps_meaningful_symbols() {
        assert_eq!(normalize_name("$1,200"), "$1,200");
        assert_eq!(normalize_name("ada@example.com"), "ada@example.com");
    }

    #[test]
    fn label_mapping_covers_synonyms() {
        assert_eq!(EntityType::parse_label("Company"), EntityType::Organization);
        assert_eq!(EntityType::parse_label("PEOPLE"), EntityType::Person);
        assert_eq!(EntityType::parse_label("city"), EntityType::Location);
        assert_eq!(EntityType::parse_label("payment"), EntityType::Amount);
        assert_eq!(EntityType::parse_label("deadline"), EntityType::Date);
    }

    #[test]
    fn unknown_labels_bucket_to_other() {
        assert_eq!(EntityType::parse_label("spaceship"), EntityType::Other);
        assert_eq!(EntityType::parse_label(""), EntityType::Other);
    }

    #[test]
    fn candidate_key_uses_normalized_name() {
        let candidate = CandidateEntity::new("ACME Corp", EntityType::Organization, 0.9);
        assert_eq!(candidate.key(), (EntityType::Organization, "acme corp"));
        assert_eq!(candidate.name, "ACME Corp");
    }

    #[test]
    fn entity_type_round_trips_as_str() {
        for ty in EntityType::ALL {
            assert_eq!(ty.as_str().parse::<EntityType>().unwrap(), ty);
        }
    }
}

//! Typed, evidenced edges between entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed relationship type enumeration.
///
/// Free-text labels map onto this set with `Other` as the fallback bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    WorksFor,
    SentTo,
    Paid,
    LocatedIn,
    Mentions,
    Other,
}

impl RelationshipType {
    /// All types, in display order.
    pub const ALL: [RelationshipType; 6] = [
        RelationshipType::WorksFor,
        RelationshipType::SentTo,
        RelationshipType::Paid,
        RelationshipType::LocatedIn,
        RelationshipType::Mentions,
        RelationshipType::Other,
    ];

    /// Stable string form (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::WorksFor => "works_for",
            RelationshipType::SentTo => "sent_to",
            RelationshipType::Paid => "paid",
            RelationshipType::LocatedIn => "located_in",
            RelationshipType::Mentions => "mentions",
            RelationshipType::Other => "other",
        }
    }

    /// Map a free-text label onto the closed set.
    pub fn parse_label(label: &str) -> RelationshipType {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "works_for" | "employed_by" | "employee_of" | "works_at" | "member_of" => {
                RelationshipType::WorksFor
            }
            "sent_to" | "emailed" | "wrote_to" | "messaged" | "contacted" => {
                RelationshipType::SentTo
            }
            "paid" | "paid_to" | "payment_to" | "invoiced" | "billed" | "transferred" => {
                RelationshipType::Paid
            }
            "located_in" | "based_in" | "in" | "at" | "headquartered_in" => {
                RelationshipType::LocatedIn
            }
            "mentions" | "mentioned" | "references" | "refers_to" | "related_to" => {
                RelationshipType::Mentions
            }
            _ => RelationshipType::Other,
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationshipType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| format!("unknown relationship type: {}", s))
    }
}

/// A typed edge between two entities.
///
/// Merge key is `(account_id, source_id, target_id, relationship_type)`;
/// `evidence_count` equals the number of distinct supporting documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub account_id: Uuid,

    pub source_id: Uuid,
    pub target_id: Uuid,

    /// Denormalized endpoint names for listing/query responses
    pub source_name: String,
    pub target_name: String,

    pub relationship_type: RelationshipType,

    /// Running maximum, in [0, 1]
    pub confidence: f32,

    /// Number of distinct documents providing evidence
    pub evidence_count: u64,

    pub created_at: DateTime<Utc>,
}

/// A validated relationship candidate from one document, ready to merge.
///
/// Endpoints are indices into the candidate entity slice handed to
/// [`GraphStore::merge_document`](crate::traits::store::GraphStore::merge_document),
/// resolved during transform so stores never do name resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelationship {
    pub source: usize,
    pub target: usize,
    pub relationship_type: RelationshipType,
    pub confidence: f32,

    /// Supporting text span from the source document
    pub evidence_text: Option<String>,
}

impl CandidateRelationship {
    /// Build a candidate edge between two entity indices.
    pub fn new(source: usize, target: usize, ty: RelationshipType, confidence: f32) -> Self {
        Self {
            source,
            target,
            relationship_type: ty,
            confidence,
            evidence_text: None,
        }
    }

    /// Attach a supporting text span.
    pub fn with_evidence(mut self, text: impl Into<String>) -> Self {
        self.evidence_text = Some(text.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_mapping_handles_spaces_and_dashes() {
        assert_eq!(
            RelationshipType::parse_label("works for"),
            RelationshipType::WorksFor
        );
        assert_eq!(
            RelationshipType::parse_label("Employed-By"),
            RelationshipType::WorksFor
        );
        assert_eq!(
            RelationshipType::parse_label("based in"),
            RelationshipType::LocatedIn
        );
    }

    #[test]
    fn unknown_labels_bucket_to_other() {
        assert_eq!(
            RelationshipType::parse_label("teleported_to"),
            RelationshipType::Other
        );
    }

    #[test]
    fn relationship_type_round_trips_as_str() {
        for ty in RelationshipType::ALL {
            assert_eq!(ty.as_str().parse::<RelationshipType>().unwrap(), ty);
        }
    }
}

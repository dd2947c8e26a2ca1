//! Response validation and candidate construction.
//!
//! The extraction service returns free-text type labels and unchecked
//! confidences. This stage clamps confidences into [0, 1] (rejecting
//! non-finite values), maps labels onto the closed enums (`Other` bucket,
//! never dropped), deduplicates within the document, and resolves
//! relationship endpoints to entity indices so stores never do name
//! resolution.

use std::collections::HashMap;

use tracing::debug;

use crate::traits::extractor::ExtractionResponse;
use crate::types::entity::{normalize_name, CandidateEntity, EntityType};
use crate::types::relationship::{CandidateRelationship, RelationshipType};

/// Validated candidates for one document, plus drop accounting.
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub entities: Vec<CandidateEntity>,
    pub relationships: Vec<CandidateRelationship>,

    /// Entities rejected (empty name, non-finite confidence)
    pub dropped_entities: usize,

    /// Relationships rejected (bad confidence, unresolvable endpoints, self-loops)
    pub dropped_relationships: usize,
}

/// Clamp a service confidence into [0, 1]; `None` rejects the item.
pub fn clamp_confidence(raw: f64) -> Option<f32> {
    if !raw.is_finite() {
        return None;
    }
    Some(raw.clamp(0.0, 1.0) as f32)
}

/// Validate one service response into merge-ready candidates.
pub fn transform_response(response: ExtractionResponse) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();

    // Dedupe entities within the document by merge key, keeping the highest
    // confidence and the first-seen display name.
    let mut index_by_key: HashMap<(EntityType, String), usize> = HashMap::new();
    // Endpoint resolution is by normalized name alone; remember the first
    // candidate index for each name.
    let mut index_by_name: HashMap<String, usize> = HashMap::new();

    for raw in response.entities {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            outcome.dropped_entities += 1;
            continue;
        }
        let Some(confidence) = clamp_confidence(raw.confidence) else {
            outcome.dropped_entities += 1;
            continue;
        };

        let entity_type = EntityType::parse_label(&raw.entity_type);
        let normalized = normalize_name(&name);
        if normalized.is_empty() {
            outcome.dropped_entities += 1;
            continue;
        }

        match index_by_key.entry((entity_type, normalized.clone())) {
            std::collections::hash_map::Entry::Occupied(slot) => {
                let existing = &mut outcome.entities[*slot.get()];
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                }
                if existing.evidence_text.is_none() {
                    existing.evidence_text = raw.evidence;
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                let mut candidate = CandidateEntity::new(name, entity_type, confidence);
                candidate.evidence_text = raw.evidence;
                let index = outcome.entities.len();
                slot.insert(index);
                index_by_name.entry(normalized).or_insert(index);
                outcome.entities.push(candidate);
            }
        }
    }

    let mut seen_edges: HashMap<(usize, usize, RelationshipType), usize> = HashMap::new();
    for raw in response.relationships {
        let Some(confidence) = clamp_confidence(raw.confidence) else {
            outcome.dropped_relationships += 1;
            continue;
        };

        let source = index_by_name.get(&normalize_name(&raw.source)).copied();
        let target = index_by_name.get(&normalize_name(&raw.target)).copied();
        let (Some(source), Some(target)) = (source, target) else {
            debug!(
                source = %raw.source,
                target = %raw.target,
                "relationship endpoint not among extracted entities; dropped"
            );
            outcome.dropped_relationships += 1;
            continue;
        };
        if source == target {
            outcome.dropped_relationships += 1;
            continue;
        }

        let ty = RelationshipType::parse_label(&raw.relationship_type);
        match seen_edges.entry((source, target, ty)) {
            std::collections::hash_map::Entry::Occupied(slot) => {
                let existing = &mut outcome.relationships[*slot.get()];
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                let mut candidate = CandidateRelationship::new(source, target, ty, confidence);
                candidate.evidence_text = raw.evidence;
                slot.insert(outcome.relationships.len());
                outcome.relationships.push(candidate);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::extractor::{RawEntity, RawRelationship};

    fn entity(name: &str, ty: &str, confidence: f64) -> RawEntity {
        RawEntity {
            name: name.to_string(),
            entity_type: ty.to_string(),
            confidence,
            evidence: None,
        }
    }

    fn edge(source: &str, target: &str, ty: &str, confidence: f64) -> RawRelationship {
        RawRelationship {
            source: source.to_string(),
            target: target.to_string(),
            relationship_type: ty.to_string(),
            confidence,
            evidence: None,
        }
    }

    #[test]
    fn clamps_out_of_range_confidences() {
        assert_eq!(clamp_confidence(1.7), Some(1.0));
        assert_eq!(clamp_confidence(-0.3), Some(0.0));
        assert_eq!(clamp_confidence(0.42), Some(0.42));
        assert_eq!(clamp_confidence(f64::NAN), None);
        assert_eq!(clamp_confidence(f64::INFINITY), None);
    }

    #[test]
    fn maps_labels_and_buckets_unknown_types() {
        let outcome = transform_response(ExtractionResponse {
            entities: vec![
                entity("Ada", "person", 0.9),
                entity("Acme", "company", 0.8),
                entity("Warp Drive", "technology", 0.7),
            ],
            relationships: vec![],
        });

        assert_eq!(outcome.entities.len(), 3);
        assert_eq!(outcome.entities[0].entity_type, EntityType::Person);
        assert_eq!(outcome.entities[1].entity_type, EntityType::Organization);
        assert_eq!(outcome.entities[2].entity_type, EntityType::Other);
        assert_eq!(outcome.dropped_entities, 0);
    }

    #[test]
    fn dedupes_entities_within_a_document() {
        let outcome = transform_response(ExtractionResponse {
            entities: vec![
                entity("ACME Corp", "organization", 0.6),
                entity("acme corp", "org", 0.9),
            ],
            relationships: vec![],
        });

        assert_eq!(outcome.entities.len(), 1);
        assert_eq!(outcome.entities[0].name, "ACME Corp");
        assert_eq!(outcome.entities[0].confidence, 0.9);
    }

    #[test]
    fn rejects_bad_entities_but_keeps_the_rest() {
        let outcome = transform_response(ExtractionResponse {
            entities: vec![
                entity("", "person", 0.9),
                entity("Ada", "person", f64::NAN),
                entity("Bob", "person", 0.5),
            ],
            relationships: vec![],
        });

        assert_eq!(outcome.entities.len(), 1);
        assert_eq!(outcome.entities[0].name, "Bob");
        assert_eq!(outcome.dropped_entities, 2);
    }

    #[test]
    fn resolves_relationship_endpoints_to_indices() {
        let outcome = transform_response(ExtractionResponse {
            entities: vec![
                entity("Ada", "person", 0.9),
                entity("Acme", "organization", 0.8),
            ],
            relationships: vec![edge("Ada", "Acme", "works for", 0.7)],
        });

        assert_eq!(outcome.relationships.len(), 1);
        let rel = &outcome.relationships[0];
        assert_eq!(rel.source, 0);
        assert_eq!(rel.target, 1);
        assert_eq!(rel.relationship_type, RelationshipType::WorksFor);
    }

    #[test]
    fn drops_relationships_with_unknown_endpoints() {
        let outcome = transform_response(ExtractionResponse {
            entities: vec![entity("Ada", "person", 0.9)],
            relationships: vec![edge("Ada", "Ghost Corp", "works_for", 0.7)],
        });

        assert!(outcome.relationships.is_empty());
        assert_eq!(outcome.dropped_relationships, 1);
    }

    proptest::proptest! {
        #[test]
        fn clamped_confidence_is_always_in_range(raw in proptest::num::f64::ANY) {
            match clamp_confidence(raw) {
                Some(c) => proptest::prop_assert!((0.0f32..=1.0f32).contains(&c)),
                None => proptest::prop_assert!(!raw.is_finite()),
            }
        }
    }

    #[test]
    fn drops_self_loops_and_duplicate_edges() {
        let outcome = transform_response(ExtractionResponse {
            entities: vec![
                entity("Ada", "person", 0.9),
                entity("Acme", "organization", 0.8),
            ],
            relationships: vec![
                edge("Ada", "Ada", "mentions", 0.7),
                edge("Ada", "Acme", "works_for", 0.5),
                edge("Ada", "Acme", "employed by", 0.8),
            ],
        });

        assert_eq!(outcome.relationships.len(), 1);
        assert_eq!(outcome.relationships[0].confidence, 0.8);
        assert_eq!(outcome.dropped_relationships, 1);
    }
}

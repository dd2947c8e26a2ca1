//! Storage traits for documents and the knowledge graph.
//!
//! The storage layer is split into focused traits:
//! - `DocumentStore`: normalized emails, keyed by provider message id
//! - `GraphStore`: entity/relationship merge and read paths
//! - `KnowledgeStore`: composite trait combining both
//!
//! Merge semantics live here so every backend honors them identically:
//! per-document atomicity, max-confidence upsert, and evidence sets that
//! never double-count a document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::document::Document;
use crate::types::entity::{CandidateEntity, Entity, EntityType};
use crate::types::relationship::{CandidateRelationship, Relationship, RelationshipType};

/// Server-enforced maximum page size for listings and queries.
pub const MAX_PAGE_SIZE: usize = 100;

/// Clamp a requested limit into `1..=MAX_PAGE_SIZE` (clamped, not rejected).
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_PAGE_SIZE)
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Total matches before pagination
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// An empty page.
    pub fn empty() -> Self {
        Self {
            total: 0,
            items: Vec::new(),
        }
    }
}

/// Filter for entity listings.
#[derive(Debug, Clone)]
pub struct EntityFilter {
    pub account_id: Uuid,
    pub entity_type: Option<EntityType>,
    pub name_contains: Option<String>,
}

impl EntityFilter {
    /// Match all entities for an account.
    pub fn for_account(account_id: Uuid) -> Self {
        Self {
            account_id,
            entity_type: None,
            name_contains: None,
        }
    }

    /// Restrict to one entity type.
    pub fn with_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Restrict to names containing the given substring (case-insensitive).
    pub fn with_name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }
}

/// Filter for relationship listings.
#[derive(Debug, Clone)]
pub struct RelationshipFilter {
    pub account_id: Uuid,

    /// Match edges touching this entity (as source or target)
    pub entity_id: Option<Uuid>,

    pub relationship_type: Option<RelationshipType>,
}

impl RelationshipFilter {
    /// Match all relationships for an account.
    pub fn for_account(account_id: Uuid) -> Self {
        Self {
            account_id,
            entity_id: None,
            relationship_type: None,
        }
    }

    /// Restrict to edges touching one entity.
    pub fn with_entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Restrict to one relationship type.
    pub fn with_type(mut self, ty: RelationshipType) -> Self {
        self.relationship_type = Some(ty);
        self
    }
}

/// What one document-level merge changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub entities_created: u64,
    pub entities_merged: u64,
    pub relationships_created: u64,
    pub relationships_merged: u64,

    /// Evidence links newly added (0 on a pure retry of the same document)
    pub evidence_added: u64,
}

impl MergeOutcome {
    /// Total entities touched.
    pub fn entities_touched(&self) -> u64 {
        self.entities_created + self.entities_merged
    }

    /// Total relationships touched.
    pub fn relationships_touched(&self) -> u64 {
        self.relationships_created + self.relationships_merged
    }
}

/// Aggregate graph statistics for an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_documents: u64,
    pub total_entities: u64,
    pub total_relationships: u64,

    /// Entity counts per type, ordered as [`EntityType::ALL`]
    pub entity_type_counts: Vec<(EntityType, u64)>,
}

/// Store for normalized documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert a document keyed by `(account_id, provider_message_id)`.
    ///
    /// On conflict the existing record's `id` and `created_at` survive and
    /// content is overwritten (idempotent re-sync, never a duplicate).
    /// Returns the canonical document id.
    async fn store_document(&self, document: &Document) -> Result<Uuid>;

    /// Get a document by provider message id.
    async fn get_document(
        &self,
        account_id: Uuid,
        provider_message_id: &str,
    ) -> Result<Option<Document>>;

    /// Get a document by canonical id.
    async fn get_document_by_id(&self, id: Uuid) -> Result<Option<Document>>;

    /// Whether a provider message id is already stored for the account.
    async fn contains_message(&self, account_id: Uuid, provider_message_id: &str)
        -> Result<bool>;

    /// Delete a document; evidence links to it are removed and mention/
    /// evidence counts decremented, but entities are never cascade-deleted.
    async fn delete_document(&self, id: Uuid) -> Result<()>;

    /// Count stored documents for an account.
    async fn count_documents(&self, account_id: Uuid) -> Result<u64>;
}

/// Store for the knowledge graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge one document's candidates into the graph, atomically.
    ///
    /// Entity key is `(account, type, normalized-name)`: on hit, confidence
    /// becomes `max(old, new)` and the evidence set gains `document_id`
    /// (mention count tracks the set size). Relationship key is `(account,
    /// source, target, type)`: on hit, the evidence set gains `document_id`.
    /// Candidate relationship endpoints index into `entities`. Either
    /// everything for the document commits or nothing does.
    async fn merge_document(
        &self,
        account_id: Uuid,
        document_id: Uuid,
        entities: &[CandidateEntity],
        relationships: &[CandidateRelationship],
    ) -> Result<MergeOutcome>;

    /// List entities ordered by mention count desc, creation time asc, id.
    async fn list_entities(
        &self,
        filter: &EntityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Entity>>;

    /// List relationships ordered by evidence count desc, creation time asc, id.
    async fn list_relationships(
        &self,
        filter: &RelationshipFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Relationship>>;

    /// Get an entity by id.
    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>>;

    /// Aggregate statistics for an account.
    async fn stats(&self, account_id: Uuid) -> Result<GraphStats>;

    /// Remove every document, entity, relationship and evidence link for an
    /// account (disconnect cascade).
    async fn delete_account_data(&self, account_id: Uuid) -> Result<()>;
}

/// Composite storage trait used by the pipeline and the API layer.
pub trait KnowledgeStore: DocumentStore + GraphStore {}

// Blanket implementation: anything implementing both is a KnowledgeStore
impl<T: DocumentStore + GraphStore> KnowledgeStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped_not_rejected() {
        assert_eq!(clamp_limit(500), MAX_PAGE_SIZE);
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(25), 25);
        assert_eq!(clamp_limit(MAX_PAGE_SIZE), MAX_PAGE_SIZE);
    }
}

//! In-memory storage implementation for testing and development.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::traits::store::{
    clamp_limit, DocumentStore, EntityFilter, GraphStats, GraphStore, MergeOutcome, Page,
    RelationshipFilter,
};
use crate::types::document::Document;
use crate::types::entity::{CandidateEntity, Entity, EntityType};
use crate::types::relationship::{CandidateRelationship, Relationship, RelationshipType};

struct EntityRecord {
    entity: Entity,
    evidence: HashSet<Uuid>,
}

struct RelationshipRecord {
    relationship: Relationship,
    evidence: HashSet<Uuid>,
}

#[derive(Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    documents_by_key: HashMap<(Uuid, String), Uuid>,
    entities: HashMap<Uuid, EntityRecord>,
    entity_keys: HashMap<(Uuid, EntityType, String), Uuid>,
    relationships: HashMap<Uuid, RelationshipRecord>,
    relationship_keys: HashMap<(Uuid, Uuid, Uuid, RelationshipType), Uuid>,
}

/// In-memory store for documents and the knowledge graph.
///
/// Useful for testing and development; data is lost on restart. One mutex
/// guards all state, which both serializes merges per entity key and makes
/// each document-level merge atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        *self.lock() = State::default();
    }

    /// Number of stored documents across all accounts.
    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }

    /// Number of stored entities across all accounts.
    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    /// Number of stored relationships across all accounts.
    pub fn relationship_count(&self) -> usize {
        self.lock().relationships.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("store lock poisoned")
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn store_document(&self, document: &Document) -> Result<Uuid> {
        let mut state = self.lock();
        let key = (
            document.account_id,
            document.provider_message_id.clone(),
        );

        if let Some(&existing_id) = state.documents_by_key.get(&key) {
            // Overwrite-by-id: the canonical id and created_at survive
            let existing = state
                .documents
                .get(&existing_id)
                .map(|d| d.created_at)
                .unwrap_or(document.created_at);
            let mut replacement = document.clone();
            replacement.id = existing_id;
            replacement.created_at = existing;
            state.documents.insert(existing_id, replacement);
            return Ok(existing_id);
        }

        state.documents_by_key.insert(key, document.id);
        state.documents.insert(document.id, document.clone());
        Ok(document.id)
    }

    async fn get_document(
        &self,
        account_id: Uuid,
        provider_message_id: &str,
    ) -> Result<Option<Document>> {
        let state = self.lock();
        Ok(state
            .documents_by_key
            .get(&(account_id, provider_message_id.to_string()))
            .and_then(|id| state.documents.get(id))
            .cloned())
    }

    async fn get_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.lock().documents.get(&id).cloned())
    }

    async fn contains_message(
        &self,
        account_id: Uuid,
        provider_message_id: &str,
    ) -> Result<bool> {
        Ok(self
            .lock()
            .documents_by_key
            .contains_key(&(account_id, provider_message_id.to_string())))
    }

    async fn delete_document(&self, id: Uuid) -> Result<()> {
        let mut state = self.lock();
        let Some(document) = state.documents.remove(&id) else {
            return Ok(());
        };
        state
            .documents_by_key
            .remove(&(document.account_id, document.provider_message_id.clone()));

        // Evidence decrements, never cascade deletes
        for record in state.entities.values_mut() {
            if record.evidence.remove(&id) {
                record.entity.mention_count = record.evidence.len() as u64;
            }
        }
        for record in state.relationships.values_mut() {
            if record.evidence.remove(&id) {
                record.relationship.evidence_count = record.evidence.len() as u64;
            }
        }
        Ok(())
    }

    async fn count_documents(&self, account_id: Uuid) -> Result<u64> {
        Ok(self
            .lock()
            .documents
            .values()
            .filter(|d| d.account_id == account_id)
            .count() as u64)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn merge_document(
        &self,
        account_id: Uuid,
        document_id: Uuid,
        entities: &[CandidateEntity],
        relationships: &[CandidateRelationship],
    ) -> Result<MergeOutcome> {
        // Validate endpoints before touching any state so a bad batch can
        // never commit partially.
        for rel in relationships {
            if rel.source >= entities.len() || rel.target >= entities.len() {
                return Err(ExtractionError::InvalidResponse {
                    reason: format!(
                        "relationship endpoint index out of range: {}..{} of {}",
                        rel.source,
                        rel.target,
                        entities.len()
                    ),
                });
            }
        }

        let mut state = self.lock();
        let mut outcome = MergeOutcome::default();
        let mut entity_ids = Vec::with_capacity(entities.len());

        for candidate in entities {
            let key = (
                account_id,
                candidate.entity_type,
                candidate.normalized_name.clone(),
            );
            let id = match state.entity_keys.get(&key) {
                Some(&id) => {
                    let record = state
                        .entities
                        .get_mut(&id)
                        .expect("entity key index out of sync");
                    if candidate.confidence > record.entity.confidence {
                        record.entity.confidence = candidate.confidence;
                    }
                    if record.evidence.insert(document_id) {
                        record.entity.mention_count = record.evidence.len() as u64;
                        outcome.evidence_added += 1;
                    }
                    outcome.entities_merged += 1;
                    id
                }
                None => {
                    let entity = Entity {
                        id: Uuid::now_v7(),
                        account_id,
                        name: candidate.name.clone(),
                        normalized_name: candidate.normalized_name.clone(),
                        entity_type: candidate.entity_type,
                        confidence: candidate.confidence,
                        mention_count: 1,
                        created_at: Utc::now(),
                    };
                    let id = entity.id;
                    state.entity_keys.insert(key, id);
                    state.entities.insert(
                        id,
                        EntityRecord {
                            entity,
                            evidence: HashSet::from([document_id]),
                        },
                    );
                    outcome.entities_created += 1;
                    outcome.evidence_added += 1;
                    id
                }
            };
            entity_ids.push(id);
        }

        for candidate in relationships {
            let source_id = entity_ids[candidate.source];
            let target_id = entity_ids[candidate.target];
            let key = (
                account_id,
                source_id,
                target_id,
                candidate.relationship_type,
            );
            match state.relationship_keys.get(&key) {
                Some(&id) => {
                    let record = state
                        .relationships
                        .get_mut(&id)
                        .expect("relationship key index out of sync");
                    if candidate.confidence > record.relationship.confidence {
                        record.relationship.confidence = candidate.confidence;
                    }
                    if record.evidence.insert(document_id) {
                        record.relationship.evidence_count = record.evidence.len() as u64;
                        outcome.evidence_added += 1;
                    }
                    outcome.relationships_merged += 1;
                }
                None => {
                    let source_name = state
                        .entities
                        .get(&source_id)
                        .map(|r| r.entity.name.clone())
                        .unwrap_or_default();
                    let target_name = state
                        .entities
                        .get(&target_id)
                        .map(|r| r.entity.name.clone())
                        .unwrap_or_default();
                    let relationship = Relationship {
                        id: Uuid::now_v7(),
                        account_id,
                        source_id,
                        target_id,
                        source_name,
                        target_name,
                        relationship_type: candidate.relationship_type,
                        confidence: candidate.confidence,
                        evidence_count: 1,
                        created_at: Utc::now(),
                    };
                    let id = relationship.id;
                    state.relationship_keys.insert(key, id);
                    state.relationships.insert(
                        id,
                        RelationshipRecord {
                            relationship,
                            evidence: HashSet::from([document_id]),
                        },
                    );
                    outcome.relationships_created += 1;
                    outcome.evidence_added += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn list_entities(
        &self,
        filter: &EntityFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Entity>> {
        let state = self.lock();
        let needle = filter.name_contains.as_ref().map(|s| s.to_lowercase());

        let mut matches: Vec<&Entity> = state
            .entities
            .values()
            .map(|r| &r.entity)
            .filter(|e| e.account_id == filter.account_id)
            .filter(|e| filter.entity_type.map_or(true, |ty| e.entity_type == ty))
            .filter(|e| {
                needle
                    .as_ref()
                    .map_or(true, |n| e.normalized_name.contains(n.as_str()))
            })
            .collect();

        matches.sort_by(|a, b| {
            b.mention_count
                .cmp(&a.mention_count)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(offset)
            .take(clamp_limit(limit))
            .cloned()
            .collect();
        Ok(Page { total, items })
    }

    async fn list_relationships(
        &self,
        filter: &RelationshipFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Page<Relationship>> {
        let state = self.lock();

        let mut matches: Vec<&Relationship> = state
            .relationships
            .values()
            .map(|r| &r.relationship)
            .filter(|r| r.account_id == filter.account_id)
            .filter(|r| {
                filter
                    .entity_id
                    .map_or(true, |id| r.source_id == id || r.target_id == id)
            })
            .filter(|r| {
                filter
                    .relationship_type
                    .map_or(true, |ty| r.relationship_type == ty)
            })
            .collect();

        matches.sort_by(|a, b| {
            b.evidence_count
                .cmp(&a.evidence_count)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(offset)
            .take(clamp_limit(limit))
            .cloned()
            .collect();
        Ok(Page { total, items })
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        Ok(self.lock().entities.get(&id).map(|r| r.entity.clone()))
    }

    async fn stats(&self, account_id: Uuid) -> Result<GraphStats> {
        let state = self.lock();

        let total_documents = state
            .documents
            .values()
            .filter(|d| d.account_id == account_id)
            .count() as u64;

        let mut by_type: HashMap<EntityType, u64> = HashMap::new();
        let mut total_entities = 0;
        for record in state.entities.values() {
            if record.entity.account_id == account_id {
                total_entities += 1;
                *by_type.entry(record.entity.entity_type).or_default() += 1;
            }
        }

        let total_relationships = state
            .relationships
            .values()
            .filter(|r| r.relationship.account_id == account_id)
            .count() as u64;

        Ok(GraphStats {
            total_documents,
            total_entities,
            total_relationships,
            entity_type_counts: EntityType::ALL
                .into_iter()
                .map(|ty| (ty, by_type.get(&ty).copied().unwrap_or(0)))
                .collect(),
        })
    }

    async fn delete_account_data(&self, account_id: Uuid) -> Result<()> {
        let mut state = self.lock();
        state.documents.retain(|_, d| d.account_id != account_id);
        state.documents_by_key.retain(|(acct, _), _| *acct != account_id);
        state
            .entities
            .retain(|_, r| r.entity.account_id != account_id);
        state.entity_keys.retain(|(acct, _, _), _| *acct != account_id);
        state
            .relationships
            .retain(|_, r| r.relationship.account_id != account_id);
        state
            .relationship_keys
            .retain(|(acct, _, _, _), _| *acct != account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::Mailbox;

    fn document(account_id: Uuid, provider_message_id: &str) -> Document {
        Document {
            id: Uuid::now_v7(),
            account_id,
            provider_message_id: provider_message_id.to_string(),
            thread_id: None,
            sender: Mailbox::new("ada@example.com"),
            recipients: vec![],
            cc: vec![],
            sent_at: Utc::now(),
            subject: "subject".to_string(),
            body: "body".to_string(),
            snippet: String::new(),
            attachments: vec![],
            label_ids: vec![],
            created_at: Utc::now(),
        }
    }

    fn person(name: &str, confidence: f32) -> CandidateEntity {
        CandidateEntity::new(name, EntityType::Person, confidence)
    }

    #[tokio::test]
    async fn resync_overwrites_by_id_never_duplicates() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();

        let first = document(account, "m-1");
        let first_id = store.store_document(&first).await.unwrap();

        let mut second = document(account, "m-1");
        second.subject = "updated".to_string();
        let second_id = store.store_document(&second).await.unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(store.count_documents(account).await.unwrap(), 1);
        let stored = store.get_document(account, "m-1").await.unwrap().unwrap();
        assert_eq!(stored.subject, "updated");
        assert_eq!(stored.created_at, first.created_at);
    }

    #[tokio::test]
    async fn entity_merge_takes_max_confidence_and_counts_distinct_docs() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();
        let doc_a = Uuid::now_v7();
        let doc_b = Uuid::now_v7();

        store
            .merge_document(account, doc_a, &[person("Ada", 0.6)], &[])
            .await
            .unwrap();
        store
            .merge_document(account, doc_b, &[person("ada", 0.9)], &[])
            .await
            .unwrap();
        // Retry of doc_b must not double count
        store
            .merge_document(account, doc_b, &[person("Ada", 0.7)], &[])
            .await
            .unwrap();

        let page = store
            .list_entities(&EntityFilter::for_account(account), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        let entity = &page.items[0];
        assert_eq!(entity.mention_count, 2);
        assert_eq!(entity.confidence, 0.9);
        assert_eq!(entity.name, "Ada");
    }

    #[tokio::test]
    async fn relationship_evidence_never_double_counts_a_document() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();
        let doc = Uuid::now_v7();

        let entities = vec![
            person("Ada", 0.9),
            CandidateEntity::new("Acme", EntityType::Organization, 0.8),
        ];
        let rels = vec![CandidateRelationship::new(
            0,
            1,
            RelationshipType::WorksFor,
            0.7,
        )];

        store
            .merge_document(account, doc, &entities, &rels)
            .await
            .unwrap();
        store
            .merge_document(account, doc, &entities, &rels)
            .await
            .unwrap();

        let page = store
            .list_relationships(&RelationshipFilter::for_account(account), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].evidence_count, 1);
        assert_eq!(page.items[0].source_name, "Ada");
        assert_eq!(page.items[0].target_name, "Acme");
    }

    #[tokio::test]
    async fn bad_endpoint_index_commits_nothing() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();

        let err = store
            .merge_document(
                account,
                Uuid::now_v7(),
                &[person("Ada", 0.9)],
                &[CandidateRelationship::new(0, 5, RelationshipType::Mentions, 0.5)],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::InvalidResponse { .. }));
        assert_eq!(store.entity_count(), 0);
        assert_eq!(store.relationship_count(), 0);
    }

    #[tokio::test]
    async fn listing_orders_by_mentions_then_age_and_clamps_limit() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();

        // "busy" gets evidence from two documents, others from one
        for (doc, names) in [
            (Uuid::now_v7(), vec!["busy", "quiet-a"]),
            (Uuid::now_v7(), vec!["busy", "quiet-b"]),
        ] {
            let candidates: Vec<CandidateEntity> =
                names.iter().map(|n| person(n, 0.5)).collect();
            store
                .merge_document(account, doc, &candidates, &[])
                .await
                .unwrap();
        }

        let page = store
            .list_entities(&EntityFilter::for_account(account), 500, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].name, "busy");
        // quiet-a was created before quiet-b; tie broken by age ascending
        assert_eq!(page.items[1].name, "quiet-a");
        assert_eq!(page.items[2].name, "quiet-b");
    }

    #[tokio::test]
    async fn limit_is_clamped_to_max_page_size() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();
        let doc = Uuid::now_v7();

        let candidates: Vec<CandidateEntity> = (0..150)
            .map(|i| person(&format!("person {}", i), 0.5))
            .collect();
        store
            .merge_document(account, doc, &candidates, &[])
            .await
            .unwrap();

        let page = store
            .list_entities(&EntityFilter::for_account(account), 500, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 150);
        assert_eq!(page.items.len(), crate::traits::store::MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn deleting_a_document_decrements_but_keeps_entities() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();

        let doc = document(account, "m-1");
        let doc_id = store.store_document(&doc).await.unwrap();
        store
            .merge_document(account, doc_id, &[person("Ada", 0.9)], &[])
            .await
            .unwrap();

        store.delete_document(doc_id).await.unwrap();

        let page = store
            .list_entities(&EntityFilter::for_account(account), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].mention_count, 0);
        assert_eq!(store.document_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_cascade_removes_all_account_data() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();
        let other = Uuid::now_v7();

        let doc_id = store
            .store_document(&document(account, "m-1"))
            .await
            .unwrap();
        store
            .merge_document(account, doc_id, &[person("Ada", 0.9)], &[])
            .await
            .unwrap();
        let other_doc = store
            .store_document(&document(other, "m-2"))
            .await
            .unwrap();
        store
            .merge_document(other, other_doc, &[person("Grace", 0.9)], &[])
            .await
            .unwrap();

        store.delete_account_data(account).await.unwrap();

        assert_eq!(store.count_documents(account).await.unwrap(), 0);
        let page = store
            .list_entities(&EntityFilter::for_account(account), 10, 0)
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        // Other accounts untouched
        assert_eq!(store.count_documents(other).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stats_reports_per_type_counts() {
        let store = MemoryStore::new();
        let account = Uuid::now_v7();
        let doc_id = store
            .store_document(&document(account, "m-1"))
            .await
            .unwrap();
        store
            .merge_document(
                account,
                doc_id,
                &[
                    person("Ada", 0.9),
                    CandidateEntity::new("Acme", EntityType::Organization, 0.8),
                ],
                &[],
            )
            .await
            .unwrap();

        let stats = store.stats(account).await.unwrap();
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.total_relationships, 0);
        let persons = stats
            .entity_type_counts
            .iter()
            .find(|(ty, _)| *ty == EntityType::Person)
            .unwrap();
        assert_eq!(persons.1, 1);
    }
}

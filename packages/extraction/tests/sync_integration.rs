//! Integration tests for the sync pipeline.
//!
//! These run the full fetch → normalize → extract → merge loop against the
//! in-memory store with mock provider and extractor.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use extraction::testing::{
    malformed_email, raw_email, raw_entity, raw_relationship, MockExtractor, MockFailure,
    MockMailSource,
};
use extraction::{
    run_query, run_sync, EntityFilter, ExtractionError, ExtractionResponse, GraphQueryError,
    GraphStore, MemoryStore, NoopObserver, RelationshipFilter, SyncConfig,
};

fn fast_config(days: u32) -> SyncConfig {
    SyncConfig::new(days).with_retry_backoff(Duration::from_millis(1))
}

fn acme_response() -> ExtractionResponse {
    ExtractionResponse {
        entities: vec![
            raw_entity("Ada Lovelace", "person", 0.9),
            raw_entity("Acme Corp", "company", 0.8),
        ],
        relationships: vec![raw_relationship(
            "Ada Lovelace",
            "Acme Corp",
            "works for",
            0.7,
        )],
    }
}

async fn sync_once(
    account: Uuid,
    config: &SyncConfig,
    source: &MockMailSource,
    extractor: &MockExtractor,
    store: &MemoryStore,
) -> Result<extraction::SyncCounters, ExtractionError> {
    run_sync(
        account,
        config,
        source,
        extractor,
        store,
        &NoopObserver,
        &CancellationToken::new(),
    )
    .await
}

#[tokio::test]
async fn resyncing_the_same_message_yields_one_document() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new().with_message(raw_email(
        "m-1",
        "ada@example.com",
        "hello",
        "body",
    ));
    let extractor = MockExtractor::new();
    let config = fast_config(7);

    let first = sync_once(account, &config, &source, &extractor, &store)
        .await
        .unwrap();
    assert_eq!(first.processed, 1);

    let second = sync_once(account, &config, &source, &extractor, &store)
        .await
        .unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(store.document_count(), 1);

    // Forced re-fetch overwrites in place, still exactly one document
    let forced = fast_config(7).force_refetch();
    sync_once(account, &forced, &source, &extractor, &store)
        .await
        .unwrap();
    assert_eq!(store.document_count(), 1);
}

#[tokio::test]
async fn entities_merge_across_documents_with_max_confidence() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new().with_messages([
        raw_email("m-1", "ada@example.com", "a", "first"),
        raw_email("m-2", "ada@example.com", "b", "second"),
    ]);
    let extractor = MockExtractor::new()
        .with_response(
            "m-1",
            ExtractionResponse {
                entities: vec![raw_entity("Acme Corp", "organization", 0.6)],
                relationships: vec![],
            },
        )
        .with_response(
            "m-2",
            ExtractionResponse {
                entities: vec![raw_entity("ACME CORP", "org", 0.9)],
                relationships: vec![],
            },
        );

    sync_once(account, &fast_config(7), &source, &extractor, &store)
        .await
        .unwrap();

    let page = store
        .list_entities(&EntityFilter::for_account(account), 10, 0)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].mention_count, 2);
    assert_eq!(page.items[0].confidence, 0.9);
}

#[tokio::test]
async fn retried_extraction_does_not_double_count_evidence() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new().with_message(raw_email(
        "m-1",
        "ada@example.com",
        "hello",
        "body",
    ));
    // First attempt fails with Unavailable, retry succeeds
    let extractor = MockExtractor::new()
        .with_default_response(acme_response())
        .unavailable_first("m-1", 1);

    let counters = sync_once(account, &fast_config(7), &source, &extractor, &store)
        .await
        .unwrap();
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.failed, 0);
    assert_eq!(extractor.calls().len(), 2);

    let rels = store
        .list_relationships(&RelationshipFilter::for_account(account), 10, 0)
        .await
        .unwrap();
    assert_eq!(rels.total, 1);
    assert_eq!(rels.items[0].evidence_count, 1);
}

#[tokio::test]
async fn normalization_failures_are_counted_not_fatal() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();

    // 10 messages, 2 of them unparsable
    let mut messages: Vec<_> = (0..8)
        .map(|i| {
            raw_email(
                &format!("ok-{}", i),
                "ada@example.com",
                "subject",
                "body text",
            )
        })
        .collect();
    messages.push(malformed_email("bad-1"));
    messages.push(malformed_email("bad-2"));

    let source = MockMailSource::new().with_messages(messages);
    let extractor = MockExtractor::new();

    let counters = sync_once(account, &fast_config(7), &source, &extractor, &store)
        .await
        .unwrap();

    assert_eq!(counters.processed, 8);
    assert_eq!(counters.failed, 2);
    assert_eq!(store.document_count(), 8);
}

#[tokio::test]
async fn extraction_outage_exhausts_retries_then_fails_the_document() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new().with_message(raw_email(
        "m-1",
        "ada@example.com",
        "hello",
        "body",
    ));
    let extractor = MockExtractor::new().always_unavailable();

    let config = fast_config(7).with_max_extract_attempts(3);
    let counters = sync_once(account, &config, &source, &extractor, &store)
        .await
        .unwrap();

    assert_eq!(counters.processed, 0);
    assert_eq!(counters.failed, 1);
    assert_eq!(extractor.calls().len(), 3);
    // Failed documents are not persisted, so the next sync retries them
    assert_eq!(store.document_count(), 0);
}

#[tokio::test]
async fn auth_expiry_aborts_the_job() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new().with_list_failure(MockFailure::AuthExpired);
    let extractor = MockExtractor::new();

    let err = sync_once(account, &fast_config(7), &source, &extractor, &store)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::AuthExpired(_)));
}

#[tokio::test]
async fn fetch_auth_expiry_mid_run_aborts() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new()
        .with_messages([
            raw_email("m-1", "ada@example.com", "a", "x"),
            raw_email("m-2", "ada@example.com", "b", "y"),
        ])
        .with_fetch_failure("m-2", MockFailure::AuthExpired);
    let extractor = MockExtractor::new();

    let err = sync_once(account, &fast_config(7), &source, &extractor, &store)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::AuthExpired(_)));
}

#[tokio::test]
async fn unavailable_single_message_is_document_scoped() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new()
        .with_messages([
            raw_email("m-1", "ada@example.com", "a", "x"),
            raw_email("m-2", "ada@example.com", "b", "y"),
        ])
        .with_fetch_failure("m-2", MockFailure::MessageUnavailable);
    let extractor = MockExtractor::new();

    let counters = sync_once(account, &fast_config(7), &source, &extractor, &store)
        .await
        .unwrap();
    assert_eq!(counters.processed, 1);
    assert_eq!(counters.failed, 1);
}

#[tokio::test]
async fn cancellation_stops_the_run() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new().with_message(raw_email(
        "m-1",
        "ada@example.com",
        "hello",
        "body",
    ));
    let extractor = MockExtractor::new();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_sync(
        account,
        &fast_config(7),
        &source,
        &extractor,
        &store,
        &NoopObserver,
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ExtractionError::Cancelled));
    assert_eq!(store.document_count(), 0);
}

#[tokio::test]
async fn listing_pages_through_the_whole_window() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let messages: Vec<_> = (0..25)
        .map(|i| raw_email(&format!("m-{}", i), "ada@example.com", "s", "b"))
        .collect();
    let source = MockMailSource::new().with_messages(messages);
    let extractor = MockExtractor::new();

    let config = fast_config(7).with_page_size(10);
    let counters = sync_once(account, &config, &source, &extractor, &store)
        .await
        .unwrap();

    assert_eq!(counters.messages_listed, 25);
    assert_eq!(counters.processed, 25);
    assert_eq!(store.document_count(), 25);
    // 3 list pages of 10, 10, 5
    let lists = source
        .calls()
        .iter()
        .filter(|c| matches!(c, extraction::testing::MockSourceCall::List { .. }))
        .count();
    assert_eq!(lists, 3);
}

#[tokio::test]
async fn synced_graph_answers_queries_and_rejects_mutation() {
    let account = Uuid::now_v7();
    let store = MemoryStore::new();
    let source = MockMailSource::new().with_message(raw_email(
        "m-1",
        "ada@example.com",
        "hello",
        "body",
    ));
    let extractor = MockExtractor::new().with_default_response(acme_response());

    sync_once(account, &fast_config(7), &source, &extractor, &store)
        .await
        .unwrap();

    let rows = run_query(
        &store,
        account,
        "MATCH (n:Person) RETURN n",
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Ada Lovelace");

    let rows = run_query(
        &store,
        account,
        "MATCH (a:Person)-[r:WORKS_FOR]->(b:Organization) RETURN a, r, b",
        Duration::from_secs(5),
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["type"], "works_for");

    let err = run_query(&store, account, "DELETE n", Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphQueryError::Rejected { .. }));
}

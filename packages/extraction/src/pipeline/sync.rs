//! Sync pipeline - fetch, normalize, extract, merge.
//!
//! One `run_sync` call is one sync job. Documents move through the stages
//! with a bounded worker pool so network-bound extraction calls overlap;
//! counters stream to an observer after every document so a job store can
//! expose live progress.
//!
//! Failure scope follows
//! [`ExtractionError::is_document_scoped`](crate::error::ExtractionError::is_document_scoped):
//! document-scoped failures increment `failed` and the run continues;
//! account-level faults stop scheduling, let in-flight documents finish,
//! and abort the run.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ExtractionError, Result};
use crate::normalize::normalize;
use crate::pipeline::transform::transform_response;
use crate::traits::extractor::{ExtractionResponse, Extractor};
use crate::traits::source::MailSource;
use crate::traits::store::{KnowledgeStore, MergeOutcome};
use crate::types::config::SyncConfig;
use crate::types::document::Document;

/// Live progress counters for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    /// Message ids returned by the provider listing
    pub messages_listed: u64,

    /// Messages whose full content was retrieved
    pub fetched: u64,

    /// Messages skipped because they were already stored
    pub skipped: u64,

    /// Documents normalized, extracted and merged successfully
    pub processed: u64,

    /// Documents that failed normalization or extraction
    pub failed: u64,

    /// Entities created or merged across all documents
    pub entities_merged: u64,

    /// Relationships created or merged across all documents
    pub relationships_merged: u64,
}

/// Receives counter snapshots as the run progresses.
#[async_trait]
pub trait SyncObserver: Send + Sync {
    async fn on_progress(&self, counters: &SyncCounters);
}

/// Observer that discards progress.
pub struct NoopObserver;

#[async_trait]
impl SyncObserver for NoopObserver {
    async fn on_progress(&self, _counters: &SyncCounters) {}
}

enum DocumentResult {
    Processed(MergeOutcome),
    Failed(ExtractionError),
    Fatal(ExtractionError),
    /// Cancelled/aborted before work started
    NotStarted,
}

struct DocumentOutcome {
    fetched: bool,
    result: DocumentResult,
}

/// Run one sync: list → fetch → normalize → extract → merge.
///
/// Returns the final counters on completion (including runs with
/// document-scoped failures), [`ExtractionError::Cancelled`] when the token
/// fired, or the account-level fault that stopped the run.
pub async fn run_sync<M, X, S>(
    account_id: Uuid,
    config: &SyncConfig,
    source: &M,
    extractor: &X,
    store: &S,
    observer: &dyn SyncObserver,
    cancel: &CancellationToken,
) -> Result<SyncCounters>
where
    M: MailSource + ?Sized,
    X: Extractor + ?Sized,
    S: KnowledgeStore + ?Sized,
{
    let mut counters = SyncCounters::default();
    let page_size = config.effective_page_size();
    let mut page_token: Option<String> = None;
    // Local token: stops scheduling new documents after an account-level fault
    let abort = CancellationToken::new();
    let mut fatal: Option<ExtractionError> = None;

    info!(
        %account_id,
        days = config.window.days,
        labels = config.window.label_ids.len(),
        page_size,
        "starting sync"
    );

    loop {
        if cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled);
        }

        let page = source
            .list_messages(&config.window, page_size, page_token.as_deref())
            .await?;
        counters.messages_listed += page.ids.len() as u64;

        let mut to_process = Vec::with_capacity(page.ids.len());
        for id in &page.ids {
            if !config.force_refetch && store.contains_message(account_id, id).await? {
                counters.skipped += 1;
            } else {
                to_process.push(id.clone());
            }
        }
        observer.on_progress(&counters).await;

        debug!(
            page_ids = page.ids.len(),
            new = to_process.len(),
            "processing page"
        );

        let mut in_flight = futures::stream::iter(to_process.into_iter().map(|id| {
            let abort = abort.clone();
            async move {
                if abort.is_cancelled() || cancel.is_cancelled() {
                    return DocumentOutcome {
                        fetched: false,
                        result: DocumentResult::NotStarted,
                    };
                }
                process_document(account_id, &id, config, source, extractor, store).await
            }
        }))
        .buffer_unordered(config.concurrency.max(1));

        while let Some(outcome) = in_flight.next().await {
            if outcome.fetched {
                counters.fetched += 1;
            }
            match outcome.result {
                DocumentResult::Processed(merge) => {
                    counters.processed += 1;
                    counters.entities_merged += merge.entities_touched();
                    counters.relationships_merged += merge.relationships_touched();
                }
                DocumentResult::Failed(err) => {
                    counters.failed += 1;
                    warn!(error = %err, "document failed; continuing");
                }
                DocumentResult::Fatal(err) => {
                    if fatal.is_none() {
                        warn!(error = %err, "account-level fault; aborting sync");
                        fatal = Some(err);
                        abort.cancel();
                    }
                }
                DocumentResult::NotStarted => {}
            }
            observer.on_progress(&counters).await;
        }
        drop(in_flight);

        if let Some(err) = fatal.take() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled);
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    info!(
        %account_id,
        processed = counters.processed,
        failed = counters.failed,
        skipped = counters.skipped,
        "sync complete"
    );
    Ok(counters)
}

async fn process_document<M, X, S>(
    account_id: Uuid,
    provider_message_id: &str,
    config: &SyncConfig,
    source: &M,
    extractor: &X,
    store: &S,
) -> DocumentOutcome
where
    M: MailSource + ?Sized,
    X: Extractor + ?Sized,
    S: KnowledgeStore + ?Sized,
{
    let raw = match source.fetch_message(provider_message_id).await {
        Ok(raw) => raw,
        Err(err) => {
            return DocumentOutcome {
                fetched: false,
                result: classify(err),
            }
        }
    };

    let document = match normalize(account_id, &raw) {
        Ok(document) => document,
        Err(err) => {
            return DocumentOutcome {
                fetched: true,
                result: classify(err),
            }
        }
    };

    let response = match extract_with_retry(extractor, &document, config).await {
        Ok(response) => response,
        Err(err) => {
            return DocumentOutcome {
                fetched: true,
                result: classify(err),
            }
        }
    };

    let candidates = transform_response(response);

    // The document is only persisted once extraction succeeded, so an
    // unforced re-sync retries failed messages instead of skipping them.
    let document_id = match store.store_document(&document).await {
        Ok(id) => id,
        Err(err) => {
            return DocumentOutcome {
                fetched: true,
                result: DocumentResult::Fatal(err),
            }
        }
    };

    match store
        .merge_document(
            account_id,
            document_id,
            &candidates.entities,
            &candidates.relationships,
        )
        .await
    {
        Ok(merge) => DocumentOutcome {
            fetched: true,
            result: DocumentResult::Processed(merge),
        },
        Err(err) => DocumentOutcome {
            fetched: true,
            result: DocumentResult::Fatal(err),
        },
    }
}

fn classify(err: ExtractionError) -> DocumentResult {
    if err.is_document_scoped() {
        DocumentResult::Failed(err)
    } else {
        DocumentResult::Fatal(err)
    }
}

async fn extract_with_retry<X>(
    extractor: &X,
    document: &Document,
    config: &SyncConfig,
) -> Result<ExtractionResponse>
where
    X: Extractor + ?Sized,
{
    let max_attempts = config.max_extract_attempts.max(1);
    let mut attempt = 1;
    loop {
        match extractor.extract(document).await {
            Ok(response) => return Ok(response),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = config.retry_backoff * 2u32.saturating_pow(attempt - 1);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "extraction unavailable; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

//! Email Knowledge-Extraction Library
//!
//! A pipeline that turns a mailbox into a knowledge graph: fetch messages
//! from a provider, normalize them into canonical documents, extract
//! entities and relationships through an external LLM, and merge the
//! results into a per-account graph with evidence links back to the source
//! documents.
//!
//! # Design Philosophy
//!
//! - Trait seams at every external boundary (mail provider, LLM, storage)
//! - Merge semantics live in the store so every backend agrees
//! - Per-document failure isolation; only account-level faults abort a sync
//! - The graph query surface is an interpreter, never raw text to a store
//!
//! # Usage
//!
//! ```rust,ignore
//! use extraction::{run_sync, MemoryStore, NoopObserver, SyncConfig};
//! use extraction::testing::{MockExtractor, MockMailSource};
//! use tokio_util::sync::CancellationToken;
//!
//! let store = MemoryStore::new();
//! let source = MockMailSource::new();
//! let extractor = MockExtractor::new();
//!
//! let counters = run_sync(
//!     account_id,
//!     &SyncConfig::new(7),
//!     &source,
//!     &extractor,
//!     &store,
//!     &NoopObserver,
//!     &CancellationToken::new(),
//! )
//! .await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (MailSource, Extractor, stores)
//! - [`types`] - Documents, entities, relationships, sync configuration
//! - [`normalize`] - Raw message to canonical document
//! - [`pipeline`] - Prompts, response transformation, the sync loop
//! - [`graph`] - Restricted read-only query language
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`sources`] - Mail source implementations (GmailSource)
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod graph;
pub mod normalize;
pub mod pipeline;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{ExtractionError, GraphQueryError, QueryResult, Result};
pub use traits::{
    extractor::{ExtractionResponse, Extractor, RawEntity, RawRelationship},
    source::{MailSource, MessagePage},
    store::{
        clamp_limit, DocumentStore, EntityFilter, GraphStats, GraphStore, KnowledgeStore,
        MergeOutcome, Page, RelationshipFilter, MAX_PAGE_SIZE,
    },
};
pub use types::{
    config::{FetchWindow, SyncConfig, MAX_LIST_PAGE_SIZE},
    document::{AttachmentRef, Document, Mailbox, RawMessage, RawPart},
    entity::{normalize_name, CandidateEntity, Entity, EntityType},
    relationship::{CandidateRelationship, Relationship, RelationshipType},
};

// Re-export pipeline entry points
pub use normalize::normalize;
pub use pipeline::{
    extraction_prompt_hash, format_extraction_prompt, run_sync, transform_response,
    NoopObserver, SyncCounters, SyncObserver, TransformOutcome,
};

// Re-export the query interpreter
pub use graph::{run_query, QueryPlan};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

// Re-export sources
#[cfg(feature = "gmail")]
pub use sources::GmailSource;

// Re-export testing utilities
pub use testing::{MockExtractor, MockMailSource};

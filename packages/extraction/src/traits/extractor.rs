//! Extractor trait for LLM entity/relationship extraction.
//!
//! The trait abstracts the external inference service. Implementations are
//! responsible for building the request deterministically from a document
//! and returning the service's response as-is; validation, confidence
//! clamping and type mapping happen afterwards in
//! [`transform_response`](crate::pipeline::transform::transform_response).

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::document::Document;

/// An entity candidate as returned by the extraction service.
///
/// Types are free text and confidence unchecked at this stage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawEntity {
    /// Entity name as it appears in the document
    pub name: String,

    /// Free-text type label (mapped to the closed enum later)
    pub entity_type: String,

    /// Service-reported confidence, nominally in [0, 1]
    pub confidence: f64,

    /// Supporting text span from the document
    pub evidence: Option<String>,
}

/// A relationship candidate as returned by the extraction service.
///
/// Endpoints name entities from the same response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawRelationship {
    /// Name of the source entity
    pub source: String,

    /// Name of the target entity
    pub target: String,

    /// Free-text type label (mapped to the closed enum later)
    pub relationship_type: String,

    /// Service-reported confidence, nominally in [0, 1]
    pub confidence: f64,

    /// Supporting text span from the document
    pub evidence: Option<String>,
}

/// Unvalidated response from the extraction service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResponse {
    pub entities: Vec<RawEntity>,
    pub relationships: Vec<RawRelationship>,
}

impl ExtractionResponse {
    /// Whether the service found nothing.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// External entity/relationship extraction service.
///
/// Implementations map transport and service errors to
/// [`Unavailable`](crate::error::ExtractionError::Unavailable) (retried with
/// backoff by the pipeline) and unusable payloads to
/// [`InvalidResponse`](crate::error::ExtractionError::InvalidResponse).
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract entity and relationship candidates from one document.
    async fn extract(&self, document: &Document) -> Result<ExtractionResponse>;
}

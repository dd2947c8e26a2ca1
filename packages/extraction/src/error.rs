//! Typed errors for the extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can occur during sync and extraction operations.
///
/// The sync pipeline distinguishes document-scoped failures (recorded in the
/// job's failure counter, job continues) from account-level faults (the job
/// aborts). See [`ExtractionError::is_document_scoped`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Required headers missing or unparsable; the message is skipped
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// Extraction service unreachable or returned an error; retried with
    /// backoff before the document is counted failed
    #[error("extraction service unavailable: {0}")]
    Unavailable(String),

    /// Extraction service responded with an unusable shape
    #[error("invalid extraction response: {reason}")]
    InvalidResponse { reason: String },

    /// A single message could not be fetched (deleted, inaccessible)
    #[error("message unavailable: {provider_message_id}")]
    MessageUnavailable { provider_message_id: String },

    /// The stored OAuth credential can no longer be refreshed; the user
    /// must reconnect the account
    #[error("authorization expired: {0}")]
    AuthExpired(String),

    /// Mail provider outage or persistent fault; no further progress possible
    #[error("mail provider error: {0}")]
    Provider(String),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl ExtractionError {
    /// Whether this failure is scoped to a single document.
    ///
    /// Document-scoped failures increment the job's failure counter and the
    /// sync continues; anything else aborts the job.
    pub fn is_document_scoped(&self) -> bool {
        matches!(
            self,
            ExtractionError::MalformedMessage { .. }
                | ExtractionError::Unavailable(_)
                | ExtractionError::InvalidResponse { .. }
                | ExtractionError::MessageUnavailable { .. }
        )
    }

    /// Whether retrying the same operation can succeed (extraction calls only).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractionError::Unavailable(_))
    }

    /// Shorthand for a storage error from any boxed source.
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ExtractionError::Storage(err.into())
    }
}

/// Errors from the restricted graph query language.
#[derive(Debug, Error)]
pub enum GraphQueryError {
    /// Query is empty, malformed, or contains a mutating clause
    #[error("query rejected: {reason}")]
    Rejected { reason: String },

    /// Query exceeded the execution timeout
    #[error("query timed out")]
    Timeout,

    /// Underlying storage failed while executing the query
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<ExtractionError> for GraphQueryError {
    fn from(err: ExtractionError) -> Self {
        GraphQueryError::Storage(Box::new(err))
    }
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Result type alias for graph query operations.
pub type QueryResult<T> = std::result::Result<T, GraphQueryError>;

//! Error types for the Gmail client.

use thiserror::Error;

/// Result type for Gmail client operations.
pub type Result<T> = std::result::Result<T, GmailError>;

/// Gmail client errors.
#[derive(Debug, Error)]
pub enum GmailError {
    /// Configuration error (missing credentials, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, invalid request)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Access token rejected or refresh token no longer valid
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Request was throttled by the API
    #[error("Rate limited by Gmail API")]
    RateLimited,

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl GmailError {
    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GmailError::Network(_) | GmailError::RateLimited)
            || matches!(self, GmailError::Api { status, .. } if *status >= 500)
    }
}

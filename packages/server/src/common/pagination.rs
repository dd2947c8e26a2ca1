//! Offset-based pagination for listing endpoints.
//!
//! Limits are clamped to the server max, never rejected, so oversized
//! requests degrade gracefully.

use extraction::clamp_limit;
use serde::Deserialize;

/// Query parameters shared by listing endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageParams {
    /// Default page size when the client sends none.
    pub const DEFAULT_LIMIT: usize = 20;

    /// Resolve to a concrete `(limit, offset)` pair.
    pub fn resolve(&self) -> (usize, usize) {
        (
            clamp_limit(self.limit.unwrap_or(Self::DEFAULT_LIMIT)),
            self.offset.unwrap_or(0),
        )
    }
}

//! Session options and configuration.

use serde::{Deserialize, Serialize};

/// MIME type assumed for in-memory documents unless overridden.
pub const DEFAULT_FORMAT_HINT: &str = "application/pdf";

/// Options for opening a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Memory budget of the decoded-resource store
    pub cache_budget: CacheBudget,

    /// Format of documents opened from bytes or readers. Content is not
    /// sniffed; callers with other formats must say so here.
    pub format_hint: String,
}

impl SessionOptions {
    /// Create new session options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resource store budget.
    pub fn with_cache_budget(mut self, budget: CacheBudget) -> Self {
        self.cache_budget = budget;
        self
    }

    /// Limit the resource store to `bytes`.
    pub fn with_cache_limit(mut self, bytes: usize) -> Self {
        self.cache_budget = CacheBudget::Bytes(bytes);
        self
    }

    /// Set the MIME type used for in-memory documents.
    pub fn with_format_hint(mut self, mime: impl Into<String>) -> Self {
        self.format_hint = mime.into();
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cache_budget: CacheBudget::Unlimited,
            format_hint: DEFAULT_FORMAT_HINT.to_string(),
        }
    }
}

/// How much decoded data the store may hold before evicting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheBudget {
    /// Never evict during a session. Memory grows with the document.
    #[default]
    Unlimited,
    /// Evict least-recently-used entries above this many bytes
    Bytes(usize),
}

impl CacheBudget {
    /// Byte limit, `None` when unlimited.
    pub fn limit(&self) -> Option<usize> {
        match self {
            CacheBudget::Unlimited => None,
            CacheBudget::Bytes(n) => Some(*n),
        }
    }
}

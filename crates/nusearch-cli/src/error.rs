//! Error types for nusearch-cli

use nusearch_index::ServingError;
use thiserror::Error;

/// Result type alias for nusearch-cli operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nusearch-cli
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from the indexing and search libraries
    #[error(transparent)]
    Core(#[from] nusearch_core::Error),

    /// A search request was answered with an error response
    #[error("Search failed: {0}")]
    Search(ServingError),

    /// Output could not be rendered
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl Error {
    /// Whether re-running the command later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_retryable(),
            Self::Search(e) => e.status == nusearch_index::ServingStatus::ServiceUnavailable,
            Self::Output(_) => false,
        }
    }
}

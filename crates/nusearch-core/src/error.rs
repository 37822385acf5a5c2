//! Error types for NuSearch.
//!
//! One taxonomy covers both the offline indexing pipeline and the online
//! serving path. [`Error::is_retryable`] is the single classification the
//! bulk loader consults when deciding whether to back off and try a batch
//! again.

use std::path::{Path, PathBuf};

/// Errors that can occur while building, promoting, or querying an index.
///
/// All error variants are marked with `#[non_exhaustive]` to allow
/// adding new error types without breaking changes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration value.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// The index definition (analysis or mapping) was rejected.
    #[error("Schema error: {message}")]
    Schema {
        /// Why the definition was rejected
        message: String,
    },

    /// The engine is temporarily unable to serve the request.
    #[error("Engine temporarily unavailable: {message}")]
    Transient {
        /// Engine-supplied reason
        message: String,
    },

    /// Non-retryable failure reported by the engine.
    #[error("Engine error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Engine {
        /// HTTP status, when the engine answered at all
        status: Option<u16>,
        /// Engine-supplied reason
        message: String,
    },

    /// A bulk batch could not be indexed; the whole load is aborted.
    #[error("Load failed at batch {batch} after {attempts} attempt(s): {source}")]
    Load {
        /// Zero-based sequence number of the failing batch
        batch: usize,
        /// Attempts made for the batch, including the first
        attempts: usize,
        /// Last error observed for the batch
        #[source]
        source: Box<Error>,
    },

    /// A record from the package source is invalid.
    #[error("Malformed source record at {location}: {message}")]
    MalformedSource {
        /// `file:line` or another locator for the record
        location: String,
        /// What is wrong with the record
        message: String,
    },

    /// Alias mutation for a new generation failed.
    #[error("Promotion of '{generation}' failed: {message}")]
    Promotion {
        /// Generation that was being promoted
        generation: String,
        /// Why promotion failed
        message: String,
    },

    /// A search request is invalid.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Request field at fault
        field: Option<String>,
        /// What is wrong with it
        message: String,
    },

    /// The engine response did not have the expected structure.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the structural problem
        message: String,
    },

    /// Operation exceeded its deadline.
    #[error("Timed out after {millis}ms")]
    Timeout {
        /// Deadline in milliseconds
        millis: u64,
    },

    /// I/O error with the path involved.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience `Result` type alias for NuSearch operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns whether this error is retryable.
    ///
    /// Retryable errors are transient engine conditions (thread-pool
    /// saturation, node restarts, network hiccups) where the same request
    /// may succeed after a pause.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transient { .. } => true,
            Error::Timeout { .. } => true,
            Error::Io { .. } => true,
            Error::Config { .. } => false,
            Error::Schema { .. } => false,
            Error::Engine { .. } => false,
            Error::Load { .. } => false,
            Error::MalformedSource { .. } => false,
            Error::Promotion { .. } => false,
            Error::InvalidRequest { .. } => false,
            Error::Protocol { .. } => false,
            Error::Serialization(_) => false,
        }
    }

    /// Returns whether this error stems from configuration rather than data
    /// or engine state. Such errors abort a run before documents are touched.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::Schema { .. })
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a new schema error.
    pub fn schema<S: Into<String>>(message: S) -> Self {
        Error::Schema {
            message: message.into(),
        }
    }

    /// Creates a new transient (retryable) engine error.
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Error::Transient {
            message: message.into(),
        }
    }

    /// Creates a new non-retryable engine error.
    pub fn engine<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Error::Engine {
            status,
            message: message.into(),
        }
    }

    /// Creates a new malformed-source error.
    pub fn malformed_source<L, M>(location: L, message: M) -> Self
    where
        L: Into<String>,
        M: Into<String>,
    {
        Error::MalformedSource {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Creates a new promotion error.
    pub fn promotion<G, M>(generation: G, message: M) -> Self
    where
        G: Into<String>,
        M: Into<String>,
    {
        Error::Promotion {
            generation: generation.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid-request error for a specific field.
    pub fn invalid_request<F, M>(field: F, message: M) -> Self
    where
        F: Into<String>,
        M: Into<String>,
    {
        Error::InvalidRequest {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates a new protocol error.
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Creates a new I/O error annotated with the path involved.
    pub fn io_with_path(source: std::io::Error, path: &Path) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

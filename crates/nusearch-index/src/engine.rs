//! Search engine trait and factory.
//!
//! Everything the pipeline and the serving path need from the engine goes
//! through [`SearchEngine`]. Two implementations exist:
//!
//! - `ElasticsearchEngine`: HTTP client for an Elasticsearch cluster
//!   (requires the `elasticsearch` feature)
//! - [`MemoryEngine`](crate::memory::MemoryEngine): in-process engine used
//!   for dry runs and tests
//!
//! # Errors
//!
//! Implementations report retryable conditions (overload, throttling,
//! dropped connections) as `Error::Transient` or `Error::Timeout` so the
//! bulk loader can back off. Everything else is permanent.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use nusearch_core::{EngineConfig, EngineKind, Result};
use serde::{Deserialize, Serialize};

use crate::document::Package;
use crate::memory::MemoryEngine;
use crate::query::SearchSpec;
use crate::schema::IndexDefinition;

/// One step of an atomic alias update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    /// Bind `alias` to `index`.
    Add {
        /// Concrete index name.
        index: String,
        /// Alias name.
        alias: String,
    },
    /// Unbind `alias` from `index`.
    Remove {
        /// Concrete index name.
        index: String,
        /// Alias name.
        alias: String,
    },
}

impl AliasAction {
    /// Bind `alias` to `index`.
    pub fn add(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Add {
            index: index.into(),
            alias: alias.into(),
        }
    }

    /// Unbind `alias` from `index`.
    pub fn remove(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Remove {
            index: index.into(),
            alias: alias.into(),
        }
    }
}

/// Outcome of one accepted bulk request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    /// Documents the engine accepted.
    pub indexed: usize,
}

/// A concrete index and the aliases bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Concrete index name.
    pub name: String,
    /// Aliases currently bound to it.
    pub aliases: BTreeSet<String>,
}

/// Operations the pipeline and the serving path require from an engine.
///
/// Every method is a single engine round-trip; none of them retries.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Engine name for diagnostics.
    fn name(&self) -> &str;

    /// Create a concrete index with the given definition.
    ///
    /// Fails if the index already exists or the definition is rejected.
    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()>;

    /// Index a batch of packages, keyed by package id.
    ///
    /// Any item-level failure fails the whole call; items the engine did
    /// accept stay indexed, and resubmission overwrites them.
    async fn bulk_index(&self, index: &str, packages: &[Package]) -> Result<BulkSummary>;

    /// Make everything indexed so far visible to search and count.
    async fn refresh(&self, index: &str) -> Result<()>;

    /// Number of searchable documents.
    async fn count(&self, index: &str) -> Result<u64>;

    /// Indices `alias` is bound to; empty when the alias does not exist.
    async fn get_alias(&self, alias: &str) -> Result<BTreeSet<String>>;

    /// Apply all actions atomically: either all take effect or none do.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()>;

    /// Delete a concrete index.
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Generations (indices named `<prefix>-...`) with their aliases, oldest first.
    async fn list_generations(&self, prefix: &str) -> Result<Vec<IndexInfo>>;

    /// Execute a search and return the engine's raw response document.
    async fn search(&self, spec: &SearchSpec) -> Result<serde_json::Value>;
}

/// Create an engine client from configuration.
///
/// # Errors
///
/// Returns a configuration error if the configured kind is not compiled in
/// or the client cannot be constructed.
pub fn create_engine(config: &EngineConfig) -> Result<Arc<dyn SearchEngine>> {
    match config.kind {
        EngineKind::Memory => Ok(Arc::new(MemoryEngine::new())),
        #[cfg(feature = "elasticsearch")]
        EngineKind::Elasticsearch => Ok(Arc::new(
            crate::elasticsearch::ElasticsearchEngine::new(config)?,
        )),
        #[cfg(not(feature = "elasticsearch"))]
        EngineKind::Elasticsearch => Err(nusearch_core::Error::config(
            "the elasticsearch engine is not compiled in (enable the `elasticsearch` feature)",
        )),
    }
}

/// Whether `index` is a generation under `prefix`.
pub(crate) fn is_generation_of(index: &str, prefix: &str) -> bool {
    index
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('-'))
}

// ============================================================================
// Tests
// ============================================================================

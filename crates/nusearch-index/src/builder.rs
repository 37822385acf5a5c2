//! Index generation creation.
//!
//! [`IndexBuilder`] creates one new, empty generation with the package
//! definition attached. The definition is validated locally first so a bad
//! analyzer or mapping aborts the run before the engine is touched; an
//! engine rejection is likewise a schema error. Nothing here is retried.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nusearch_index::{GenerationName, IndexBuilder};
//!
//! let builder = IndexBuilder::new(engine.clone(), &config.index);
//! let handle = builder.create_generation(&GenerationName::next("nusearch")).await?;
//! println!("created {}", handle.name);
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nusearch_core::{Error, IndexConfig, Result};

use crate::engine::SearchEngine;
use crate::generation::GenerationName;
use crate::schema::{IndexDefinition, IndexSettings};

/// A generation that exists in the engine and is ready to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationHandle {
    /// Concrete index name.
    pub name: GenerationName,
    /// When the builder created it.
    pub created_at: DateTime<Utc>,
}

/// Creates index generations.
pub struct IndexBuilder {
    engine: Arc<dyn SearchEngine>,
    prefix: String,
    definition: IndexDefinition,
}

impl IndexBuilder {
    /// Create a builder for the package definition with the configured
    /// shard layout.
    pub fn new(engine: Arc<dyn SearchEngine>, config: &IndexConfig) -> Self {
        Self::with_definition(
            engine,
            &config.prefix,
            IndexDefinition::packages(IndexSettings {
                shards: config.shards,
                replicas: config.replicas,
            }),
        )
    }

    /// Create a builder with an explicit definition.
    pub fn with_definition(
        engine: Arc<dyn SearchEngine>,
        prefix: &str,
        definition: IndexDefinition,
    ) -> Self {
        Self {
            engine,
            prefix: prefix.to_string(),
            definition,
        }
    }

    /// The definition every generation is created with.
    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Issue a fresh generation name and create it.
    pub async fn create_next(&self) -> Result<GenerationHandle> {
        self.create_generation(&GenerationName::next(&self.prefix))
            .await
    }

    /// Create generation `name`.
    ///
    /// # Errors
    ///
    /// - `Schema` if the definition is invalid or the engine rejects it
    /// - `Transient`/`Timeout` if the engine could not be reached; these are
    ///   surfaced as-is and not retried
    pub async fn create_generation(&self, name: &GenerationName) -> Result<GenerationHandle> {
        self.definition.validate()?;

        log::info!(
            "Creating generation {} ({} shards, {} replicas)",
            name,
            self.definition.settings.shards,
            self.definition.settings.replicas
        );

        match self
            .engine
            .create_index(name.as_str(), &self.definition)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_retryable() => return Err(e),
            Err(e @ Error::Schema { .. }) => return Err(e),
            Err(e) => {
                return Err(Error::schema(format!(
                    "engine rejected definition for '{name}': {e}"
                )));
            }
        }

        let created_at = name.created_at(&self.prefix).unwrap_or_else(Utc::now);
        log::debug!("Generation {name} created");

        Ok(GenerationHandle {
            name: name.clone(),
            created_at,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

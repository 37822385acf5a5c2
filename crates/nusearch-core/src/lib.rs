//! NuSearch Core: shared errors and configuration.
//!
//! This crate provides the foundational types used across all NuSearch crates.
//! It has no internal NuSearch dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`config`]: Layered configuration (defaults, TOML file, environment)

pub mod config;
pub mod error;

// Re-export key types at crate root for convenience
pub use config::{
    BulkConfig, EngineConfig, EngineKind, IndexConfig, MultipleLivePolicy, NuSearchConfig,
    SearchConfig, SourceConfig,
};
pub use error::{Error, Result};

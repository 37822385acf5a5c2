//! Package indexing and ranked search for NuSearch.
//!
//! Every indexing run builds a complete, timestamped index *generation*,
//! loads it in parallel batches, and only then moves the serving alias onto
//! it. Readers never see a half-built index, and the previous generations
//! stay reachable for rollback until retention prunes them.
//!
//! # Features
//!
//! - `elasticsearch` (default): REST client for an Elasticsearch cluster
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     nusearch-index                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SearchEngine trait                                         │
//! │  ├── ElasticsearchEngine (REST, feature-gated)              │
//! │  └── MemoryEngine (in-process, dry runs and tests)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Indexing                                                   │
//! │  DumpReader ─▶ IndexBuilder ─▶ BulkLoader ─▶ AliasPromoter  │
//! │  (IndexCycle runs all four)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serving                                                    │
//! │  SearchRequest ─▶ QueryBuilder ─▶ engine ─▶ project()       │
//! │  (SearchService runs all three)                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Definitions                                                │
//! │  Package, AnalysisDefinition, IndexDefinition,              │
//! │  GenerationName                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Aliases
//!
//! | Alias | Points at |
//! |-------|-----------|
//! | `nusearch` | the live generation (exactly one after a promotion) |
//! | `nusearch-old` | the generations it replaced, newest kept first |
//!
//! # Example
//!
//! ```rust,ignore
//! use nusearch_core::NuSearchConfig;
//! use nusearch_index::{DumpReader, IndexCycle, SearchRequest, SearchService, create_engine};
//!
//! let config = NuSearchConfig::load(None)?;
//! let engine = create_engine(&config.engine)?;
//!
//! let source = DumpReader::open(&config.source.package_path)?;
//! let report = IndexCycle::new(engine.clone(), &config).run(source).await?;
//! println!("{} is live", report.generation.name);
//!
//! let service = SearchService::new(engine, &config.index.live_alias, &config.search);
//! let results = service.search(&SearchRequest::new("json")).await?;
//! ```

pub mod analysis;
pub mod builder;
pub mod cycle;
pub mod document;
pub mod engine;
pub mod generation;
pub mod latch;
pub mod loader;
pub mod memory;
pub mod projector;
pub mod promoter;
pub mod query;
pub mod schema;
pub mod service;
pub mod source;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

// Re-exports
pub use analysis::{AnalysisDefinition, Analyzer};
pub use builder::{GenerationHandle, IndexBuilder};
pub use cycle::{CycleReport, IndexCycle};
pub use document::{Package, PackageAuthor, PackageDependency, PackageVersion};
pub use engine::{AliasAction, BulkSummary, IndexInfo, SearchEngine, create_engine};
pub use generation::GenerationName;
pub use latch::CountdownLatch;
pub use loader::{BulkLoader, LoadResult};
pub use memory::MemoryEngine;
pub use projector::{PackageHit, SearchResults, project};
pub use promoter::{AliasPromoter, PromotionReport, PruningFailure};
pub use query::{QueryBuilder, SearchRequest, SearchSort, SearchSpec};
pub use schema::{IndexDefinition, IndexSettings};
pub use service::{SearchService, ServingError, ServingStatus};
pub use source::DumpReader;

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::ElasticsearchEngine;

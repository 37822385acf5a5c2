//! Common test utilities and harness for NuSearch integration tests.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use nusearch_core::{NuSearchConfig, Result};
use nusearch_index::{
    CycleReport, IndexCycle, MemoryEngine, Package, PackageVersion, SearchEngine, SearchService,
};

/// Test harness for integration tests.
///
/// Wraps an in-memory engine and a configuration tuned for fast runs
/// (small batches, millisecond backoff).
pub struct TestHarness {
    /// The engine every component talks to.
    pub engine: Arc<MemoryEngine>,
    /// Configuration used for cycles and searches.
    pub config: NuSearchConfig,
}

impl TestHarness {
    /// Creates a harness with an empty engine.
    pub fn new() -> Self {
        let mut config = NuSearchConfig::default();
        config.bulk.batch_size = 4;
        config.bulk.parallelism = 3;
        config.bulk.backoff_ms = 1;
        Self {
            engine: Arc::new(MemoryEngine::new()),
            config,
        }
    }

    /// Creates a harness with a custom retention count.
    pub fn with_retention(retention: usize) -> Self {
        let mut harness = Self::new();
        harness.config.index.retention = retention;
        harness
    }

    /// The engine as a trait object.
    pub fn engine(&self) -> Arc<dyn SearchEngine> {
        self.engine.clone()
    }

    /// Runs one full indexing cycle over `packages`.
    pub async fn index(&self, packages: &[Package]) -> Result<CycleReport> {
        let source: Vec<Result<Package>> = packages.iter().cloned().map(Ok).collect();
        IndexCycle::new(self.engine(), &self.config)
            .run(source)
            .await
    }

    /// A search service over the live alias.
    pub fn service(&self) -> SearchService {
        SearchService::new(
            self.engine(),
            &self.config.index.live_alias,
            &self.config.search,
        )
    }

    /// Generations currently bound to `alias`, sorted.
    pub async fn bound(&self, alias: &str) -> Vec<String> {
        self.engine
            .get_alias(alias)
            .await
            .unwrap()
            .into_iter()
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A version released on `day` of January 2024.
pub fn released(version: &str, day: u32) -> PackageVersion {
    PackageVersion::new(
        version,
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
    )
}

/// A small corpus of realistic packages.
///
/// Every package has exactly one author, so author facet counts add up to
/// the number of matching packages.
pub fn corpus() -> Vec<Package> {
    vec![
        Package::builder("Newtonsoft.Json")
            .summary("Json.NET is a popular high-performance JSON framework for .NET")
            .download_count(1_000)
            .author("James Newton-King")
            .version(released("13.0.1", 3))
            .build(),
        Package::builder("Newtonsoft.Json.Bson")
            .summary("Json.NET BSON adds support for reading and writing BSON")
            .download_count(90_000_000)
            .author("James Newton-King")
            .version(released("1.0.2", 1))
            .build(),
        Package::builder("NodaTime")
            .summary("Date and time API for .NET")
            .download_count(40_000)
            .author("Jon Skeet")
            .version(released("3.1.9", 20))
            .build(),
        Package::builder("NodaTime.Serialization.JsonNet")
            .summary("Json.NET serialization support for NodaTime")
            .download_count(12_000)
            .author("Jon Skeet")
            .version(released("3.0.1", 15))
            .build(),
        Package::builder("Google.Protobuf")
            .summary("Protocol buffers runtime library")
            .download_count(70_000)
            .author("Google Inc.")
            .version(released("3.25.0", 28))
            .build(),
        Package::builder("System.Text.Json")
            .summary("High-performance JSON APIs")
            .download_count(300_000)
            .author("Microsoft")
            .version(released("8.0.0", 10))
            .build(),
    ]
}

/// `count` packages matching the query `widget`, with distinct downloads.
pub fn widgets(count: usize) -> Vec<Package> {
    (0..count)
        .map(|i| {
            Package::builder(format!("Widget{i:03}"))
                .summary("A widget package")
                .download_count(i as u64 * 10)
                .author(format!("Author {}", i % 7))
                .version(released("1.0.0", (i % 28) as u32 + 1))
                .build()
        })
        .collect()
}

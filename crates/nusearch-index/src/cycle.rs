//! One indexing cycle: create, load, promote.
//!
//! Each step runs only if the previous one succeeded, so a generation whose
//! load failed is left in place but never becomes live.

use std::sync::Arc;

use nusearch_core::{NuSearchConfig, Result};

use crate::builder::{GenerationHandle, IndexBuilder};
use crate::document::Package;
use crate::engine::SearchEngine;
use crate::loader::{BulkLoader, LoadResult};
use crate::promoter::{AliasPromoter, PromotionReport};

/// Outcome of a successful cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// The generation that is now live.
    pub generation: GenerationHandle,
    /// Load statistics.
    pub load: LoadResult,
    /// Alias changes and pruning.
    pub promotion: PromotionReport,
}

/// Runs index builder, bulk loader and alias promoter in sequence.
pub struct IndexCycle {
    builder: IndexBuilder,
    loader: BulkLoader,
    promoter: AliasPromoter,
}

impl IndexCycle {
    /// Wire up a cycle against `engine` from configuration.
    pub fn new(engine: Arc<dyn SearchEngine>, config: &NuSearchConfig) -> Self {
        Self {
            builder: IndexBuilder::new(Arc::clone(&engine), &config.index),
            loader: BulkLoader::new(Arc::clone(&engine), &config.bulk),
            promoter: AliasPromoter::new(engine, &config.index),
        }
    }

    /// The promoter, for promoting an existing generation on its own.
    pub fn promoter(&self) -> &AliasPromoter {
        &self.promoter
    }

    /// Build a new generation from `source` and make it live.
    pub async fn run<S>(&self, source: S) -> Result<CycleReport>
    where
        S: IntoIterator<Item = Result<Package>>,
        S::IntoIter: Send + 'static,
    {
        let generation = self.builder.create_next().await?;

        let load = match self.loader.load(&generation.name, source).await {
            Ok(load) => load,
            Err(e) => {
                log::warn!(
                    "Generation {} was not promoted and can be deleted",
                    generation.name
                );
                return Err(e);
            }
        };
        if load.document_count == 0 {
            log::warn!("Generation {} is empty", generation.name);
        }

        let promotion = self.promoter.promote(&generation.name).await?;

        Ok(CycleReport {
            generation,
            load,
            promotion,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use nusearch_core::Error;

    fn config() -> NuSearchConfig {
        let mut config = NuSearchConfig::default();
        config.bulk.batch_size = 3;
        config.bulk.backoff_ms = 1;
        config
    }

    fn packages(n: usize) -> Vec<Result<Package>> {
        (0..n)
            .map(|i| Ok(Package::builder(format!("P{i}")).build()))
            .collect()
    }

    #[tokio::test]
    async fn test_cycle_makes_generation_live() {
        let engine = Arc::new(MemoryEngine::new());
        let cycle = IndexCycle::new(engine.clone(), &config());

        let report = cycle.run(packages(10)).await.unwrap();

        assert_eq!(report.load.document_count, 10);
        assert!(report.promotion.demoted.is_empty());
        let live = engine.get_alias("nusearch").await.unwrap();
        assert!(live.contains(report.generation.name.as_str()));
        assert_eq!(engine.count("nusearch").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_failed_load_is_never_promoted() {
        let engine = Arc::new(MemoryEngine::new());
        let cycle = IndexCycle::new(engine.clone(), &config());
        let first = cycle.run(packages(4)).await.unwrap();

        engine.faults().fail_next_bulk(100);
        let err = cycle.run(packages(4)).await.unwrap_err();

        assert!(matches!(err, Error::Load { .. }));
        let live = engine.get_alias("nusearch").await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(live.contains(first.generation.name.as_str()));
        assert_eq!(engine.list_generations("nusearch").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rerun_replaces_live_generation() {
        let engine = Arc::new(MemoryEngine::new());
        let cycle = IndexCycle::new(engine.clone(), &config());

        let first = cycle.run(packages(5)).await.unwrap();
        let second = cycle.run(packages(7)).await.unwrap();

        assert_eq!(second.promotion.demoted, vec![first.generation.name.to_string()]);
        assert_eq!(engine.count("nusearch").await.unwrap(), 7);
        assert_eq!(engine.count("nusearch-old").await.unwrap(), 5);
    }
}

//! Alias promotion and retention.
//!
//! Serving traffic always queries the live alias. Promoting a generation
//! moves every generation currently bound to live over to the previous
//! alias and binds live to the new one, in a single atomic alias update.
//! Afterwards generations under the previous alias beyond the retention
//! window are deleted, newest kept first.
//!
//! ```text
//!   before                         after promote(G3), retention 2
//!   live     → G2                  live     → G3
//!   previous → G1, G0              previous → G2, G1      (G0 deleted)
//! ```
//!
//! A failed alias update leaves the old bindings untouched and is fatal for
//! the cycle. Failed deletions are only logged and reported; the next
//! promotion tries again.

use std::collections::BTreeSet;
use std::sync::Arc;

use nusearch_core::{Error, IndexConfig, MultipleLivePolicy, Result};

use crate::engine::{AliasAction, SearchEngine};
use crate::generation::GenerationName;

/// A superseded generation that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruningFailure {
    /// Generation that should have been deleted.
    pub generation: String,
    /// Why deletion failed.
    pub message: String,
}

/// What a promotion changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionReport {
    /// Generations moved from live to previous.
    pub demoted: Vec<String>,
    /// Generations kept under the previous alias, newest first.
    pub retained: Vec<String>,
    /// Generations deleted by retention.
    pub deleted: Vec<String>,
    /// Deletions that failed; retried on the next promotion.
    pub pruning_failures: Vec<PruningFailure>,
    /// The generation was already live and nothing changed.
    pub already_live: bool,
}

/// Moves the live alias between generations.
pub struct AliasPromoter {
    engine: Arc<dyn SearchEngine>,
    live_alias: String,
    previous_alias: String,
    retention: usize,
    on_multiple_live: MultipleLivePolicy,
}

impl AliasPromoter {
    /// Create a promoter for the configured aliases and retention.
    pub fn new(engine: Arc<dyn SearchEngine>, config: &IndexConfig) -> Self {
        Self {
            engine,
            live_alias: config.live_alias.clone(),
            previous_alias: config.previous_alias.clone(),
            retention: config.retention,
            on_multiple_live: config.on_multiple_live,
        }
    }

    /// Make `generation` the only generation behind the live alias.
    ///
    /// # Errors
    ///
    /// `Promotion` if the current bindings cannot be read, more than one
    /// generation is live under [`MultipleLivePolicy::Fail`], or the engine
    /// rejects the alias update. In every case the live alias is unchanged.
    pub async fn promote(&self, generation: &GenerationName) -> Result<PromotionReport> {
        let target = generation.as_str();
        let live = self
            .engine
            .get_alias(&self.live_alias)
            .await
            .map_err(|e| Error::promotion(target, format!("reading '{}': {e}", self.live_alias)))?;

        if live.len() == 1 && live.contains(target) {
            log::info!("{target} is already live, nothing to promote");
            return Ok(PromotionReport {
                already_live: true,
                ..Default::default()
            });
        }

        if live.len() > 1 {
            let bound = live.iter().cloned().collect::<Vec<_>>().join(", ");
            match self.on_multiple_live {
                MultipleLivePolicy::Fail => {
                    return Err(Error::promotion(
                        target,
                        format!(
                            "alias '{}' is bound to {} generations ({bound})",
                            self.live_alias,
                            live.len()
                        ),
                    ));
                }
                MultipleLivePolicy::Demote => {
                    log::warn!(
                        "Alias '{}' is bound to {} generations ({bound}); demoting all of them",
                        self.live_alias,
                        live.len()
                    );
                }
            }
        }

        let previous = self
            .engine
            .get_alias(&self.previous_alias)
            .await
            .map_err(|e| {
                Error::promotion(target, format!("reading '{}': {e}", self.previous_alias))
            })?;

        let (actions, demoted) = self.alias_actions(target, &live, &previous);
        self.engine
            .update_aliases(&actions)
            .await
            .map_err(|e| Error::promotion(target, e.to_string()))?;

        if demoted.is_empty() {
            log::info!("Promoted {target} to '{}' (first build)", self.live_alias);
        } else {
            log::info!(
                "Promoted {target} to '{}', moved {} to '{}'",
                self.live_alias,
                demoted.join(", "),
                self.previous_alias
            );
        }

        let mut report = self.prune().await;
        report.demoted = demoted;
        Ok(report)
    }

    fn alias_actions(
        &self,
        target: &str,
        live: &BTreeSet<String>,
        previous: &BTreeSet<String>,
    ) -> (Vec<AliasAction>, Vec<String>) {
        let mut actions = Vec::new();
        let mut demoted = Vec::new();

        for index in live.iter().filter(|index| index.as_str() != target) {
            if !previous.contains(index) {
                actions.push(AliasAction::add(index, &self.previous_alias));
            }
            actions.push(AliasAction::remove(index, &self.live_alias));
            demoted.push(index.clone());
        }
        if previous.contains(target) {
            actions.push(AliasAction::remove(target, &self.previous_alias));
        }
        if !live.contains(target) {
            actions.push(AliasAction::add(target, &self.live_alias));
        }

        (actions, demoted)
    }

    /// Delete generations under the previous alias beyond the retention
    /// window. Never fails; problems end up in the report.
    async fn prune(&self) -> PromotionReport {
        let mut report = PromotionReport::default();

        let previous = match self.engine.get_alias(&self.previous_alias).await {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("Could not list '{}' for pruning: {e}", self.previous_alias);
                report.pruning_failures.push(PruningFailure {
                    generation: self.previous_alias.clone(),
                    message: e.to_string(),
                });
                return report;
            }
        };

        // Generation names sort by creation time.
        let mut by_recency: Vec<String> = previous.into_iter().collect();
        by_recency.sort_unstable_by(|a, b| b.cmp(a));
        let stale = by_recency.split_off(self.retention.min(by_recency.len()));
        report.retained = by_recency;

        for generation in stale {
            match self.engine.delete_index(&generation).await {
                Ok(()) => {
                    log::info!("Deleted superseded generation {generation}");
                    report.deleted.push(generation);
                }
                Err(e) => {
                    log::warn!("Could not delete superseded generation {generation}: {e}");
                    report.pruning_failures.push(PruningFailure {
                        generation,
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use crate::schema::{IndexDefinition, IndexSettings};

    fn set(names: &[&GenerationName]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    async fn generation(engine: &MemoryEngine) -> GenerationName {
        let name = GenerationName::next("nusearch");
        engine
            .create_index(
                name.as_str(),
                &IndexDefinition::packages(IndexSettings {
                    shards: 2,
                    replicas: 0,
                }),
            )
            .await
            .unwrap();
        name
    }

    fn promoter(engine: &Arc<MemoryEngine>) -> AliasPromoter {
        AliasPromoter::new(engine.clone(), &IndexConfig::default())
    }

    #[tokio::test]
    async fn test_first_promotion() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;

        let report = promoter(&engine).promote(&g1).await.unwrap();

        assert!(report.demoted.is_empty());
        assert!(!report.already_live);
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g1]));
        assert!(engine.get_alias("nusearch-old").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_promotion_demotes_previous() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;
        let g2 = generation(&engine).await;
        let promoter = promoter(&engine);

        promoter.promote(&g1).await.unwrap();
        let report = promoter.promote(&g2).await.unwrap();

        assert_eq!(report.demoted, vec![g1.to_string()]);
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g2]));
        assert_eq!(engine.get_alias("nusearch-old").await.unwrap(), set(&[&g1]));
    }

    #[tokio::test]
    async fn test_retention_keeps_newest_two() {
        let engine = Arc::new(MemoryEngine::new());
        let promoter = promoter(&engine);
        let mut names = Vec::new();

        for _ in 0..5 {
            let g = generation(&engine).await;
            promoter.promote(&g).await.unwrap();
            names.push(g);
        }

        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&names[4]]));
        assert_eq!(
            engine.get_alias("nusearch-old").await.unwrap(),
            set(&[&names[3], &names[2]])
        );
        assert!(!engine.index_exists(names[0].as_str()));
        assert!(!engine.index_exists(names[1].as_str()));
    }

    #[tokio::test]
    async fn test_alias_failure_keeps_old_generation_live() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;
        let g2 = generation(&engine).await;
        let promoter = promoter(&engine);
        promoter.promote(&g1).await.unwrap();

        engine.faults().reject_alias_updates(true);
        let err = promoter.promote(&g2).await.unwrap_err();

        assert!(matches!(err, Error::Promotion { .. }));
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g1]));

        // Promotion can be retried on its own.
        engine.faults().reject_alias_updates(false);
        promoter.promote(&g2).await.unwrap();
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g2]));
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported_not_raised() {
        let engine = Arc::new(MemoryEngine::new());
        let promoter = promoter(&engine);
        let mut names = Vec::new();
        for _ in 0..3 {
            let g = generation(&engine).await;
            promoter.promote(&g).await.unwrap();
            names.push(g);
        }

        engine.faults().reject_deletes(true);
        let g4 = generation(&engine).await;
        let report = promoter.promote(&g4).await.unwrap();

        assert_eq!(report.pruning_failures.len(), 1);
        assert_eq!(report.pruning_failures[0].generation, names[0].to_string());
        assert!(report.deleted.is_empty());
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g4]));

        // The next promotion reclaims it.
        engine.faults().reject_deletes(false);
        let g5 = generation(&engine).await;
        let report = promoter.promote(&g5).await.unwrap();
        assert_eq!(report.deleted, vec![names[1].to_string(), names[0].to_string()]);
    }

    #[tokio::test]
    async fn test_multiple_live_demoted_by_default() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;
        let g2 = generation(&engine).await;
        let g3 = generation(&engine).await;
        engine
            .update_aliases(&[
                AliasAction::add(g1.as_str(), "nusearch"),
                AliasAction::add(g2.as_str(), "nusearch"),
            ])
            .await
            .unwrap();

        let report = promoter(&engine).promote(&g3).await.unwrap();

        assert_eq!(report.demoted.len(), 2);
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g3]));
        assert_eq!(engine.get_alias("nusearch-old").await.unwrap(), set(&[&g1, &g2]));
    }

    #[tokio::test]
    async fn test_multiple_live_fails_when_configured() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;
        let g2 = generation(&engine).await;
        let g3 = generation(&engine).await;
        engine
            .update_aliases(&[
                AliasAction::add(g1.as_str(), "nusearch"),
                AliasAction::add(g2.as_str(), "nusearch"),
            ])
            .await
            .unwrap();

        let config = IndexConfig {
            on_multiple_live: MultipleLivePolicy::Fail,
            ..Default::default()
        };
        let err = AliasPromoter::new(engine.clone(), &config)
            .promote(&g3)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Promotion { .. }));
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g1, &g2]));
    }

    #[tokio::test]
    async fn test_promoting_live_generation_is_noop() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;
        let promoter = promoter(&engine);
        promoter.promote(&g1).await.unwrap();

        let report = promoter.promote(&g1).await.unwrap();

        assert!(report.already_live);
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g1]));
    }

    #[tokio::test]
    async fn test_rollback_to_previous_generation() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;
        let g2 = generation(&engine).await;
        let promoter = promoter(&engine);
        promoter.promote(&g1).await.unwrap();
        promoter.promote(&g2).await.unwrap();

        promoter.promote(&g1).await.unwrap();

        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g1]));
        assert_eq!(engine.get_alias("nusearch-old").await.unwrap(), set(&[&g2]));
    }

    #[tokio::test]
    async fn test_unknown_generation_fails_without_change() {
        let engine = Arc::new(MemoryEngine::new());
        let g1 = generation(&engine).await;
        let promoter = promoter(&engine);
        promoter.promote(&g1).await.unwrap();

        let err = promoter
            .promote(&GenerationName::from_existing("nusearch-missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Promotion { .. }));
        assert_eq!(engine.get_alias("nusearch").await.unwrap(), set(&[&g1]));
    }
}

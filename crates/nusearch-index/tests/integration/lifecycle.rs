//! Integration tests for the generation lifecycle: build, promote, prune.

use std::fs;

use nusearch_core::{Error, Result};
use nusearch_index::{
    AliasPromoter, BulkLoader, DumpReader, IndexBuilder, Package, SearchEngine, SearchRequest,
};
use tempfile::TempDir;

use crate::common::{TestHarness, corpus, widgets};

fn source(packages: &[Package]) -> Vec<Result<Package>> {
    packages.iter().cloned().map(Ok).collect()
}

// ----------------------------------------------------------------------------
// Promotion
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_first_build_goes_live() {
    let harness = TestHarness::new();

    let report = harness.index(&corpus()).await.unwrap();

    assert_eq!(
        harness.bound("nusearch").await,
        vec![report.generation.name.to_string()]
    );
    assert!(harness.bound("nusearch-old").await.is_empty());
    assert_eq!(report.load.document_count, corpus().len() as u64);
}

#[tokio::test]
async fn test_rebuild_swaps_live_and_previous() {
    let harness = TestHarness::new();

    let first = harness.index(&corpus()).await.unwrap();
    let second = harness.index(&widgets(9)).await.unwrap();

    assert_eq!(
        harness.bound("nusearch").await,
        vec![second.generation.name.to_string()]
    );
    assert_eq!(
        harness.bound("nusearch-old").await,
        vec![first.generation.name.to_string()]
    );
    assert!(second.generation.name > first.generation.name);

    let results = harness
        .service()
        .search(&SearchRequest::new(""))
        .await
        .unwrap();
    assert_eq!(results.total, 9);
}

#[tokio::test]
async fn test_retention_prunes_oldest_generations() {
    let harness = TestHarness::with_retention(2);

    let mut names = Vec::new();
    for run in 0..5 {
        let report = harness.index(&widgets(run + 1)).await.unwrap();
        names.push(report.generation.name.to_string());
    }

    assert_eq!(harness.bound("nusearch").await, vec![names[4].clone()]);
    assert_eq!(
        harness.bound("nusearch-old").await,
        vec![names[2].clone(), names[3].clone()]
    );

    let remaining: Vec<String> = harness
        .engine
        .list_generations("nusearch")
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(remaining, names[2..].to_vec());
}

#[tokio::test]
async fn test_zero_retention_keeps_only_live() {
    let harness = TestHarness::with_retention(0);

    harness.index(&widgets(1)).await.unwrap();
    let second = harness.index(&widgets(2)).await.unwrap();

    assert_eq!(second.promotion.deleted.len(), 1);
    assert!(harness.bound("nusearch-old").await.is_empty());
    assert_eq!(
        harness.engine.list_generations("nusearch").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_unpromoted_generation_is_invisible() {
    let harness = TestHarness::new();
    harness.index(&corpus()).await.unwrap();

    let builder = IndexBuilder::new(harness.engine(), &harness.config.index);
    let loader = BulkLoader::new(harness.engine(), &harness.config.bulk);
    let next = builder.create_next().await.unwrap();
    loader.load(&next.name, source(&widgets(20))).await.unwrap();

    let service = harness.service();
    let before = service.search(&SearchRequest::new("")).await.unwrap();
    assert_eq!(before.total, corpus().len() as u64);

    AliasPromoter::new(harness.engine(), &harness.config.index)
        .promote(&next.name)
        .await
        .unwrap();
    let after = service.search(&SearchRequest::new("")).await.unwrap();
    assert_eq!(after.total, 20);
}

#[tokio::test]
async fn test_rollback_to_previous_generation() {
    let harness = TestHarness::new();
    let first = harness.index(&corpus()).await.unwrap();
    let second = harness.index(&widgets(3)).await.unwrap();

    let report = AliasPromoter::new(harness.engine(), &harness.config.index)
        .promote(&first.generation.name)
        .await
        .unwrap();

    assert_eq!(report.demoted, vec![second.generation.name.to_string()]);
    assert_eq!(
        harness.bound("nusearch").await,
        vec![first.generation.name.to_string()]
    );
    assert_eq!(
        harness.bound("nusearch-old").await,
        vec![second.generation.name.to_string()]
    );
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_reloading_same_source_is_idempotent() {
    let harness = TestHarness::new();
    let builder = IndexBuilder::new(harness.engine(), &harness.config.index);
    let loader = BulkLoader::new(harness.engine(), &harness.config.bulk);
    let generation = builder.create_next().await.unwrap();

    let first = loader
        .load(&generation.name, source(&widgets(17)))
        .await
        .unwrap();
    let second = loader
        .load(&generation.name, source(&widgets(17)))
        .await
        .unwrap();

    assert_eq!(first.document_count, 17);
    assert_eq!(second.document_count, 17);
}

#[tokio::test]
async fn test_cycle_from_dump_directory() {
    let dir = TempDir::new().unwrap();
    let lines: Vec<String> = corpus()
        .iter()
        .map(|p| serde_json::to_string(p).unwrap())
        .collect();
    fs::write(dir.path().join("01.jsonl"), lines[..3].join("\n")).unwrap();
    fs::write(dir.path().join("02.jsonl"), lines[3..].join("\n")).unwrap();

    let harness = TestHarness::new();
    let reader = DumpReader::open(dir.path()).unwrap();
    let report = nusearch_index::IndexCycle::new(harness.engine(), &harness.config)
        .run(reader)
        .await
        .unwrap();

    assert_eq!(report.load.document_count, corpus().len() as u64);
    let results = harness
        .service()
        .search(&SearchRequest::new("nodatime"))
        .await
        .unwrap();
    assert_eq!(results.hits[0].package.id, "NodaTime");
}

#[tokio::test]
async fn test_transient_bulk_failures_are_retried() {
    let harness = TestHarness::new();
    harness.engine.faults().fail_next_bulk(2);

    let report = harness.index(&widgets(10)).await.unwrap();

    assert_eq!(report.load.retries, 2);
    assert_eq!(report.load.document_count, 10);
}

// ----------------------------------------------------------------------------
// Failures
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_load_keeps_previous_live() {
    let harness = TestHarness::new();
    let first = harness.index(&corpus()).await.unwrap();

    harness.engine.faults().reject_bulk(true);
    let err = harness.index(&widgets(10)).await.unwrap_err();

    assert!(matches!(err, Error::Load { .. }));
    assert_eq!(
        harness.bound("nusearch").await,
        vec![first.generation.name.to_string()]
    );
    let results = harness
        .service()
        .search(&SearchRequest::new(""))
        .await
        .unwrap();
    assert_eq!(results.total, corpus().len() as u64);
}

#[tokio::test]
async fn test_malformed_record_aborts_load() {
    let harness = TestHarness::new();
    let mut records = source(&widgets(8));
    records.insert(5, Err(Error::malformed_source("dump.jsonl:6", "expected value")));

    let err = nusearch_index::IndexCycle::new(harness.engine(), &harness.config)
        .run(records)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedSource { .. }));
    assert!(harness.bound("nusearch").await.is_empty());
}

#[tokio::test]
async fn test_rejected_alias_update_leaves_live_unchanged() {
    let harness = TestHarness::new();
    let first = harness.index(&corpus()).await.unwrap();

    harness.engine.faults().reject_alias_updates(true);
    let err = harness.index(&widgets(4)).await.unwrap_err();

    assert!(matches!(err, Error::Promotion { .. }));
    assert_eq!(
        harness.bound("nusearch").await,
        vec![first.generation.name.to_string()]
    );
    assert!(harness.bound("nusearch-old").await.is_empty());
}

#[tokio::test]
async fn test_failed_prune_is_retried_next_promotion() {
    let harness = TestHarness::with_retention(0);
    let first = harness.index(&widgets(1)).await.unwrap();

    harness.engine.faults().reject_deletes(true);
    let second = harness.index(&widgets(2)).await.unwrap();
    assert_eq!(second.promotion.pruning_failures.len(), 1);
    assert_eq!(
        second.promotion.pruning_failures[0].generation,
        first.generation.name.to_string()
    );
    assert_eq!(
        harness.bound("nusearch").await,
        vec![second.generation.name.to_string()]
    );

    harness.engine.faults().reject_deletes(false);
    let third = harness.index(&widgets(3)).await.unwrap();
    assert_eq!(
        third.promotion.deleted,
        vec![
            second.generation.name.to_string(),
            first.generation.name.to_string(),
        ]
    );
}

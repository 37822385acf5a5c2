//! Handlers for the indexing and search commands.
//!
//! Each handler loads nothing itself: it receives the resolved
//! [`NuSearchConfig`] and an engine, so tests can drive them against the
//! in-memory engine.

use std::path::PathBuf;
use std::sync::Arc;

use nusearch_core::{EngineKind, NuSearchConfig};
use nusearch_index::{
    AliasPromoter, CycleReport, DumpReader, GenerationName, IndexCycle, IndexInfo,
    PromotionReport, SearchEngine, SearchRequest, SearchResults, SearchService, SearchSort,
    create_engine,
};

use crate::error::{Error, Result};

/// Options of the `index` command.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Dump directory; `source.package_path` when `None`.
    pub source_dir: Option<PathBuf>,
    /// Package limit; `source.limit` when `None`.
    pub limit: Option<usize>,
    /// Use the in-memory engine.
    pub dry_run: bool,
}

/// Options of the `search` command.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Free-text query.
    pub query: String,
    /// 1-based page.
    pub page: usize,
    /// Page size; `search.default_page_size` when `None`.
    pub page_size: Option<usize>,
    /// Ordering.
    pub sort: SearchSort,
    /// Exact author filter.
    pub author: Option<String>,
}

/// Connect to the configured engine, or an in-memory one for dry runs.
pub fn connect(config: &NuSearchConfig, dry_run: bool) -> Result<Arc<dyn SearchEngine>> {
    let mut engine_config = config.engine.clone();
    if dry_run {
        engine_config.kind = EngineKind::Memory;
    }
    let engine = create_engine(&engine_config)?;
    tracing::debug!(engine = engine.name(), url = %engine_config.url, "Engine client ready");
    Ok(engine)
}

// ============================================================================
// index
// ============================================================================

/// Run one full indexing cycle.
pub async fn cmd_index(
    engine: Arc<dyn SearchEngine>,
    config: &NuSearchConfig,
    options: &IndexOptions,
) -> Result<CycleReport> {
    let source_dir = options
        .source_dir
        .clone()
        .unwrap_or_else(|| config.source.package_path.clone());
    let limit = options.limit.or(config.source.limit);

    tracing::info!(source = %source_dir.display(), ?limit, "Starting indexing cycle");
    let reader = DumpReader::open(&source_dir)?.with_limit(limit);
    let report = IndexCycle::new(engine, config).run(reader).await?;

    println!("{}", describe_cycle(&report));
    Ok(report)
}

/// Human-readable summary of a cycle.
pub fn describe_cycle(report: &CycleReport) -> String {
    let mut lines = vec![
        format!("Generation {} is live", report.generation.name),
        format!(
            "  loaded {} packages in {} batches ({} retries) in {:.1}s",
            report.load.document_count,
            report.load.batches,
            report.load.retries,
            report.load.elapsed.as_secs_f64()
        ),
    ];
    lines.extend(describe_promotion(&report.promotion));
    lines.join("\n")
}

// ============================================================================
// promote
// ============================================================================

/// Promote an existing generation.
pub async fn cmd_promote(
    engine: Arc<dyn SearchEngine>,
    config: &NuSearchConfig,
    generation: &str,
) -> Result<PromotionReport> {
    let name = GenerationName::from_existing(generation);
    let known = engine.list_generations(&config.index.prefix).await?;
    if !known.iter().any(|g| g.name == generation) {
        return Err(nusearch_core::Error::promotion(
            generation,
            format!("no generation named '{generation}'"),
        )
        .into());
    }

    let report = AliasPromoter::new(engine, &config.index)
        .promote(&name)
        .await?;

    if report.already_live {
        println!("{generation} is already live");
    } else {
        println!("Generation {generation} is live");
        for line in describe_promotion(&report) {
            println!("{line}");
        }
    }
    Ok(report)
}

fn describe_promotion(report: &PromotionReport) -> Vec<String> {
    let mut lines = Vec::new();
    if !report.demoted.is_empty() {
        lines.push(format!("  demoted: {}", report.demoted.join(", ")));
    }
    if !report.retained.is_empty() {
        lines.push(format!("  retained: {}", report.retained.join(", ")));
    }
    if !report.deleted.is_empty() {
        lines.push(format!("  deleted: {}", report.deleted.join(", ")));
    }
    for failure in &report.pruning_failures {
        lines.push(format!(
            "  could not delete {}: {}",
            failure.generation, failure.message
        ));
    }
    lines
}

// ============================================================================
// generations
// ============================================================================

/// List generations with their aliases.
pub async fn cmd_generations(
    engine: Arc<dyn SearchEngine>,
    config: &NuSearchConfig,
) -> Result<Vec<IndexInfo>> {
    let generations = engine.list_generations(&config.index.prefix).await?;
    if generations.is_empty() {
        println!("No generations with prefix '{}'", config.index.prefix);
    }
    for line in describe_generations(&generations) {
        println!("{line}");
    }
    Ok(generations)
}

/// One line per generation: name and bound aliases.
pub fn describe_generations(generations: &[IndexInfo]) -> Vec<String> {
    let width = generations.iter().map(|g| g.name.len()).max().unwrap_or(0);
    generations
        .iter()
        .map(|g| {
            let aliases = g.aliases.iter().cloned().collect::<Vec<_>>().join(", ");
            format!("{:width$}  {aliases}", g.name).trim_end().to_string()
        })
        .collect()
}

// ============================================================================
// search
// ============================================================================

/// Run one query against the live alias and print the results as JSON.
pub async fn cmd_search(
    engine: Arc<dyn SearchEngine>,
    config: &NuSearchConfig,
    options: &SearchOptions,
) -> Result<SearchResults> {
    let mut request = SearchRequest::new(options.query.clone())
        .with_page(
            options.page,
            options.page_size.unwrap_or(config.search.default_page_size),
        )
        .with_sort(options.sort);
    if let Some(author) = &options.author {
        request = request.with_author(author.clone());
    }

    let service = SearchService::new(engine, &config.index.live_alias, &config.search);
    let results = service.respond(&request).await.map_err(Error::Search)?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(results)
}

// ============================================================================
// Tests
// ============================================================================

//! In-process search engine.
//!
//! `MemoryEngine` implements [`SearchEngine`] over plain maps. It honours
//! the parts of the engine contract the pipeline and the ranking model rely
//! on:
//!
//! - index creation with a stored definition, documents keyed by id
//! - refresh semantics: bulk writes stay invisible to search and count until
//!   the index is refreshed
//! - atomic alias updates (validated in full before anything is applied)
//! - the query AST evaluated with the index's own analyzers, a constant
//!   per-term weight, `field_value_factor` capped by `max_boost`, nested
//!   queries (average score), nested sorting and nested terms aggregations
//!
//! Scores are not BM25; they are simple enough to reason about in tests and
//! preserve the orderings the relevance model is built around.
//!
//! [`Faults`] injects engine failures and [`EngineStats`] records bulk
//! traffic, so retry, concurrency and failure paths can be exercised.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use nusearch_core::{Error, Result};
use serde_json::{Map, Value, json};

use crate::analysis::{AnalysisDefinition, STANDARD_ANALYZER};
use crate::document::Package;
use crate::engine::{AliasAction, BulkSummary, IndexInfo, SearchEngine, is_generation_of};
use crate::query::{
    Aggregation, BoolQuery, Operator, Query, ScoreFunction, SearchSpec, SortField, SortMode,
    SortOrder,
};
use crate::schema::{FieldMapping, IndexDefinition, Mapping};

// ============================================================================
// Fault injection and statistics
// ============================================================================

/// Switches for simulating engine failures.
#[derive(Debug, Default)]
pub struct Faults {
    transient_bulk_failures: AtomicUsize,
    reject_bulk: AtomicBool,
    reject_alias_updates: AtomicBool,
    reject_deletes: AtomicBool,
    create_transient: AtomicBool,
    search_transient: AtomicBool,
    bulk_latency_ms: AtomicU64,
    search_latency_ms: AtomicU64,
}

impl Faults {
    /// Fail the next `count` bulk requests with a transient error.
    pub fn fail_next_bulk(&self, count: usize) {
        self.transient_bulk_failures
            .store(count, AtomicOrdering::SeqCst);
    }

    /// Reject every bulk request with a non-retryable error.
    pub fn reject_bulk(&self, reject: bool) {
        self.reject_bulk.store(reject, AtomicOrdering::SeqCst);
    }

    /// Reject every alias update.
    pub fn reject_alias_updates(&self, reject: bool) {
        self.reject_alias_updates
            .store(reject, AtomicOrdering::SeqCst);
    }

    /// Reject every index deletion.
    pub fn reject_deletes(&self, reject: bool) {
        self.reject_deletes.store(reject, AtomicOrdering::SeqCst);
    }

    /// Fail index creation with a transient error.
    pub fn fail_create_transiently(&self, fail: bool) {
        self.create_transient.store(fail, AtomicOrdering::SeqCst);
    }

    /// Fail searches with a transient error.
    pub fn fail_search_transiently(&self, fail: bool) {
        self.search_transient.store(fail, AtomicOrdering::SeqCst);
    }

    /// Delay every bulk request.
    pub fn bulk_latency(&self, latency: Duration) {
        self.bulk_latency_ms
            .store(latency.as_millis() as u64, AtomicOrdering::SeqCst);
    }

    /// Delay every search.
    pub fn search_latency(&self, latency: Duration) {
        self.search_latency_ms
            .store(latency.as_millis() as u64, AtomicOrdering::SeqCst);
    }

    fn take_bulk_failure(&self) -> bool {
        self.transient_bulk_failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }
}

/// Bulk traffic observed by the engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    bulk_requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl EngineStats {
    /// Bulk requests received, including failed ones.
    pub fn bulk_requests(&self) -> usize {
        self.bulk_requests.load(AtomicOrdering::SeqCst)
    }

    /// Highest number of bulk requests in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(AtomicOrdering::SeqCst)
    }

    /// Size of every bulk request received, in arrival order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug)]
struct StoredIndex {
    definition: IndexDefinition,
    visible: BTreeMap<String, Value>,
    pending: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Clone)]
struct Aliases(BTreeMap<String, BTreeSet<String>>);

impl Aliases {
    fn bound_to(&self, index: &str) -> BTreeSet<String> {
        self.0
            .iter()
            .filter(|(_, indices)| indices.contains(index))
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    fn drop_index(&mut self, index: &str) {
        for indices in self.0.values_mut() {
            indices.remove(index);
        }
        self.0.retain(|_, indices| !indices.is_empty());
    }
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, StoredIndex>,
    aliases: Aliases,
}

impl State {
    fn resolve(&self, name: &str) -> Result<Vec<String>> {
        if self.indices.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        match self.aliases.0.get(name) {
            Some(indices) => Ok(indices.iter().cloned().collect()),
            None => Err(index_not_found(name)),
        }
    }

    fn resolve_single(&self, name: &str) -> Result<String> {
        let mut indices = self.resolve(name)?;
        if indices.len() != 1 {
            return Err(Error::engine(
                Some(400),
                format!("alias [{name}] has more than one index associated with it"),
            ));
        }
        Ok(indices.remove(0))
    }

    fn stored(&self, name: &str) -> Result<&StoredIndex> {
        self.indices.get(name).ok_or_else(|| index_not_found(name))
    }
}

fn index_not_found(name: &str) -> Error {
    Error::engine(Some(404), format!("no such index [{name}]"))
}

/// In-process engine for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: RwLock<State>,
    faults: Faults,
    stats: EngineStats,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault injection switches.
    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Bulk traffic statistics.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Whether a concrete index exists.
    pub fn index_exists(&self, index: &str) -> bool {
        self.read().indices.contains_key(index)
    }

    /// Definition an index was created with.
    pub fn definition(&self, index: &str) -> Option<IndexDefinition> {
        self.read()
            .indices
            .get(index)
            .map(|stored| stored.definition.clone())
    }

    /// Documents written but not yet refreshed.
    pub fn pending_count(&self, index: &str) -> usize {
        self.read()
            .indices
            .get(index)
            .map(|stored| stored.pending.len())
            .unwrap_or(0)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_batch(&self, index: &str, packages: &[Package]) -> Result<BulkSummary> {
        if self.faults.reject_bulk.load(AtomicOrdering::SeqCst) {
            return Err(Error::engine(
                Some(400),
                "mapper_parsing_exception: failed to parse document",
            ));
        }
        if self.faults.take_bulk_failure() {
            return Err(Error::transient(
                "es_rejected_execution_exception: bulk queue is full",
            ));
        }

        let mut documents = Vec::with_capacity(packages.len());
        for package in packages {
            if package.id.trim().is_empty() {
                return Err(Error::engine(Some(400), "document id is missing"));
            }
            documents.push((package.id.clone(), serde_json::to_value(package)?));
        }

        let mut state = self.write();
        let target = state.resolve_single(index)?;
        let stored = state
            .indices
            .get_mut(&target)
            .ok_or_else(|| index_not_found(&target))?;
        for (id, document) in documents {
            stored.pending.insert(id, document);
        }
        Ok(BulkSummary {
            indexed: packages.len(),
        })
    }
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        if self.faults.create_transient.load(AtomicOrdering::SeqCst) {
            return Err(Error::transient("cluster is not ready"));
        }
        definition
            .validate()
            .map_err(|e| Error::engine(Some(400), e.to_string()))?;

        let mut state = self.write();
        if state.indices.contains_key(index) || state.aliases.0.contains_key(index) {
            return Err(Error::engine(
                Some(400),
                format!("resource_already_exists_exception: index [{index}] already exists"),
            ));
        }
        state.indices.insert(
            index.to_string(),
            StoredIndex {
                definition: definition.clone(),
                visible: BTreeMap::new(),
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn bulk_index(&self, index: &str, packages: &[Package]) -> Result<BulkSummary> {
        self.stats.bulk_requests.fetch_add(1, AtomicOrdering::SeqCst);
        self.stats
            .batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(packages.len());
        let current = self.stats.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        self.stats
            .max_in_flight
            .fetch_max(current, AtomicOrdering::SeqCst);

        let latency = self.faults.bulk_latency_ms.load(AtomicOrdering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let result = self.write_batch(index, packages);

        self.stats.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        result
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let mut state = self.write();
        for target in state.resolve(index)? {
            if let Some(stored) = state.indices.get_mut(&target) {
                let pending = std::mem::take(&mut stored.pending);
                stored.visible.extend(pending);
            }
        }
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64> {
        let state = self.read();
        let mut total = 0;
        for target in state.resolve(index)? {
            total += state.stored(&target)?.visible.len() as u64;
        }
        Ok(total)
    }

    async fn get_alias(&self, alias: &str) -> Result<BTreeSet<String>> {
        Ok(self.read().aliases.0.get(alias).cloned().unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()> {
        if self.faults.reject_alias_updates.load(AtomicOrdering::SeqCst) {
            return Err(Error::engine(Some(500), "alias update rejected"));
        }

        let mut state = self.write();
        let mut aliases = state.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    if !state.indices.contains_key(index) {
                        return Err(index_not_found(index));
                    }
                    if state.indices.contains_key(alias) {
                        return Err(Error::engine(
                            Some(400),
                            format!("invalid_alias_name_exception: an index exists with the same name as the alias [{alias}]"),
                        ));
                    }
                    aliases.0.entry(alias.clone()).or_default().insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    let removed = aliases
                        .0
                        .get_mut(alias)
                        .is_some_and(|indices| indices.remove(index));
                    if !removed {
                        return Err(Error::engine(
                            Some(404),
                            format!("aliases [{alias}] missing on index [{index}]"),
                        ));
                    }
                }
            }
        }
        aliases.0.retain(|_, indices| !indices.is_empty());
        state.aliases = aliases;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        if self.faults.reject_deletes.load(AtomicOrdering::SeqCst) {
            return Err(Error::engine(
                Some(403),
                format!("cluster_block_exception: index [{index}] is read-only"),
            ));
        }
        let mut state = self.write();
        if state.indices.remove(index).is_none() {
            return Err(index_not_found(index));
        }
        state.aliases.drop_index(index);
        Ok(())
    }

    async fn list_generations(&self, prefix: &str) -> Result<Vec<IndexInfo>> {
        let state = self.read();
        Ok(state
            .indices
            .keys()
            .filter(|name| is_generation_of(name, prefix))
            .map(|name| IndexInfo {
                name: name.clone(),
                aliases: state.aliases.bound_to(name),
            })
            .collect())
    }

    async fn search(&self, spec: &SearchSpec) -> Result<Value> {
        let latency = self.faults.search_latency_ms.load(AtomicOrdering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.faults.search_transient.load(AtomicOrdering::SeqCst) {
            return Err(Error::transient("search thread pool is saturated"));
        }

        let state = self.read();
        let mut targets = Vec::new();
        for target in state.resolve(&spec.index)? {
            let stored = state.stored(&target)?;
            let evaluator = Evaluator {
                mapping: &stored.definition.mapping,
                analysis: &stored.definition.analysis,
            };
            targets.push((target, stored, evaluator));
        }

        let mut matches = Vec::new();
        for (target, stored, evaluator) in &targets {
            for (id, document) in &stored.visible {
                if let Some(score) = evaluator.score(&spec.query, document, &[])? {
                    matches.push(Match {
                        index: target,
                        id,
                        document,
                        score,
                        keys: spec
                            .sort
                            .iter()
                            .map(|sort| sort_key(evaluator, sort, document))
                            .collect(),
                        evaluator,
                    });
                }
            }
        }
        matches.sort_by(|a, b| compare_matches(a, b, &spec.sort));

        let scoped: Vec<(&Evaluator<'_>, &Value)> =
            matches.iter().map(|m| (m.evaluator, m.document)).collect();
        let mut aggregations = Map::new();
        for aggregation in &spec.aggregations {
            let (name, value) = aggregate(aggregation, &scoped, &[]);
            aggregations.insert(name, value);
        }

        let sorted = !spec.sort.is_empty();
        let max_score = if sorted {
            None
        } else {
            matches.iter().map(|m| m.score).reduce(f64::max)
        };
        let hits: Vec<Value> = matches
            .iter()
            .skip(spec.from)
            .take(spec.size)
            .map(|m| hit(m, sorted))
            .collect();

        let mut response = json!({
            "took": 1,
            "timed_out": false,
            "hits": {
                "total": { "value": matches.len(), "relation": "eq" },
                "max_score": max_score,
                "hits": hits,
            },
        });
        if !aggregations.is_empty() {
            response["aggregations"] = Value::Object(aggregations);
        }
        Ok(response)
    }
}

fn hit(m: &Match<'_>, sorted: bool) -> Value {
    let mut hit = Map::new();
    hit.insert("_index".to_string(), json!(m.index));
    hit.insert("_id".to_string(), json!(m.id));
    if sorted {
        hit.insert("_score".to_string(), Value::Null);
        hit.insert(
            "sort".to_string(),
            m.keys.iter().map(|k| k.map_or(Value::Null, |v| json!(v))).collect(),
        );
    } else {
        hit.insert("_score".to_string(), json!(m.score));
    }
    hit.insert("_source".to_string(), m.document.clone());
    Value::Object(hit)
}

// ============================================================================
// Query evaluation
// ============================================================================

struct Match<'a> {
    index: &'a str,
    id: &'a str,
    document: &'a Value,
    score: f64,
    keys: Vec<Option<f64>>,
    evaluator: &'a Evaluator<'a>,
}

struct Evaluator<'a> {
    mapping: &'a Mapping,
    analysis: &'a AnalysisDefinition,
}

impl Evaluator<'_> {
    /// Score of `query` against `document`, or `None` if it does not match.
    ///
    /// `scope` is the nested path `document` lives at; field paths in the
    /// query are always absolute.
    fn score(&self, query: &Query, document: &Value, scope: &[&str]) -> Result<Option<f64>> {
        match query {
            Query::MatchAll => Ok(Some(1.0)),
            Query::Match {
                field,
                query,
                boost,
            } => Ok(self
                .field_score(field, query, Operator::Or, document, scope)?
                .map(|s| s * boost.unwrap_or(1.0))),
            Query::MultiMatch {
                fields,
                query,
                operator,
            } => {
                let mut best: Option<f64> = None;
                for field in fields {
                    if let Some(s) =
                        self.field_score(&field.field, query, *operator, document, scope)?
                    {
                        let s = s * field.boost;
                        best = Some(best.map_or(s, |b| b.max(s)));
                    }
                }
                Ok(best)
            }
            Query::FunctionScore {
                query,
                function,
                max_boost,
            } => {
                let Some(base) = self.score(query, document, scope)? else {
                    return Ok(None);
                };
                let ScoreFunction::FieldValueFactor {
                    field,
                    factor,
                    missing,
                } = function;
                let value = self
                    .values(field, document, scope)
                    .into_iter()
                    .find_map(Value::as_f64)
                    .or(*missing)
                    .ok_or_else(|| {
                        Error::engine(Some(400), format!("missing value for field [{field}]"))
                    })?;
                Ok(Some(base * (factor * value).min(*max_boost)))
            }
            Query::Term { field, value } => {
                let matched = match self.mapping.resolve(field).map(|r| r.mapping) {
                    Some(FieldMapping::Text { .. }) => {
                        self.field_tokens(field, document, scope)?.contains(value)
                    }
                    Some(_) => self
                        .values(field, document, scope)
                        .into_iter()
                        .any(|v| scalar_string(v).as_deref() == Some(value.as_str())),
                    None => false,
                };
                Ok(matched.then_some(1.0))
            }
            Query::Nested { path, query } => {
                let Some(relative) = relative_segments(path, scope) else {
                    return Ok(None);
                };
                let inner_scope: Vec<&str> = path.split('.').collect();
                let mut sub_documents = Vec::new();
                collect_values(document, &relative, &mut sub_documents);

                let mut total = 0.0;
                let mut matched = 0usize;
                for sub_document in sub_documents {
                    if let Some(s) = self.score(query, sub_document, &inner_scope)? {
                        total += s;
                        matched += 1;
                    }
                }
                Ok((matched > 0).then(|| total / matched as f64))
            }
            Query::Bool(bool_query) => self.bool_score(bool_query, document, scope),
        }
    }

    fn bool_score(&self, query: &BoolQuery, document: &Value, scope: &[&str]) -> Result<Option<f64>> {
        let mut score = 0.0;
        for clause in &query.must {
            match self.score(clause, document, scope)? {
                Some(s) => score += s,
                None => return Ok(None),
            }
        }
        for clause in &query.filter {
            if self.score(clause, document, scope)?.is_none() {
                return Ok(None);
            }
        }
        for clause in &query.must_not {
            if self.score(clause, document, scope)?.is_some() {
                return Ok(None);
            }
        }

        let mut should_matched = 0;
        for clause in &query.should {
            if let Some(s) = self.score(clause, document, scope)? {
                score += s;
                should_matched += 1;
            }
        }
        let required = query.minimum_should_match.unwrap_or(
            if query.must.is_empty() && query.filter.is_empty() && !query.should.is_empty() {
                1
            } else {
                0
            },
        );
        if should_matched < required {
            return Ok(None);
        }
        Ok(Some(score))
    }

    /// Per-term score of analyzed `text` against one field.
    fn field_score(
        &self,
        field: &str,
        text: &str,
        operator: Operator,
        document: &Value,
        scope: &[&str],
    ) -> Result<Option<f64>> {
        let Some(resolved) = self.mapping.resolve(field) else {
            return Ok(None);
        };

        let (query_terms, document_terms): (Vec<String>, HashSet<String>) =
            match resolved.mapping {
                FieldMapping::Text { analyzer, .. } => {
                    let analyzer = self
                        .analysis
                        .analyzer(analyzer.as_deref().unwrap_or(STANDARD_ANALYZER))
                        .map_err(|e| Error::engine(Some(400), e.to_string()))?;
                    let mut terms = analyzer.analyze(text);
                    terms.dedup();
                    (terms, self.field_tokens(field, document, scope)?)
                }
                _ => (
                    vec![text.to_string()],
                    self.values(field, document, scope)
                        .into_iter()
                        .filter_map(scalar_string)
                        .collect(),
                ),
            };

        let unique: BTreeSet<&String> = query_terms.iter().collect();
        if unique.is_empty() {
            return Ok(None);
        }
        let matched = unique
            .iter()
            .filter(|t| document_terms.contains(t.as_str()))
            .count();
        let satisfied = match operator {
            Operator::Or => matched > 0,
            Operator::And => matched == unique.len(),
        };
        Ok(satisfied.then_some(matched as f64))
    }

    fn field_tokens(&self, field: &str, document: &Value, scope: &[&str]) -> Result<HashSet<String>> {
        let analyzer_name = match self.mapping.resolve(field).map(|r| r.mapping) {
            Some(FieldMapping::Text { analyzer, .. }) => {
                analyzer.as_deref().unwrap_or(STANDARD_ANALYZER)
            }
            _ => "keyword",
        };
        let analyzer = self
            .analysis
            .analyzer(analyzer_name)
            .map_err(|e| Error::engine(Some(400), e.to_string()))?;
        Ok(self
            .values(field, document, scope)
            .into_iter()
            .filter_map(scalar_string)
            .flat_map(|v| analyzer.analyze(&v))
            .collect())
    }

    /// Source values addressed by `field` within `document`.
    fn values<'d>(&self, field: &str, document: &'d Value, scope: &[&str]) -> Vec<&'d Value> {
        let Some(resolved) = self.mapping.resolve(field) else {
            return Vec::new();
        };
        let segments: Vec<&str> = field.split('.').take(resolved.source_depth).collect();
        let Some(relative) = segments.strip_prefix(scope) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        collect_values(document, relative, &mut out);
        out
    }
}

fn relative_segments<'p>(path: &'p str, scope: &[&'p str]) -> Option<Vec<&'p str>> {
    let segments: Vec<&str> = path.split('.').collect();
    segments.strip_prefix(scope).map(<[&str]>::to_vec)
}

fn collect_values<'d>(value: &'d Value, segments: &[&str], out: &mut Vec<&'d Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_values(item, segments, out);
            }
        }
        Value::Null => {}
        _ if segments.is_empty() => out.push(value),
        Value::Object(map) => {
            if let Some(child) = map.get(segments[0]) {
                collect_values(child, &segments[1..], out);
            }
        }
        _ => {}
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn sortable(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.timestamp_millis() as f64),
        _ => None,
    }
}

// ============================================================================
// Sorting
// ============================================================================

fn sort_key(evaluator: &Evaluator<'_>, sort: &SortField, document: &Value) -> Option<f64> {
    let values = evaluator
        .values(&sort.field, document, &[])
        .into_iter()
        .filter_map(sortable);
    let mode = sort.mode.unwrap_or(match sort.order {
        SortOrder::Asc => SortMode::Min,
        SortOrder::Desc => SortMode::Max,
    });
    match mode {
        SortMode::Min => values.reduce(f64::min),
        SortMode::Max => values.reduce(f64::max),
    }
}

fn compare_matches(a: &Match<'_>, b: &Match<'_>, sort: &[SortField]) -> Ordering {
    if sort.is_empty() {
        return b
            .score
            .total_cmp(&a.score)
            .then_with(|| a.id.cmp(b.id));
    }
    for (i, field) in sort.iter().enumerate() {
        let ordering = match (a.keys[i], b.keys[i]) {
            (Some(x), Some(y)) => match field.order {
                SortOrder::Asc => x.total_cmp(&y),
                SortOrder::Desc => y.total_cmp(&x),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id.cmp(b.id)
}

// ============================================================================
// Aggregations
// ============================================================================

fn aggregate(
    aggregation: &Aggregation,
    documents: &[(&Evaluator<'_>, &Value)],
    scope: &[&str],
) -> (String, Value) {
    match aggregation {
        Aggregation::Nested {
            name,
            path,
            aggregation,
        } => {
            let relative = relative_segments(path, scope).unwrap_or_default();
            let mut sub_documents = Vec::new();
            for (evaluator, document) in documents {
                let mut found = Vec::new();
                collect_values(document, &relative, &mut found);
                sub_documents.extend(found.into_iter().map(|d| (*evaluator, d)));
            }
            let inner_scope: Vec<&str> = path.split('.').collect();
            let (inner_name, inner) = aggregate(aggregation, &sub_documents, &inner_scope);
            let mut result = Map::new();
            result.insert("doc_count".to_string(), json!(sub_documents.len()));
            result.insert(inner_name, inner);
            (name.clone(), Value::Object(result))
        }
        Aggregation::Terms { name, field, size } => {
            let mut counts: BTreeMap<String, u64> = BTreeMap::new();
            for (evaluator, document) in documents {
                let distinct: BTreeSet<String> = evaluator
                    .values(field, document, scope)
                    .into_iter()
                    .filter_map(scalar_string)
                    .collect();
                for key in distinct {
                    *counts.entry(key).or_default() += 1;
                }
            }

            let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
            buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            let other: u64 = buckets.iter().skip(*size).map(|(_, c)| c).sum();
            let buckets: Vec<Value> = buckets
                .into_iter()
                .take(*size)
                .map(|(key, doc_count)| json!({ "key": key, "doc_count": doc_count }))
                .collect();

            (
                name.clone(),
                json!({
                    "doc_count_error_upper_bound": 0,
                    "sum_other_doc_count": other,
                    "buckets": buckets,
                }),
            )
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

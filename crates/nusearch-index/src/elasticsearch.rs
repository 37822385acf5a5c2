//! Elasticsearch client.
//!
//! `ElasticsearchEngine` implements [`SearchEngine`] over the REST API with
//! `reqwest`. This is the only place the index definition and the query AST
//! are turned into Elasticsearch JSON; the `to_*_json` functions are pure
//! and tested on their own.
//!
//! Retryability follows the cluster's signals: HTTP 429/502/503/504,
//! connection failures, request timeouts, and bulk items rejected with 429
//! are transient; everything else is a permanent engine error.

use std::collections::BTreeSet;

use async_trait::async_trait;
use nusearch_core::{EngineConfig, Error, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Map, Value, json};

use crate::analysis::{AnalysisDefinition, FilterDefinition, TokenizerDefinition};
use crate::document::Package;
use crate::engine::{AliasAction, BulkSummary, IndexInfo, SearchEngine, is_generation_of};
use crate::query::{
    Aggregation, Operator, Query, ScoreFunction, SearchSpec, SortField, SortMode, SortOrder,
};
use crate::schema::{FieldMapping, IndexDefinition, Property};

/// HTTP statuses that indicate an overloaded or restarting cluster.
const TRANSIENT_STATUSES: &[u16] = &[429, 502, 503, 504];

/// Elasticsearch REST client.
#[derive(Debug, Clone)]
pub struct ElasticsearchEngine {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchEngine {
    /// Create a client for the configured cluster.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    /// Send a request and parse the JSON body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let (status, body) = self.send_raw(request).await?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &body));
        }
        Ok(body)
    }

    /// Send a request and return status and body without judging the status.
    async fn send_raw(&self, request: RequestBuilder) -> Result<(u16, Value)> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, body))
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        Error::transient(error.to_string())
    } else {
        Error::engine(None, error.to_string())
    }
}

fn error_reason(body: &Value) -> String {
    match body.get("error") {
        Some(Value::Object(error)) => {
            let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
            let reason = error.get("reason").and_then(Value::as_str).unwrap_or("");
            format!("{kind}: {reason}")
        }
        Some(Value::String(reason)) => reason.clone(),
        _ => body.to_string(),
    }
}

fn status_error(status: u16, body: &Value) -> Error {
    let reason = error_reason(body);
    if TRANSIENT_STATUSES.contains(&status) {
        Error::transient(format!("HTTP {status}: {reason}"))
    } else {
        Error::engine(Some(status), reason)
    }
}

#[async_trait]
impl SearchEngine for ElasticsearchEngine {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> Result<()> {
        self.send(
            self.request(Method::PUT, index)
                .json(&to_index_json(definition)),
        )
        .await?;
        Ok(())
    }

    async fn bulk_index(&self, index: &str, packages: &[Package]) -> Result<BulkSummary> {
        let body = to_bulk_body(packages)?;
        let response = self
            .send(
                self.request(Method::POST, &format!("{index}/_bulk"))
                    .header(CONTENT_TYPE, "application/x-ndjson")
                    .body(body),
            )
            .await?;
        bulk_summary(&response, packages.len())
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.send(self.request(Method::POST, &format!("{index}/_refresh")))
            .await?;
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64> {
        let response = self
            .send(self.request(Method::GET, &format!("{index}/_count")))
            .await?;
        response
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::protocol("count response has no 'count'"))
    }

    async fn get_alias(&self, alias: &str) -> Result<BTreeSet<String>> {
        let (status, body) = self
            .send_raw(self.request(Method::GET, &format!("_alias/{alias}")))
            .await?;
        match status {
            404 => Ok(BTreeSet::new()),
            200..=299 => body
                .as_object()
                .map(|indices| indices.keys().cloned().collect())
                .ok_or_else(|| Error::protocol("alias response is not an object")),
            _ => Err(status_error(status, &body)),
        }
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()> {
        let response = self
            .send(
                self.request(Method::POST, "_aliases")
                    .json(&to_alias_actions_json(actions)),
            )
            .await?;
        if response.get("acknowledged").and_then(Value::as_bool) == Some(false) {
            return Err(Error::engine(None, "alias update was not acknowledged"));
        }
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, index)).await?;
        Ok(())
    }

    async fn list_generations(&self, prefix: &str) -> Result<Vec<IndexInfo>> {
        let (status, body) = self
            .send_raw(self.request(Method::GET, &format!("{prefix}-*/_alias")))
            .await?;
        if status == 404 {
            return Ok(Vec::new());
        }
        if !(200..300).contains(&status) {
            return Err(status_error(status, &body));
        }

        let indices = body
            .as_object()
            .ok_or_else(|| Error::protocol("alias listing is not an object"))?;
        let mut generations: Vec<IndexInfo> = indices
            .iter()
            .filter(|(name, _)| is_generation_of(name, prefix))
            .map(|(name, entry)| IndexInfo {
                name: name.clone(),
                aliases: entry
                    .get("aliases")
                    .and_then(Value::as_object)
                    .map(|aliases| aliases.keys().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();
        generations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(generations)
    }

    async fn search(&self, spec: &SearchSpec) -> Result<Value> {
        self.send(
            self.request(Method::POST, &format!("{}/_search", spec.index))
                .json(&to_search_json(spec)),
        )
        .await
    }
}

/// Interpret a bulk response; any failed item fails the call.
fn bulk_summary(response: &Value, submitted: usize) -> Result<BulkSummary> {
    if response.get("errors").and_then(Value::as_bool) != Some(true) {
        return Ok(BulkSummary { indexed: submitted });
    }

    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::protocol("bulk response reports errors but has no 'items'"))?;

    let mut failed = Vec::new();
    for item in items {
        let Some(result) = item.as_object().and_then(|i| i.values().next()) else {
            continue;
        };
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
        if !(200..300).contains(&status) {
            failed.push((status, error_reason(result)));
        }
    }

    let Some((first_status, first_reason)) = failed.first().cloned() else {
        return Ok(BulkSummary { indexed: submitted });
    };
    let message = format!(
        "{} of {} bulk items failed, first: {first_reason}",
        failed.len(),
        items.len()
    );
    if failed.iter().all(|(status, _)| *status == 429) {
        Err(Error::transient(message))
    } else {
        Err(Error::engine(Some(first_status), message))
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// NDJSON bulk body indexing every package under its id.
pub fn to_bulk_body(packages: &[Package]) -> Result<String> {
    let mut body = String::new();
    for package in packages {
        let action = json!({ "index": { "_id": package.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(package)?);
        body.push('\n');
    }
    Ok(body)
}

/// Body of a create-index request.
pub fn to_index_json(definition: &IndexDefinition) -> Value {
    json!({
        "settings": {
            "number_of_shards": definition.settings.shards,
            "number_of_replicas": definition.settings.replicas,
            "analysis": to_analysis_json(&definition.analysis),
        },
        "mappings": {
            "properties": to_properties_json(&definition.mapping.properties),
        },
    })
}

fn to_analysis_json(analysis: &AnalysisDefinition) -> Value {
    let tokenizers: Map<String, Value> = analysis
        .tokenizers
        .iter()
        .map(|(name, tokenizer)| {
            let value = match tokenizer {
                TokenizerDefinition::Pattern { pattern } => {
                    json!({ "type": "pattern", "pattern": pattern })
                }
            };
            (name.clone(), value)
        })
        .collect();

    let filters: Map<String, Value> = analysis
        .filters
        .iter()
        .map(|(name, filter)| {
            let value = match filter {
                FilterDefinition::WordDelimiter(options) => json!({
                    "type": "word_delimiter",
                    "split_on_case_change": options.split_on_case_change,
                    "split_on_numerics": options.split_on_numerics,
                    "generate_word_parts": options.generate_word_parts,
                    "generate_number_parts": options.generate_number_parts,
                    "preserve_original": options.preserve_original,
                }),
            };
            (name.clone(), value)
        })
        .collect();

    let analyzers: Map<String, Value> = analysis
        .analyzers
        .iter()
        .map(|(name, analyzer)| {
            (
                name.clone(),
                json!({
                    "type": "custom",
                    "tokenizer": analyzer.tokenizer,
                    "filter": analyzer.filters,
                }),
            )
        })
        .collect();

    json!({
        "tokenizer": tokenizers,
        "filter": filters,
        "analyzer": analyzers,
    })
}

fn to_properties_json(properties: &[Property]) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|p| (p.name.clone(), to_field_json(&p.mapping)))
            .collect(),
    )
}

fn to_field_json(mapping: &FieldMapping) -> Value {
    match mapping {
        FieldMapping::Text { analyzer, fields } => {
            let mut field = Map::new();
            field.insert("type".to_string(), json!("text"));
            if let Some(analyzer) = analyzer {
                field.insert("analyzer".to_string(), json!(analyzer));
            }
            if !fields.is_empty() {
                field.insert("fields".to_string(), to_properties_json(fields));
            }
            Value::Object(field)
        }
        FieldMapping::Keyword => json!({ "type": "keyword" }),
        FieldMapping::Long => json!({ "type": "long" }),
        FieldMapping::Date => json!({ "type": "date" }),
        FieldMapping::Nested { properties } => json!({
            "type": "nested",
            "properties": to_properties_json(properties),
        }),
    }
}

/// Body of an `_aliases` request.
pub fn to_alias_actions_json(actions: &[AliasAction]) -> Value {
    let actions: Vec<Value> = actions
        .iter()
        .map(|action| match action {
            AliasAction::Add { index, alias } => {
                json!({ "add": { "index": index, "alias": alias } })
            }
            AliasAction::Remove { index, alias } => {
                json!({ "remove": { "index": index, "alias": alias } })
            }
        })
        .collect();
    json!({ "actions": actions })
}

/// Body of a `_search` request.
pub fn to_search_json(spec: &SearchSpec) -> Value {
    let mut body = Map::new();
    body.insert("query".to_string(), to_query_json(&spec.query));
    body.insert("from".to_string(), json!(spec.from));
    body.insert("size".to_string(), json!(spec.size));
    body.insert("track_total_hits".to_string(), json!(true));
    if !spec.sort.is_empty() {
        body.insert(
            "sort".to_string(),
            Value::Array(spec.sort.iter().map(to_sort_json).collect()),
        );
    }
    if !spec.aggregations.is_empty() {
        let aggregations: Map<String, Value> =
            spec.aggregations.iter().map(to_aggregation_json).collect();
        body.insert("aggs".to_string(), Value::Object(aggregations));
    }
    Value::Object(body)
}

/// Elasticsearch query DSL for an expression.
pub fn to_query_json(query: &Query) -> Value {
    match query {
        Query::MatchAll => json!({ "match_all": {} }),
        Query::Match {
            field,
            query,
            boost,
        } => {
            let mut options = Map::new();
            options.insert("query".to_string(), json!(query));
            if let Some(boost) = boost {
                options.insert("boost".to_string(), json!(boost));
            }
            let mut clause = Map::new();
            clause.insert(field.clone(), Value::Object(options));
            json!({ "match": clause })
        }
        Query::MultiMatch {
            fields,
            query,
            operator,
        } => {
            let fields: Vec<String> = fields
                .iter()
                .map(|f| format!("{}^{}", f.field, f.boost))
                .collect();
            json!({
                "multi_match": {
                    "query": query,
                    "fields": fields,
                    "operator": match operator {
                        Operator::And => "and",
                        Operator::Or => "or",
                    },
                }
            })
        }
        Query::FunctionScore {
            query,
            function,
            max_boost,
        } => {
            let ScoreFunction::FieldValueFactor {
                field,
                factor,
                missing,
            } = function;
            let mut factor_json = Map::new();
            factor_json.insert("field".to_string(), json!(field));
            factor_json.insert("factor".to_string(), json!(factor));
            if let Some(missing) = missing {
                factor_json.insert("missing".to_string(), json!(missing));
            }
            json!({
                "function_score": {
                    "query": to_query_json(query),
                    "functions": [{ "field_value_factor": factor_json }],
                    "max_boost": max_boost,
                }
            })
        }
        Query::Term { field, value } => {
            let mut clause = Map::new();
            clause.insert(field.clone(), json!({ "value": value }));
            json!({ "term": clause })
        }
        Query::Nested { path, query } => json!({
            "nested": {
                "path": path,
                "query": to_query_json(query),
            }
        }),
        Query::Bool(bool_query) => {
            let mut clauses = Map::new();
            for (name, list) in [
                ("must", &bool_query.must),
                ("should", &bool_query.should),
                ("filter", &bool_query.filter),
                ("must_not", &bool_query.must_not),
            ] {
                if !list.is_empty() {
                    clauses.insert(
                        name.to_string(),
                        Value::Array(list.iter().map(to_query_json).collect()),
                    );
                }
            }
            if let Some(minimum) = bool_query.minimum_should_match {
                clauses.insert("minimum_should_match".to_string(), json!(minimum));
            }
            json!({ "bool": clauses })
        }
    }
}

fn to_sort_json(sort: &SortField) -> Value {
    let mut options = Map::new();
    options.insert(
        "order".to_string(),
        json!(match sort.order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }),
    );
    if let Some(mode) = sort.mode {
        options.insert(
            "mode".to_string(),
            json!(match mode {
                SortMode::Min => "min",
                SortMode::Max => "max",
            }),
        );
    }
    if let Some(path) = &sort.nested_path {
        options.insert("nested".to_string(), json!({ "path": path }));
    }
    let mut field = Map::new();
    field.insert(sort.field.clone(), Value::Object(options));
    Value::Object(field)
}

fn to_aggregation_json(aggregation: &Aggregation) -> (String, Value) {
    match aggregation {
        Aggregation::Nested {
            name,
            path,
            aggregation,
        } => {
            let (inner_name, inner) = to_aggregation_json(aggregation);
            let mut aggs = Map::new();
            aggs.insert(inner_name, inner);
            (
                name.clone(),
                json!({ "nested": { "path": path }, "aggs": aggs }),
            )
        }
        Aggregation::Terms { name, field, size } => (
            name.clone(),
            json!({ "terms": { "field": field, "size": size } }),
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Engine response projection.
//!
//! [`project`] turns a raw search response into [`SearchResults`]. It is a
//! pure function of the response and the requested page size. Anything
//! structurally unexpected is a protocol error: a malformed response must
//! never look like an empty result.

use std::collections::BTreeMap;

use nusearch_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Package;
use crate::query::{AUTHOR_NAMES_AGGREGATION, AUTHORS_AGGREGATION};

/// One ranked package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageHit {
    /// Relevance score; absent when results are sorted by a field.
    pub score: Option<f64>,
    /// The package as indexed.
    pub package: Package,
}

/// A presentation-ready page of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Hits in ranked order.
    pub hits: Vec<PackageHit>,
    /// Total matching packages.
    pub total: u64,
    /// `ceil(total / page_size)`.
    pub total_pages: u64,
    /// Packages per author name, for the facet list.
    pub author_facets: BTreeMap<String, u64>,
}

/// Project a raw engine response for a page of `page_size` hits.
pub fn project(response: &Value, page_size: usize) -> Result<SearchResults> {
    if page_size == 0 {
        return Err(Error::invalid_request("page_size", "must be positive"));
    }

    let hits = response
        .get("hits")
        .ok_or_else(|| Error::protocol("response has no 'hits'"))?;
    let total = total_hits(hits)?;

    let hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::protocol("'hits.hits' is missing or not an array"))?
        .iter()
        .enumerate()
        .map(|(i, hit)| project_hit(i, hit))
        .collect::<Result<Vec<_>>>()?;

    Ok(SearchResults {
        hits,
        total,
        total_pages: total.div_ceil(page_size as u64),
        author_facets: author_facets(response)?,
    })
}

/// Exact hit count; a lower bound (`relation: "gte"`) is a protocol error.
fn total_hits(hits: &Value) -> Result<u64> {
    match hits.get("total") {
        Some(Value::Object(total)) => {
            if let Some(relation) = total.get("relation").and_then(Value::as_str)
                && relation != "eq"
            {
                return Err(Error::protocol(format!(
                    "'hits.total' is a bound ({relation}), not an exact count"
                )));
            }
            total.get("value").and_then(Value::as_u64)
        }
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    }
    .ok_or_else(|| Error::protocol("'hits.total' is missing or malformed"))
}

fn project_hit(position: usize, hit: &Value) -> Result<PackageHit> {
    let source = hit
        .get("_source")
        .ok_or_else(|| Error::protocol(format!("hit {position} has no '_source'")))?;
    let package = Package::deserialize(source)
        .map_err(|e| Error::protocol(format!("hit {position} is not a package: {e}")))?;
    let score = match hit.get("_score") {
        None | Some(Value::Null) => None,
        Some(score) => Some(score.as_f64().ok_or_else(|| {
            Error::protocol(format!("hit {position} has a non-numeric '_score'"))
        })?),
    };
    Ok(PackageHit { score, package })
}

fn author_facets(response: &Value) -> Result<BTreeMap<String, u64>> {
    let buckets = response
        .get("aggregations")
        .and_then(|a| a.get(AUTHORS_AGGREGATION))
        .and_then(|a| a.get(AUTHOR_NAMES_AGGREGATION))
        .and_then(|a| a.get("buckets"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Error::protocol(format!(
                "aggregation '{AUTHORS_AGGREGATION}.{AUTHOR_NAMES_AGGREGATION}' is missing"
            ))
        })?;

    buckets
        .iter()
        .map(|bucket| {
            let key = bucket.get("key").and_then(Value::as_str);
            let count = bucket.get("doc_count").and_then(Value::as_u64);
            match (key, count) {
                (Some(key), Some(count)) => Ok((key.to_string(), count)),
                _ => Err(Error::protocol(format!("malformed author bucket: {bucket}"))),
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

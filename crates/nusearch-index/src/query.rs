//! Ranked query construction.
//!
//! [`QueryBuilder`] turns a [`SearchRequest`] into a [`SearchSpec`]: an
//! engine-neutral expression tree plus paging, sorting and the author facet.
//! Relevance tuning lives here and is asserted on the AST; wire formats are
//! the engine client's concern.
//!
//! # Scoring model
//!
//! ```text
//! bool
//! ├── should (at least one)
//! │   ├── match id.keyword = <text>                  boost 1000
//! │   └── function_score                             max_boost 50
//! │       ├── multi_match [id^1.5, summary^0.8]      operator AND
//! │       └── field_value_factor downloadCount       factor 0.0001
//! └── filter (only with an author)
//!     └── nested authors
//!         └── term authors.name.raw = <author>
//! ```
//!
//! An exact identifier hit (case-insensitive, via the keyword analyzer) adds
//! a score no text-plus-popularity match can reach, while the popularity
//! multiplier is capped so a handful of very popular packages cannot drown
//! relevance.

use std::fmt;
use std::str::FromStr;

use nusearch_core::{Error, Result, SearchConfig};
use serde::{Deserialize, Serialize};

use crate::schema::fields;

/// Boost on an exact (case-insensitive) identifier match.
pub const EXACT_ID_BOOST: f64 = 1000.0;

/// Weight of the analyzed identifier in the text match.
pub const ID_BOOST: f64 = 1.5;

/// Weight of the summary in the text match.
pub const SUMMARY_BOOST: f64 = 0.8;

/// Multiplier applied to `downloadCount` to derive the popularity factor.
pub const POPULARITY_FACTOR: f64 = 0.0001;

/// Upper bound of the popularity factor.
pub const MAX_POPULARITY_BOOST: f64 = 50.0;

/// Name of the nested author aggregation.
pub const AUTHORS_AGGREGATION: &str = "authors";

/// Name of the author-name terms aggregation inside [`AUTHORS_AGGREGATION`].
pub const AUTHOR_NAMES_AGGREGATION: &str = "author-names";

// ============================================================================
// Expression tree
// ============================================================================

/// How multi-term text is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Any term may match.
    #[default]
    Or,
    /// Every term must match.
    And,
}

/// A field with a relative weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBoost {
    /// Field path.
    pub field: String,
    /// Weight.
    pub boost: f64,
}

impl FieldBoost {
    /// Create a weighted field.
    pub fn new(field: &str, boost: f64) -> Self {
        Self {
            field: field.to_string(),
            boost,
        }
    }
}

/// Function applied by a function-score wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFunction {
    /// `factor * doc[field]`.
    FieldValueFactor {
        /// Numeric field.
        field: String,
        /// Multiplier.
        factor: f64,
        /// Value used when the field is absent.
        missing: Option<f64>,
    },
}

/// Boolean combination of clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    /// Must match; contributes to score.
    pub must: Vec<Query>,
    /// Should match; contributes to score.
    pub should: Vec<Query>,
    /// Must match; does not contribute to score.
    pub filter: Vec<Query>,
    /// Must not match.
    pub must_not: Vec<Query>,
    /// Minimum number of `should` clauses that have to match.
    pub minimum_should_match: Option<usize>,
}

/// Query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Every document, constant score.
    MatchAll,
    /// Analyzed match against one field.
    Match {
        /// Field path.
        field: String,
        /// Query text.
        query: String,
        /// Score multiplier.
        boost: Option<f64>,
    },
    /// Analyzed match across weighted fields.
    MultiMatch {
        /// Weighted fields.
        fields: Vec<FieldBoost>,
        /// Query text.
        query: String,
        /// Term combination.
        operator: Operator,
    },
    /// Rescore an inner query with a document function.
    FunctionScore {
        /// Inner query.
        query: Box<Query>,
        /// Score function.
        function: ScoreFunction,
        /// Cap on the function's value.
        max_boost: f64,
    },
    /// Exact value match against an unanalyzed field.
    Term {
        /// Field path.
        field: String,
        /// Exact value.
        value: String,
    },
    /// Evaluate the inner query against each nested sub-document.
    Nested {
        /// Nested field path.
        path: String,
        /// Query over the sub-documents.
        query: Box<Query>,
    },
    /// Boolean combination.
    Bool(BoolQuery),
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// How a multi-valued field reduces to one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    /// Field path.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
    /// Nested path the field lives under.
    pub nested_path: Option<String>,
    /// Reduction for multi-valued fields.
    pub mode: Option<SortMode>,
}

/// Aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Step into nested sub-documents.
    Nested {
        /// Aggregation name.
        name: String,
        /// Nested path.
        path: String,
        /// Aggregation over the sub-documents.
        aggregation: Box<Aggregation>,
    },
    /// Bucket by exact field value.
    Terms {
        /// Aggregation name.
        name: String,
        /// Unanalyzed field.
        field: String,
        /// Maximum buckets.
        size: usize,
    },
}

/// A complete, engine-neutral search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpec {
    /// Index or alias to search.
    pub index: String,
    /// Query expression.
    pub query: Query,
    /// Offset of the first hit.
    pub from: usize,
    /// Number of hits.
    pub size: usize,
    /// Sort keys; empty means score descending.
    pub sort: Vec<SortField>,
    /// Aggregations.
    pub aggregations: Vec<Aggregation>,
}

// ============================================================================
// Request
// ============================================================================

/// Result ordering requested by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    /// Best match first.
    #[default]
    Relevance,
    /// Most downloaded first.
    Downloads,
    /// Most recently updated version first.
    RecentlyUpdated,
}

impl fmt::Display for SearchSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relevance => write!(f, "relevance"),
            Self::Downloads => write!(f, "downloads"),
            Self::RecentlyUpdated => write!(f, "recent"),
        }
    }
}

impl FromStr for SearchSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "relevance" => Ok(Self::Relevance),
            "downloads" => Ok(Self::Downloads),
            "recent" | "recently_updated" | "recently-updated" => Ok(Self::RecentlyUpdated),
            other => Err(Error::invalid_request(
                "sort",
                format!("unknown sort '{other}' (expected relevance, downloads or recent)"),
            )),
        }
    }
}

/// A user search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free text; blank browses all packages.
    #[serde(default)]
    pub query: String,
    /// 1-indexed page.
    #[serde(default = "default_page")]
    pub page: usize,
    /// Hits per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Ordering.
    #[serde(default)]
    pub sort: SearchSort,
    /// Exact author name filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    25
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: default_page(),
            page_size: default_page_size(),
            sort: SearchSort::default(),
            author: None,
        }
    }
}

impl SearchRequest {
    /// First page of `query` by relevance.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Select a page.
    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Select an ordering.
    pub fn with_sort(mut self, sort: SearchSort) -> Self {
        self.sort = sort;
        self
    }

    /// Filter by exact author name.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

// ============================================================================
// QueryBuilder
// ============================================================================

/// Builds [`SearchSpec`]s against a fixed alias.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    index: String,
    max_page_size: usize,
    facet_size: usize,
}

impl QueryBuilder {
    /// Create a builder targeting `index` (normally the live alias).
    pub fn new(index: impl Into<String>) -> Self {
        let defaults = SearchConfig::default();
        Self {
            index: index.into(),
            max_page_size: defaults.max_page_size,
            facet_size: defaults.facet_size,
        }
    }

    /// Create a builder with serving limits from configuration.
    pub fn from_config(index: impl Into<String>, config: &SearchConfig) -> Self {
        Self {
            index: index.into(),
            max_page_size: config.max_page_size,
            facet_size: config.facet_size,
        }
    }

    /// Build the search call for a request.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` if `page < 1`, `page_size == 0` or `page_size`
    /// exceeds the configured maximum.
    pub fn build(&self, request: &SearchRequest) -> Result<SearchSpec> {
        if request.page < 1 {
            return Err(Error::invalid_request("page", "must be at least 1"));
        }
        if request.page_size == 0 {
            return Err(Error::invalid_request("page_size", "must be positive"));
        }
        if request.page_size > self.max_page_size {
            return Err(Error::invalid_request(
                "page_size",
                format!("must not exceed {}", self.max_page_size),
            ));
        }
        let from = (request.page - 1)
            .checked_mul(request.page_size)
            .ok_or_else(|| Error::invalid_request("page", "is out of range"))?;

        Ok(SearchSpec {
            index: self.index.clone(),
            query: self.query(request),
            from,
            size: request.page_size,
            sort: sort_for(request.sort),
            aggregations: vec![self.author_facet()],
        })
    }

    fn query(&self, request: &SearchRequest) -> Query {
        let text = if request.query.trim().is_empty() {
            Query::MatchAll
        } else {
            Query::Bool(BoolQuery {
                should: vec![exact_id(&request.query), popular_text(&request.query)],
                minimum_should_match: Some(1),
                ..Default::default()
            })
        };

        match request.author.as_deref().map(str::trim) {
            Some(author) if !author.is_empty() => Query::Bool(BoolQuery {
                must: vec![text],
                filter: vec![Query::Nested {
                    path: fields::AUTHORS.to_string(),
                    query: Box::new(Query::Bool(BoolQuery {
                        filter: vec![Query::Term {
                            field: fields::AUTHOR_NAME_RAW.to_string(),
                            value: author.to_string(),
                        }],
                        ..Default::default()
                    })),
                }],
                ..Default::default()
            }),
            _ => text,
        }
    }

    fn author_facet(&self) -> Aggregation {
        Aggregation::Nested {
            name: AUTHORS_AGGREGATION.to_string(),
            path: fields::AUTHORS.to_string(),
            aggregation: Box::new(Aggregation::Terms {
                name: AUTHOR_NAMES_AGGREGATION.to_string(),
                field: fields::AUTHOR_NAME_RAW.to_string(),
                size: self.facet_size,
            }),
        }
    }
}

fn exact_id(text: &str) -> Query {
    Query::Match {
        field: fields::ID_KEYWORD.to_string(),
        query: text.to_string(),
        boost: Some(EXACT_ID_BOOST),
    }
}

fn popular_text(text: &str) -> Query {
    Query::FunctionScore {
        query: Box::new(Query::MultiMatch {
            fields: vec![
                FieldBoost::new(fields::ID, ID_BOOST),
                FieldBoost::new(fields::SUMMARY, SUMMARY_BOOST),
            ],
            query: text.to_string(),
            operator: Operator::And,
        }),
        function: ScoreFunction::FieldValueFactor {
            field: fields::DOWNLOAD_COUNT.to_string(),
            factor: POPULARITY_FACTOR,
            missing: None,
        },
        max_boost: MAX_POPULARITY_BOOST,
    }
}

fn sort_for(sort: SearchSort) -> Vec<SortField> {
    match sort {
        SearchSort::Relevance => Vec::new(),
        SearchSort::Downloads => vec![SortField {
            field: fields::DOWNLOAD_COUNT.to_string(),
            order: SortOrder::Desc,
            nested_path: None,
            mode: None,
        }],
        SearchSort::RecentlyUpdated => vec![SortField {
            field: fields::VERSION_LAST_UPDATED.to_string(),
            order: SortOrder::Desc,
            nested_path: Some(fields::VERSIONS.to_string()),
            mode: Some(SortMode::Max),
        }],
    }
}

// ============================================================================
// Tests
// ============================================================================

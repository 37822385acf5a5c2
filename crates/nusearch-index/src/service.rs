//! Serving-side search facade.
//!
//! [`SearchService`] runs one request through the query builder, the engine
//! and the projector against the live alias. It holds no per-request state
//! and is shared behind an `Arc` by concurrent callers.
//!
//! [`SearchService::respond`] is the boundary for presentation layers: every
//! failure becomes a [`ServingError`] value with a coarse status, so one bad
//! request cannot take the process down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nusearch_core::{Error, Result, SearchConfig};
use serde::{Deserialize, Serialize};

use crate::engine::SearchEngine;
use crate::projector::{SearchResults, project};
use crate::query::{QueryBuilder, SearchRequest};

/// Coarse class of a serving failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingStatus {
    /// The request itself is invalid.
    BadRequest,
    /// The engine is unavailable, slow, or has no live index.
    ServiceUnavailable,
    /// Anything else, including malformed engine responses.
    Internal,
}

/// Error response for a search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingError {
    /// Failure class.
    pub status: ServingStatus,
    /// Human-readable reason.
    pub message: String,
}

impl fmt::Display for ServingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.status, self.message)
    }
}

impl From<&Error> for ServingError {
    fn from(error: &Error) -> Self {
        let status = match error {
            Error::InvalidRequest { .. } => ServingStatus::BadRequest,
            Error::Transient { .. } | Error::Timeout { .. } => ServingStatus::ServiceUnavailable,
            Error::Engine {
                status: Some(404), ..
            } => ServingStatus::ServiceUnavailable,
            _ => ServingStatus::Internal,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

/// Runs search requests against the live alias.
pub struct SearchService {
    engine: Arc<dyn SearchEngine>,
    queries: QueryBuilder,
    timeout: Duration,
}

impl SearchService {
    /// Create a service querying `live_alias`.
    pub fn new(engine: Arc<dyn SearchEngine>, live_alias: &str, config: &SearchConfig) -> Self {
        Self {
            engine,
            queries: QueryBuilder::from_config(live_alias, config),
            timeout: config.timeout(),
        }
    }

    /// Execute a request.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for bad paging
    /// - `Timeout` if the engine did not answer in time
    /// - `Protocol` if the engine response is malformed
    /// - any engine error
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let spec = self.queries.build(request)?;
        log::debug!(
            "Searching '{}' for {:?} (from {}, size {})",
            spec.index,
            request.query,
            spec.from,
            spec.size
        );

        let response = tokio::time::timeout(self.timeout, self.engine.search(&spec))
            .await
            .map_err(|_| Error::Timeout {
                millis: self.timeout.as_millis() as u64,
            })??;

        project(&response, request.page_size)
    }

    /// Execute a request, mapping every failure to a [`ServingError`].
    pub async fn respond(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<SearchResults, ServingError> {
        self.search(request).await.map_err(|e| {
            let response = ServingError::from(&e);
            match response.status {
                ServingStatus::BadRequest => log::debug!("Rejected search request: {e}"),
                _ => log::error!("Search failed: {e}"),
            }
            response
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Package;
    use crate::engine::AliasAction;
    use crate::memory::MemoryEngine;
    use crate::schema::{IndexDefinition, IndexSettings};

    async fn live_engine(packages: &[Package]) -> Arc<MemoryEngine> {
        let engine = Arc::new(MemoryEngine::new());
        let definition = IndexDefinition::packages(IndexSettings {
            shards: 2,
            replicas: 0,
        });
        engine.create_index("nusearch-1", &definition).await.unwrap();
        engine.bulk_index("nusearch-1", packages).await.unwrap();
        engine.refresh("nusearch-1").await.unwrap();
        engine
            .update_aliases(&[AliasAction::add("nusearch-1", "nusearch")])
            .await
            .unwrap();
        engine
    }

    fn service(engine: Arc<MemoryEngine>) -> SearchService {
        SearchService::new(engine, "nusearch", &SearchConfig::default())
    }

    #[tokio::test]
    async fn test_search_end_to_end() {
        let engine = live_engine(&[
            Package::builder("NodaTime")
                .summary("Better date and time API")
                .download_count(1000)
                .author("Jon Skeet")
                .build(),
            Package::builder("Humanizer").download_count(5000).build(),
        ])
        .await;

        let results = service(engine)
            .search(&SearchRequest::new("nodatime"))
            .await
            .unwrap();

        assert_eq!(results.total, 1);
        assert_eq!(results.total_pages, 1);
        assert_eq!(results.hits[0].package.id, "NodaTime");
        assert_eq!(results.author_facets.get("Jon Skeet"), Some(&1));
    }

    #[tokio::test]
    async fn test_bad_request() {
        let engine = live_engine(&[]).await;
        let err = service(engine)
            .respond(&SearchRequest::new("x").with_page(0, 25))
            .await
            .unwrap_err();
        assert_eq!(err.status, ServingStatus::BadRequest);
    }

    #[tokio::test]
    async fn test_no_live_index_is_unavailable() {
        let engine = Arc::new(MemoryEngine::new());
        let err = service(engine)
            .respond(&SearchRequest::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err.status, ServingStatus::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_transient_engine_failure_is_unavailable() {
        let engine = live_engine(&[]).await;
        engine.faults().fail_search_transiently(true);
        let err = service(engine)
            .respond(&SearchRequest::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err.status, ServingStatus::ServiceUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unavailable() {
        let engine = live_engine(&[]).await;
        engine.faults().search_latency(Duration::from_secs(60));
        let config = SearchConfig {
            timeout_ms: 100,
            ..Default::default()
        };
        let service = SearchService::new(engine, "nusearch", &config);

        let err = service.search(&SearchRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { millis: 100 }));
        assert_eq!(
            ServingError::from(&err).status,
            ServingStatus::ServiceUnavailable
        );
    }

    #[test]
    fn test_protocol_error_is_internal() {
        let err = Error::protocol("response has no 'hits'");
        let response = ServingError::from(&err);
        assert_eq!(response.status, ServingStatus::Internal);
        assert!(response.message.contains("hits"));
    }

    #[test]
    fn test_serving_error_serializes_snake_case() {
        let err = ServingError {
            status: ServingStatus::ServiceUnavailable,
            message: "down".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "service_unavailable");
    }
}

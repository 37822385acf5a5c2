//! Layered configuration.
//!
//! Every setting has a default equal to the value the indexing pipeline was
//! tuned with, so an empty (or absent) config file yields a working setup
//! against a local engine.
//!
//! # Resolution order
//!
//! 1. Built-in defaults
//! 2. TOML file: `--config` path, else `$NUSEARCH_CONFIG`, else
//!    `<config_dir>/nusearch/config.toml` when it exists
//! 3. Environment overrides (`NUSEARCH_ENGINE_URL`, `NUSEARCH_ENGINE_USERNAME`,
//!    `NUSEARCH_ENGINE_PASSWORD`, `NUSEARCH_PACKAGE_PATH`)
//!
//! # Example file
//!
//! ```toml
//! [engine]
//! url = "http://localhost:9200"
//!
//! [index]
//! live_alias = "nusearch"
//! retention = 2
//!
//! [bulk]
//! batch_size = 1000
//! parallelism = 4
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "NUSEARCH_CONFIG";

/// Directory name under the platform config dir.
const PROJECT_NAME: &str = "nusearch";

// ============================================================================
// Sections
// ============================================================================

/// Which engine client to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Elasticsearch over HTTP.
    #[default]
    Elasticsearch,
    /// In-process engine; nothing survives the process.
    Memory,
}

/// Search engine connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine client kind.
    #[serde(default)]
    pub kind: EngineKind,

    /// Base URL of the engine.
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Basic-auth user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-request timeout for index-side calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// What to do when more than one generation is bound to the live alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultipleLivePolicy {
    /// Demote every live generation to the previous alias.
    #[default]
    Demote,
    /// Refuse to promote; an operator has to repair the aliases first.
    Fail,
}

/// Index generation and alias settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Prefix for generation names.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Alias the serving path queries.
    #[serde(default = "default_live_alias")]
    pub live_alias: String,

    /// Alias holding superseded generations.
    #[serde(default = "default_previous_alias")]
    pub previous_alias: String,

    /// Primary shard count for new generations.
    #[serde(default = "default_shards")]
    pub shards: u32,

    /// Replica count for new generations.
    #[serde(default)]
    pub replicas: u32,

    /// How many superseded generations to keep.
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Policy for more than one live generation.
    #[serde(default)]
    pub on_multiple_live: MultipleLivePolicy,
}

/// Bulk loading settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Documents per bulk request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Bulk requests in flight at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Retries per batch after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

/// Package source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding the package dumps.
    #[serde(default = "default_package_path")]
    pub package_path: PathBuf,

    /// Maximum number of packages to read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Serving-side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size when a request does not give one.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Largest page size a request may ask for.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Number of author facet buckets.
    #[serde(default = "default_facet_size")]
    pub facet_size: usize,

    /// Deadline for one search call, in milliseconds.
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_engine_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_prefix() -> String {
    "nusearch".to_string()
}

fn default_live_alias() -> String {
    "nusearch".to_string()
}

fn default_previous_alias() -> String {
    "nusearch-old".to_string()
}

fn default_shards() -> u32 {
    2
}

fn default_retention() -> usize {
    2
}

fn default_batch_size() -> usize {
    1000
}

fn default_parallelism() -> usize {
    4
}

fn default_retries() -> usize {
    2
}

fn default_backoff_ms() -> u64 {
    30_000
}

fn default_package_path() -> PathBuf {
    PathBuf::from("./nuget-data")
}

fn default_page_size() -> usize {
    25
}

fn default_max_page_size() -> usize {
    100
}

fn default_facet_size() -> usize {
    10
}

fn default_search_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            url: default_engine_url(),
            username: None,
            password: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl EngineConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            live_alias: default_live_alias(),
            previous_alias: default_previous_alias(),
            shards: default_shards(),
            replicas: 0,
            retention: default_retention(),
            on_multiple_live: MultipleLivePolicy::default(),
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parallelism: default_parallelism(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl BulkConfig {
    /// Backoff between attempts as a `Duration`.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            package_path: default_package_path(),
            limit: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            facet_size: default_facet_size(),
            timeout_ms: default_search_timeout_ms(),
        }
    }
}

impl SearchConfig {
    /// Search deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// NuSearchConfig
// ============================================================================

/// Complete NuSearch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NuSearchConfig {
    /// Engine connection.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Generations and aliases.
    #[serde(default)]
    pub index: IndexConfig,

    /// Bulk loading.
    #[serde(default)]
    pub bulk: BulkConfig,

    /// Package source.
    #[serde(default)]
    pub source: SourceConfig,

    /// Serving.
    #[serde(default)]
    pub search: SearchConfig,
}

impl NuSearchConfig {
    /// Load configuration, applying file and environment layers.
    ///
    /// An explicit `config_path` must exist; the implicit default path is
    /// only read when present.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(config_path) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) if config_path.is_some() || std::env::var(CONFIG_ENV).is_ok() => {
                return Err(Error::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            _ => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    /// Serialize as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Resolve which config file to read.
    ///
    /// Returns `None` only when no explicit path is given and the platform
    /// has no config directory.
    pub fn resolve_config_path(config_path: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = config_path {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Platform default config file location.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(PROJECT_NAME).join("config.toml"))
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Takes the lookup as a function so tests do not have to mutate the
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NUSEARCH_ENGINE_URL") {
            self.engine.url = url;
        }
        if let Some(username) = lookup("NUSEARCH_ENGINE_USERNAME") {
            self.engine.username = Some(username);
        }
        if let Some(password) = lookup("NUSEARCH_ENGINE_PASSWORD") {
            self.engine.password = Some(password);
        }
        if let Some(path) = lookup("NUSEARCH_PACKAGE_PATH") {
            self.source.package_path = PathBuf::from(path);
        }
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.bulk.batch_size == 0 {
            return Err(Error::config("bulk.batch_size must be positive"));
        }
        if self.bulk.parallelism == 0 {
            return Err(Error::config("bulk.parallelism must be positive"));
        }
        if self.index.shards == 0 {
            return Err(Error::config("index.shards must be positive"));
        }
        if self.index.live_alias.trim().is_empty() || self.index.previous_alias.trim().is_empty()
        {
            return Err(Error::config("index aliases must not be empty"));
        }
        if self.index.live_alias == self.index.previous_alias {
            return Err(Error::config(
                "index.live_alias and index.previous_alias must differ",
            ));
        }
        if self.index.prefix.is_empty()
            || self.index.prefix.chars().any(|c| c.is_uppercase() || c.is_whitespace())
        {
            return Err(Error::config(
                "index.prefix must be non-empty, lowercase and without whitespace",
            ));
        }
        if self.search.default_page_size == 0 || self.search.max_page_size == 0 {
            return Err(Error::config("search page sizes must be positive"));
        }
        if self.search.default_page_size > self.search.max_page_size {
            return Err(Error::config(
                "search.default_page_size must not exceed search.max_page_size",
            ));
        }
        Ok(())
    }

    /// Flatten the settings an operator usually exports into
    /// `NUSEARCH_*` environment variables (credentials excluded).
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        vec![
            ("NUSEARCH_ENGINE_URL".to_string(), self.engine.url.clone()),
            (
                "NUSEARCH_PACKAGE_PATH".to_string(),
                self.source.package_path.display().to_string(),
            ),
        ]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_pipeline_tuning() {
        let config = NuSearchConfig::default();
        assert_eq!(config.engine.kind, EngineKind::Elasticsearch);
        assert_eq!(config.engine.url, "http://localhost:9200");
        assert_eq!(config.index.live_alias, "nusearch");
        assert_eq!(config.index.previous_alias, "nusearch-old");
        assert_eq!(config.index.shards, 2);
        assert_eq!(config.index.replicas, 0);
        assert_eq!(config.index.retention, 2);
        assert_eq!(config.index.on_multiple_live, MultipleLivePolicy::Demote);
        assert_eq!(config.bulk.batch_size, 1000);
        assert_eq!(config.bulk.parallelism, 4);
        assert_eq!(config.bulk.retries, 2);
        assert_eq!(config.bulk.backoff(), Duration::from_secs(30));
        assert_eq!(config.search.default_page_size, 25);
        assert_eq!(config.search.facet_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = NuSearchConfig::from_toml_str(
            r#"
            [engine]
            url = "http://search:9200"

            [bulk]
            parallelism = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.url, "http://search:9200");
        assert_eq!(config.bulk.parallelism, 8);
        assert_eq!(config.bulk.batch_size, 1000);
        assert_eq!(config.index.live_alias, "nusearch");
    }

    #[test]
    fn test_enum_values_parse_snake_case() {
        let config = NuSearchConfig::from_toml_str(
            r#"
            [engine]
            kind = "memory"

            [index]
            on_multiple_live = "fail"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.kind, EngineKind::Memory);
        assert_eq!(config.index.on_multiple_live, MultipleLivePolicy::Fail);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = NuSearchConfig::from_toml_str("[bulk\nbatch_size = ").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = NuSearchConfig::default();
        config.bulk.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_rejects_same_aliases() {
        let mut config = NuSearchConfig::default();
        config.index.previous_alias = config.index.live_alias.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_uppercase_prefix() {
        let mut config = NuSearchConfig::default();
        config.index.prefix = "NuSearch".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_default_page_size_above_max() {
        let mut config = NuSearchConfig::default();
        config.search.default_page_size = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("NUSEARCH_ENGINE_URL", "https://es.internal:9243"),
            ("NUSEARCH_ENGINE_USERNAME", "indexer"),
            ("NUSEARCH_PACKAGE_PATH", "/srv/dumps"),
        ]
        .into_iter()
        .collect();

        let mut config = NuSearchConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.engine.url, "https://es.internal:9243");
        assert_eq!(config.engine.username.as_deref(), Some("indexer"));
        assert!(config.engine.password.is_none());
        assert_eq!(config.source.package_path, PathBuf::from("/srv/dumps"));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[index]\nretention = 5").unwrap();

        let config = NuSearchConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.index.retention, 5);
    }

    #[test]
    fn test_load_missing_explicit_file_errors() {
        let err = NuSearchConfig::load(Some("/nonexistent/nusearch.toml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_toml_roundtrip_keeps_values() {
        let mut config = NuSearchConfig::default();
        config.bulk.backoff_ms = 250;
        config.source.limit = Some(1000);

        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("backoff_ms = 250"));
        let parsed = NuSearchConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_env_vars_exclude_credentials() {
        let mut config = NuSearchConfig::default();
        config.engine.password = Some("secret".to_string());
        let vars = config.to_env_vars();
        assert!(vars.iter().any(|(k, _)| k == "NUSEARCH_ENGINE_URL"));
        assert!(!vars.iter().any(|(_, v)| v == "secret"));
    }
}

/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: matjip.toml (in working directory)
/// 3. Environment variables: prefixed MATJIP_, nested sections split on `__`
///    (e.g., MATJIP_LOG_LEVEL=debug, MATJIP_STORE__URL=http://es:9200)

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};

use crate::entities::Intent;
use crate::errors::MatjipError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Document store (Elasticsearch) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Index holding restaurant documents
    pub restaurant_index: String,
    /// Index holding named places with coordinates (stations, districts)
    pub coordinate_index: String,
    pub timeout_secs: u64,
    /// Radius of the geo_distance filter emitted for resolved locations
    pub geo_radius: String,
    pub accept_invalid_certs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            restaurant_index: "restaurants".to_string(),
            coordinate_index: "coordinates".to_string(),
            timeout_secs: 10,
            geo_radius: "3km".to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Query embedder settings. `dimensions` must match the indexed vector field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub vector_field: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 768,
            vector_field: "embedding".to_string(),
        }
    }
}

/// How negation entities are turned into query clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegationMode {
    Ignore,
    MustNot,
}

/// Retrieval sizing and fusion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// RRF smoothing constant (higher flattens rank differences)
    pub rrf_k: f64,
    pub search_size: usize,
    pub compare_size: usize,
    pub information_size: usize,
    pub single_query_min_fetch: usize,
    pub single_query_fetch_multiplier: usize,
    pub multi_query_min_fetch: usize,
    pub multi_query_overfetch: usize,
    /// kNN num_candidates = k * this
    pub num_candidates_multiplier: usize,
    pub request_timeout_secs: u64,
    pub negation_policy: NegationMode,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            rrf_k: 60.0,
            search_size: 5,
            compare_size: 8,
            information_size: 3,
            single_query_min_fetch: 50,
            single_query_fetch_multiplier: 10,
            multi_query_min_fetch: 20,
            multi_query_overfetch: 4,
            num_candidates_multiplier: 4,
            request_timeout_secs: 30,
            negation_policy: NegationMode::Ignore,
        }
    }
}

impl SearchConfig {
    /// Number of fused documents returned for an intent.
    pub fn size_budget(&self, intent: Intent) -> usize {
        match intent {
            Intent::Search => self.search_size,
            Intent::Compare => self.compare_size,
            Intent::Information => self.information_size,
        }
    }

    /// Per-channel fetch window for each sub-query.
    ///
    /// A single query over-fetches by a fixed multiple; with several sub-queries each one
    /// fetches enough to fill its round-robin quota several times over.
    pub fn fetch_size(&self, intent: Intent, num_sub_queries: usize) -> usize {
        let budget = self.size_budget(intent);
        if num_sub_queries <= 1 {
            self.single_query_min_fetch
                .max(budget * self.single_query_fetch_multiplier)
        } else {
            self.multi_query_min_fetch
                .max((budget / num_sub_queries) * self.multi_query_overfetch)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject values that would make fusion or the request deadline meaningless.
    pub fn validate(&self) -> Result<(), MatjipError> {
        if !self.rrf_k.is_finite() || self.rrf_k <= 0.0 {
            return Err(MatjipError::Config(format!(
                "search.rrf_k must be a positive number, got {}",
                self.rrf_k
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(MatjipError::Config(
                "search.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        for (name, size) in [
            ("search_size", self.search_size),
            ("compare_size", self.compare_size),
            ("information_size", self.information_size),
        ] {
            if size == 0 {
                return Err(MatjipError::Config(format!("search.{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// Bounded retry for transient store failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first; 1 disables retry
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: MATJIP_SEARCH__RRF_K=30 overrides search.rrf_k in matjip.toml
    pub fn load() -> Result<Config, MatjipError> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("matjip.toml"))
            .merge(Env::prefixed("MATJIP_").split("__"))
            .extract()
            .map_err(|e| MatjipError::Config(format!("Failed to load config: {}", e)))?;
        config.search.validate()?;
        Ok(config)
    }
}

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RouterError, RouterResult};

/// Largest result count a caller may ask for
pub const MAX_TOP_K_LIMIT: usize = 50;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Routing, fallback and scoring knobs
    pub search: SearchConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Query embedding provider configuration
    pub embedding: EmbeddingConfig,
    /// Logging and metrics configuration
    pub telemetry: TelemetryConfig,
}

/// Which vector backend the router uses for semantic retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackendKind {
    /// Store-managed nearest-neighbour index
    Managed,
    /// Candidate retrieval plus in-process cosine scoring
    Scan,
}

impl FromStr for VectorBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "managed" => Ok(VectorBackendKind::Managed),
            "scan" | "fallback_scan" | "fallback-scan" => Ok(VectorBackendKind::Scan),
            other => Err(format!("unknown vector backend '{}'", other)),
        }
    }
}

/// Search router configuration, shared read-only across requests
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Fall back to the vector adapter when exact search finds too little
    pub enable_exact_fallback: bool,
    /// Fall back to the exact adapter when semantic scores are weak
    pub enable_semantic_fallback: bool,
    /// Exact result count below which fallback triggers
    pub min_exact_results: usize,
    /// Average semantic score below which fallback triggers
    pub min_semantic_score: f32,
    /// Vector candidates fetched per requested result
    pub candidate_multiplier: usize,
    /// Upper bound on vector candidates
    pub vector_candidate_cap: usize,
    /// Upper bound on records read by a full scan
    pub scan_limit: usize,
    /// Fallback hops allowed per request
    pub max_fallback_attempts: u32,
    /// Result count used when the request asks for 0
    pub default_top_k: usize,
    /// Result count clamp
    pub max_top_k: usize,
    /// Per adapter call timeout in milliseconds
    pub adapter_timeout_ms: u64,
    /// Whole request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Weight of keyword overlap in hybrid scoring
    pub hybrid_text_weight: f32,
    /// Vector backend variant
    pub vector_backend: VectorBackendKind,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL; absent means the in-memory store
    pub url: Option<String>,
    /// Maximum database connections
    pub max_connections: usize,
    /// Per statement timeout in milliseconds
    pub statement_timeout_ms: u64,
}

/// Query embedding provider configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API; absent means no HTTP embedder
    pub api_base: Option<String>,
    /// Path of the embeddings endpoint
    pub path: String,
    /// Embedding model name
    pub model: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Embedding dimension
    pub dimension: usize,
    /// Provider call timeout in milliseconds
    pub timeout_ms: u64,
    /// Use the deterministic synthetic embedder
    pub synthetic: bool,
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log events
    pub service_name: String,
    /// Record Prometheus metrics
    pub metrics_enabled: bool,
}

fn env_or<T>(key: &str, default: &str) -> RouterResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| RouterError::ConfigError(format!("Invalid {}: {}", key, e)))
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> RouterResult<Self> {
        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("Could not load .env file: {}", e);
        }

        let config = Config {
            search: SearchConfig {
                enable_exact_fallback: env_or("SEARCH_ENABLE_EXACT_FALLBACK", "true")?,
                enable_semantic_fallback: env_or("SEARCH_ENABLE_SEMANTIC_FALLBACK", "true")?,
                min_exact_results: env_or("SEARCH_MIN_EXACT_RESULTS", "1")?,
                min_semantic_score: env_or("SEARCH_MIN_SEMANTIC_SCORE", "0.3")?,
                candidate_multiplier: env_or("SEARCH_CANDIDATE_MULTIPLIER", "4")?,
                vector_candidate_cap: env_or("SEARCH_VECTOR_CANDIDATE_CAP", "200")?,
                scan_limit: env_or("SEARCH_SCAN_LIMIT", "500")?,
                max_fallback_attempts: env_or("SEARCH_MAX_FALLBACK_ATTEMPTS", "1")?,
                default_top_k: env_or("SEARCH_DEFAULT_TOP_K", "5")?,
                max_top_k: env_or("SEARCH_MAX_TOP_K", "50")?,
                adapter_timeout_ms: env_or("SEARCH_ADAPTER_TIMEOUT_MS", "2000")?,
                request_timeout_ms: env_or("SEARCH_REQUEST_TIMEOUT_MS", "5000")?,
                hybrid_text_weight: env_or("SEARCH_HYBRID_TEXT_WEIGHT", "0.3")?,
                vector_backend: env_or("SEARCH_VECTOR_BACKEND", "managed")?,
            },
            database: DatabaseConfig {
                url: env_opt("DATABASE_URL"),
                max_connections: env_or("DB_MAX_CONNECTIONS", "10")?,
                statement_timeout_ms: env_or("DB_STATEMENT_TIMEOUT_MS", "3000")?,
            },
            embedding: EmbeddingConfig {
                api_base: env_opt("EMBEDDING_API_BASE"),
                path: env::var("EMBEDDING_PATH").unwrap_or_else(|_| "/embeddings".to_string()),
                model: env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
                api_key: env_opt("EMBEDDING_API_KEY"),
                dimension: env_or("EMBEDDING_DIMENSION", "1536")?,
                timeout_ms: env_or("EMBEDDING_TIMEOUT_MS", "1500")?,
                synthetic: env_or("EMBEDDING_SYNTHETIC", "false")?,
            },
            telemetry: TelemetryConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "knowledge-router".to_string()),
                metrics_enabled: env_or("METRICS_ENABLED", "true")?,
            },
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> RouterResult<()> {
        self.search.validate()?;

        if let Some(url) = &self.database.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(RouterError::ConfigError(
                    "DATABASE_URL must start with postgres:// or postgresql://".to_string(),
                ));
            }
        }

        if self.database.max_connections == 0 {
            return Err(RouterError::ConfigError(
                "Max database connections must be greater than 0".to_string(),
            ));
        }

        if self.database.statement_timeout_ms == 0 {
            return Err(RouterError::ConfigError(
                "Statement timeout must be greater than 0".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(RouterError::ConfigError(
                "Embedding dimension must be greater than 0".to_string(),
            ));
        }

        if self.embedding.timeout_ms == 0 {
            return Err(RouterError::ConfigError(
                "Embedding timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl SearchConfig {
    /// Validate the search knobs
    pub fn validate(&self) -> RouterResult<()> {
        if self.max_top_k == 0 || self.max_top_k > MAX_TOP_K_LIMIT {
            return Err(RouterError::ConfigError(format!(
                "Max top_k must be between 1 and {}",
                MAX_TOP_K_LIMIT
            )));
        }

        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(RouterError::ConfigError(
                "Default top_k must be between 1 and max top_k".to_string(),
            ));
        }

        if self.adapter_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(RouterError::ConfigError(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.candidate_multiplier == 0 {
            return Err(RouterError::ConfigError(
                "Candidate multiplier must be greater than 0".to_string(),
            ));
        }

        if self.vector_candidate_cap == 0 {
            return Err(RouterError::ConfigError(
                "Vector candidate cap must be greater than 0".to_string(),
            ));
        }

        if self.scan_limit == 0 {
            return Err(RouterError::ConfigError(
                "Scan limit must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.hybrid_text_weight) {
            return Err(RouterError::ConfigError(
                "Hybrid text weight must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_semantic_score) {
            return Err(RouterError::ConfigError(
                "Min semantic score must be within [0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    /// Clamp a requested result count; 0 selects the default
    pub fn clamp_top_k(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_top_k
        } else {
            requested.min(self.max_top_k)
        }
    }

    /// Number of vector candidates to fetch for `top_k` results
    pub fn candidate_limit(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(self.candidate_multiplier)
            .min(self.vector_candidate_cap)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            enable_exact_fallback: true,
            enable_semantic_fallback: true,
            min_exact_results: 1,
            min_semantic_score: 0.3,
            candidate_multiplier: 4,
            vector_candidate_cap: 200,
            scan_limit: 500,
            max_fallback_attempts: 1,
            default_top_k: 5,
            max_top_k: MAX_TOP_K_LIMIT,
            adapter_timeout_ms: 2000,
            request_timeout_ms: 5000,
            hybrid_text_weight: 0.3,
            vector_backend: VectorBackendKind::Managed,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search: SearchConfig::default(),
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                statement_timeout_ms: 3000,
            },
            embedding: EmbeddingConfig {
                api_base: None,
                path: "/embeddings".to_string(),
                model: "text-embedding-3-small".to_string(),
                api_key: None,
                dimension: 1536,
                timeout_ms: 1500,
                synthetic: false,
            },
            telemetry: TelemetryConfig {
                service_name: "knowledge-router".to_string(),
                metrics_enabled: true,
            },
        }
    }
}

use thiserror::Error;

/// Main error type for the knowledge search router
#[derive(Debug, Error)]
pub enum RouterError {
    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Deployment mistake, e.g. no query embedder wired
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Query embedding provider failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Database connection or query error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A backend capability is not available (no index, not wired)
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Generic backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Adapter call or request deadline exceeded
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RouterError {
    /// Check if error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, RouterError::ConfigError(_))
    }

    /// Check if error is a recoverable backend condition
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self,
            RouterError::EmbeddingError(_)
                | RouterError::DatabaseError(_)
                | RouterError::BackendUnavailable(_)
                | RouterError::Backend(_)
                | RouterError::Timeout(_)
        )
    }

    /// Errors the fallback controller must not swallow
    pub fn is_fatal(&self) -> bool {
        matches!(self, RouterError::ConfigError(_) | RouterError::Cancelled)
    }

    /// Get error type as string for response metadata and telemetry
    pub fn error_type(&self) -> &'static str {
        match self {
            RouterError::InvalidRequest(_) => "invalid_request",
            RouterError::ConfigError(_) => "configuration",
            RouterError::EmbeddingError(_) => "embedding",
            RouterError::DatabaseError(_) => "database",
            RouterError::BackendUnavailable(_) => "backend_unavailable",
            RouterError::Backend(_) => "backend",
            RouterError::Timeout(_) => "timeout",
            RouterError::Cancelled => "cancelled",
            RouterError::SerializationError(_) => "serialization",
            RouterError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for router operations
pub type RouterResult<T> = Result<T, RouterError>;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health status for a component
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub message: Option<String>,
    pub response_time_ms: Option<f64>,
}

impl ComponentHealth {
    pub fn healthy(response_time_ms: f64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_check: Utc::now(),
            message: None,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn with_status(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            last_check: Utc::now(),
            message: Some(message.into()),
            response_time_ms: None,
        }
    }
}

/// Router health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterHealth {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentHealth>,
    pub faq_entries: Option<u64>,
    pub document_chunks: Option<u64>,
    pub store: String,
    pub exact_backend: String,
    pub vector_backend: String,
    /// Embedder name, or None when vector search is not wired
    pub embedder: Option<String>,
}

/// Worst component status wins
pub fn overall_status<'a>(components: impl IntoIterator<Item = &'a ComponentHealth>) -> HealthStatus {
    let mut has_degraded = false;

    for health in components {
        match health.status {
            HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
            HealthStatus::Degraded => has_degraded = true,
            HealthStatus::Healthy => {}
        }
    }

    if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

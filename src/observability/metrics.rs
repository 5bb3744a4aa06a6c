use crate::error::{RouterError, RouterResult};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Prometheus collectors for the router
#[derive(Clone)]
pub struct RouterMetrics {
    registry: Arc<Registry>,
    pub searches_total: IntCounterVec,
    pub fallbacks_total: IntCounter,
    pub errors_total: IntCounterVec,
    pub search_duration_seconds: Histogram,
    pub results_returned: Histogram,
}

fn metric_error(name: &str, e: prometheus::Error) -> RouterError {
    RouterError::Internal(format!("Failed to create {} metric: {}", name, e))
}

impl RouterMetrics {
    /// Create collectors in a fresh registry
    pub fn new() -> RouterResult<Self> {
        let registry = Arc::new(Registry::new());

        let searches_total = IntCounterVec::new(
            Opts::new("knowledge_searches_total", "Search requests by resolved route"),
            &["route"],
        )
        .map_err(|e| metric_error("knowledge_searches_total", e))?;

        let fallbacks_total = IntCounter::new(
            "knowledge_fallbacks_total",
            "Requests where the opposite strategy was attempted",
        )
        .map_err(|e| metric_error("knowledge_fallbacks_total", e))?;

        let errors_total = IntCounterVec::new(
            Opts::new("knowledge_search_errors_total", "Error envelopes by error kind"),
            &["kind"],
        )
        .map_err(|e| metric_error("knowledge_search_errors_total", e))?;

        let search_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "knowledge_search_duration_seconds",
                "Duration of search requests in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .map_err(|e| metric_error("knowledge_search_duration_seconds", e))?;

        let results_returned = Histogram::with_opts(
            HistogramOpts::new("knowledge_results_returned", "Results per response")
                .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0]),
        )
        .map_err(|e| metric_error("knowledge_results_returned", e))?;

        registry
            .register(Box::new(searches_total.clone()))
            .map_err(|e| metric_error("knowledge_searches_total", e))?;
        registry
            .register(Box::new(fallbacks_total.clone()))
            .map_err(|e| metric_error("knowledge_fallbacks_total", e))?;
        registry
            .register(Box::new(errors_total.clone()))
            .map_err(|e| metric_error("knowledge_search_errors_total", e))?;
        registry
            .register(Box::new(search_duration_seconds.clone()))
            .map_err(|e| metric_error("knowledge_search_duration_seconds", e))?;
        registry
            .register(Box::new(results_returned.clone()))
            .map_err(|e| metric_error("knowledge_results_returned", e))?;

        Ok(Self {
            registry,
            searches_total,
            fallbacks_total,
            errors_total,
            search_duration_seconds,
            results_returned,
        })
    }

    pub fn record_search(&self, route: &str, fallback_applied: bool, duration_secs: f64, results: usize) {
        self.searches_total.with_label_values(&[route]).inc();
        if fallback_applied {
            self.fallbacks_total.inc();
        }
        self.search_duration_seconds.observe(duration_secs);
        self.results_returned.observe(results as f64);
    }

    pub fn record_error(&self, kind: &str) {
        self.errors_total.with_label_values(&[kind]).inc();
    }

    /// Get metrics in Prometheus text format
    pub fn gather(&self) -> RouterResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| RouterError::Internal(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| RouterError::Internal(format!("Failed to convert metrics to string: {}", e)))
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

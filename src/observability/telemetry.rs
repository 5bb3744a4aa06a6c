/// Telemetry sinks
///
/// The router emits one `knowledge_search` event per request and an extra
/// `knowledge_search_error` event for error envelopes. Sinks are
/// fire-and-forget: they must not block and have no way to fail the request.
use super::logging::StructuredLogger;
use super::metrics::RouterMetrics;
use crate::config::TelemetryConfig;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{warn, Level};

pub const SEARCH_EVENT: &str = "knowledge_search";
pub const SEARCH_ERROR_EVENT: &str = "knowledge_search_error";

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &str, fields: &Map<String, Value>);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _event: &str, _fields: &Map<String, Value>) {}
}

/// Writes events as structured log lines
#[derive(Debug, Clone)]
pub struct TracingTelemetry {
    logger: StructuredLogger,
}

impl TracingTelemetry {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            logger: StructuredLogger::new(service_name),
        }
    }
}

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: &str, fields: &Map<String, Value>) {
        let level = if event == SEARCH_ERROR_EVENT {
            Level::WARN
        } else {
            Level::INFO
        };
        self.logger.log_structured(level, event, fields);
    }
}

/// Feeds router events into Prometheus collectors
#[derive(Clone)]
pub struct MetricsTelemetry {
    metrics: Arc<RouterMetrics>,
}

impl MetricsTelemetry {
    pub fn new(metrics: Arc<RouterMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<RouterMetrics> {
        &self.metrics
    }
}

impl TelemetrySink for MetricsTelemetry {
    fn emit(&self, event: &str, fields: &Map<String, Value>) {
        match event {
            SEARCH_EVENT => {
                let route = fields
                    .get("resolved_route")
                    .and_then(Value::as_str)
                    .unwrap_or("error");
                let fallback = fields
                    .get("fallback_applied")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let duration_ms = fields.get("duration_ms").and_then(Value::as_f64).unwrap_or(0.0);
                let results = fields.get("result_count").and_then(Value::as_u64).unwrap_or(0);
                self.metrics
                    .record_search(route, fallback, duration_ms / 1000.0, results as usize);
            }
            SEARCH_ERROR_EVENT => {
                let kind = fields
                    .get("error_kind")
                    .and_then(Value::as_str)
                    .unwrap_or("internal");
                self.metrics.record_error(kind);
            }
            _ => {}
        }
    }
}

/// Forwards each event to every inner sink
#[derive(Clone, Default)]
pub struct FanoutTelemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutTelemetry {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for FanoutTelemetry {
    fn emit(&self, event: &str, fields: &Map<String, Value>) {
        for sink in &self.sinks {
            sink.emit(event, fields);
        }
    }
}

/// Structured logging always, Prometheus when enabled
pub fn telemetry_from_config(config: &TelemetryConfig) -> Arc<dyn TelemetrySink> {
    let mut sinks: Vec<Arc<dyn TelemetrySink>> =
        vec![Arc::new(TracingTelemetry::new(config.service_name.clone()))];

    if config.metrics_enabled {
        match RouterMetrics::new() {
            Ok(metrics) => sinks.push(Arc::new(MetricsTelemetry::new(Arc::new(metrics)))),
            Err(e) => warn!("Metrics disabled: {}", e),
        }
    }

    Arc::new(FanoutTelemetry::new(sinks))
}

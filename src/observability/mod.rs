pub mod health;
pub mod logging;
pub mod metrics;
pub mod telemetry;
pub mod tracing;

pub use health::{ComponentHealth, HealthStatus, RouterHealth};
pub use logging::{sanitize_query, StructuredLogger};
pub use metrics::RouterMetrics;
pub use telemetry::{
    telemetry_from_config, FanoutTelemetry, MetricsTelemetry, NoopTelemetry, TelemetrySink,
    TracingTelemetry,
};
pub use self::tracing::{init_tracing, json_subscriber};

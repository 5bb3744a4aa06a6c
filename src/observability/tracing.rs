use crate::error::{RouterError, RouterResult};
use tracing::subscriber::set_global_default;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::JsonFields},
    layer::SubscriberExt,
    EnvFilter, Registry,
};

/// Default directives when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,knowledge_router=debug";

/// JSON subscriber filtered by `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
pub fn json_subscriber() -> impl Subscriber + Send + Sync + 'static {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let formatting_layer = fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(true)
        .fmt_fields(JsonFields::new());

    Registry::default().with(env_filter).with(formatting_layer)
}

/// Initialize global tracing subscriber with JSON formatting
///
/// Returns an error instead of panicking when a global subscriber is
/// already installed.
pub fn init_tracing() -> RouterResult<()> {
    set_global_default(json_subscriber())
        .map_err(|e| RouterError::Internal(format!("Failed to set global subscriber: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;

    #[test]
    fn test_json_subscriber_is_scoped() {
        let enabled = with_default(json_subscriber(), || {
            tracing::info!(target: "knowledge_router", "scoped subscriber");
            tracing::enabled!(target: "knowledge_router", tracing::Level::DEBUG)
        });
        assert!(enabled || std::env::var("RUST_LOG").is_ok());
    }
}

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{event, Level};

const MAX_LOGGED_QUERY_CHARS: usize = 200;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("valid phone regex"));

/// Mask e-mail addresses and phone numbers and bound the length
pub fn sanitize_query(query: &str) -> String {
    let masked = EMAIL_RE.replace_all(query, "[EMAIL]");
    let masked = PHONE_RE.replace_all(&masked, "[PHONE]");

    if masked.chars().count() > MAX_LOGGED_QUERY_CHARS {
        let mut truncated: String = masked.chars().take(MAX_LOGGED_QUERY_CHARS - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        masked.into_owned()
    }
}

/// Structured JSON event writer tagged with the service name
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Render one event as a JSON object
    pub fn render(&self, level: Level, event_name: &str, fields: &Map<String, Value>) -> Value {
        let mut entry = Map::new();
        entry.insert("timestamp".to_string(), Value::from(chrono::Utc::now().to_rfc3339()));
        entry.insert("level".to_string(), Value::from(level.to_string()));
        entry.insert("event".to_string(), Value::from(event_name));
        entry.insert("service".to_string(), Value::from(self.service_name.as_str()));
        for (key, value) in fields {
            entry.insert(key.clone(), value.clone());
        }
        Value::Object(entry)
    }

    pub fn log_structured(&self, level: Level, event_name: &str, fields: &Map<String, Value>) {
        let entry = self.render(level, event_name, fields);
        match level {
            Level::ERROR => event!(Level::ERROR, event = event_name, "{}", entry),
            Level::WARN => event!(Level::WARN, event = event_name, "{}", entry),
            Level::INFO => event!(Level::INFO, event = event_name, "{}", entry),
            Level::DEBUG => event!(Level::DEBUG, event = event_name, "{}", entry),
            Level::TRACE => event!(Level::TRACE, event = event_name, "{}", entry),
        }
    }
}

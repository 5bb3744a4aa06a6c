use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::search::fallback::{FallbackState, StrategyDiagnostics};

/// Number of leading content characters used as a dedup fingerprint
pub const FINGERPRINT_CHARS: usize = 100;

/// Backend tags carried in `SearchResult::source`
pub mod source_tags {
    pub const EXACT_BACKEND: &str = "exact-backend";
    pub const TEXT_INDEX: &str = "text-index";
    pub const KEYWORD_SCAN: &str = "keyword-scan";
    pub const VECTOR_INDEX: &str = "vector-index";
    pub const FALLBACK_SCAN: &str = "fallback-scan";
}

/// Names of the scoring functions carried in `SearchResult::metric`
pub mod score_metrics {
    pub const EXACT_MATCH: &str = "exact-match";
    pub const TEXT_SCORE: &str = "text-score";
    pub const REGEX_MATCH: &str = "regex-match";
    pub const COSINE: &str = "cosine";
    pub const HYBRID: &str = "hybrid";
}

/// Origin corpus of a result; also selects which corpus a search runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Document,
    Faq,
}

/// A searchable corpus is named by the kind of result it yields
pub type Corpus = ResultKind;

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Document => "document",
            ResultKind::Faq => "faq",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured metadata carried through unchanged from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    /// Any other store-specific fields
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl ResultMetadata {
    /// Check whether every equality filter matches this metadata
    pub fn matches(&self, filters: &SearchFilters) -> bool {
        filters.iter().all(|(key, expected)| match key.as_str() {
            "category" => self.category.as_deref() == expected.as_str(),
            "tags" => match expected {
                Value::String(tag) => self.tags.iter().any(|t| t == tag),
                Value::Array(tags) => tags
                    .iter()
                    .all(|tag| tag.as_str().is_some_and(|tag| self.tags.iter().any(|t| t == tag))),
                _ => false,
            },
            "document_id" => self.document_id.as_deref() == expected.as_str(),
            "chunk_index" => self.chunk_index.map(u64::from) == expected.as_u64(),
            _ => self.extra.get(key) == Some(expected),
        })
    }
}

/// Equality filters applied to record metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchFilters(BTreeMap<String, Value>);

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Render as a JSON object usable for jsonb containment (`metadata @> filter`)
    pub fn to_containment_json(&self) -> Value {
        let object: Map<String, Value> = self
            .0
            .iter()
            .map(|(key, value)| {
                let value = match (key.as_str(), value) {
                    ("tags", Value::String(tag)) => Value::Array(vec![Value::String(tag.clone())]),
                    _ => value.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(object)
    }
}

impl FromIterator<(String, Value)> for SearchFilters {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The unit returned by every adapter
///
/// FAQ results carry the question in `title` and the answer in `content`.
/// Scores are only comparable within one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub kind: ResultKind,
    /// Concrete backend that produced the result
    pub source: String,
    /// Stable dedup key (document id + chunk index, or FAQ key)
    pub identity: Option<String>,
    pub title: String,
    pub content: String,
    pub score: f32,
    /// How `score` was computed
    pub metric: String,
    #[serde(default)]
    pub metadata: ResultMetadata,
}

impl SearchResult {
    /// FAQ question, if this is an FAQ result
    pub fn question(&self) -> Option<&str> {
        match self.kind {
            ResultKind::Faq => Some(&self.title),
            ResultKind::Document => None,
        }
    }

    /// Truncated-content fingerprint used when identities differ or are absent
    pub fn fingerprint(&self) -> Option<String> {
        let fingerprint: String = self.content.trim().chars().take(FINGERPRINT_CHARS).collect();
        if fingerprint.is_empty() {
            None
        } else {
            Some(fingerprint)
        }
    }

    /// Identity, ignoring empty strings
    pub fn identity_key(&self) -> Option<&str> {
        self.identity.as_deref().filter(|id| !id.is_empty())
    }
}

/// A stored FAQ entry or document chunk, possibly with its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeRecord {
    pub kind: ResultKind,
    pub identity: Option<String>,
    pub title: String,
    pub content: String,
    pub metadata: ResultMetadata,
    pub embedding: Option<Vec<f32>>,
}

impl KnowledgeRecord {
    /// FAQ entry keyed by `key`; identity is `faq:<key>`
    pub fn faq(key: &str, question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Faq,
            identity: Some(format!("faq:{}", key)),
            title: question.into(),
            content: answer.into(),
            metadata: ResultMetadata::default(),
            embedding: None,
        }
    }

    /// Document chunk; identity is `doc:<document_id>:chunk:<index>`
    pub fn document_chunk(
        document_id: &str,
        chunk_index: u32,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: ResultKind::Document,
            identity: Some(format!("doc:{}:chunk:{}", document_id, chunk_index)),
            title: title.into(),
            content: content.into(),
            metadata: ResultMetadata {
                document_id: Some(document_id.to_string()),
                chunk_index: Some(chunk_index),
                ..ResultMetadata::default()
            },
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.metadata.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// True when the record carries a non-empty embedding
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Convert into a result; the embedding is dropped here
    pub fn into_result(self, score: f32, source: &str, metric: &str) -> SearchResult {
        SearchResult {
            kind: self.kind,
            source: source.to_string(),
            identity: self.identity,
            title: self.title,
            content: self.content,
            score,
            metric: metric.to_string(),
            metadata: self.metadata,
        }
    }
}

/// Store hit with its backend-native score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: KnowledgeRecord,
    pub score: f32,
}

/// Retrieval strategy actually executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Exact,
    Semantic,
    Hybrid,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Exact => "exact",
            Route::Semantic => "semantic",
            Route::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route as asked for by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestedRoute {
    Auto,
    Exact,
    Semantic,
    Hybrid,
    /// Backward-compatible alias of `Semantic`
    Vector,
    Unrecognized(String),
}

impl RequestedRoute {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "auto" => RequestedRoute::Auto,
            "exact" => RequestedRoute::Exact,
            "semantic" => RequestedRoute::Semantic,
            "hybrid" => RequestedRoute::Hybrid,
            "vector" => RequestedRoute::Vector,
            other => RequestedRoute::Unrecognized(other.to_string()),
        }
    }

    /// Resolve aliases
    pub fn normalized(self) -> Self {
        match self {
            RequestedRoute::Vector => RequestedRoute::Semantic,
            other => other,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RequestedRoute::Auto => "auto",
            RequestedRoute::Exact => "exact",
            RequestedRoute::Semantic => "semantic",
            RequestedRoute::Hybrid => "hybrid",
            RequestedRoute::Vector => "vector",
            RequestedRoute::Unrecognized(value) => value,
        }
    }
}

impl Default for RequestedRoute {
    fn default() -> Self {
        RequestedRoute::Auto
    }
}

impl From<String> for RequestedRoute {
    fn from(value: String) -> Self {
        RequestedRoute::parse(&value)
    }
}

impl From<&str> for RequestedRoute {
    fn from(value: &str) -> Self {
        RequestedRoute::parse(value)
    }
}

impl From<RequestedRoute> for String {
    fn from(route: RequestedRoute) -> Self {
        route.as_str().to_string()
    }
}

impl fmt::Display for RequestedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome, fixed for the lifetime of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub requested: RequestedRoute,
    pub resolved: Route,
}

impl RouteDecision {
    /// "requested->resolved"
    pub fn label(&self) -> String {
        format!("{}->{}", self.requested, self.resolved)
    }
}

/// Core search request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Natural language query
    pub query: String,
    /// Maximum number of results (0 selects the configured default, max 50)
    #[serde(default)]
    pub top_k: usize,
    /// auto, exact, semantic, hybrid or vector
    #[serde(default)]
    pub route: RequestedRoute,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
    /// Search the FAQ corpus
    #[serde(default = "default_true")]
    pub search_kb: bool,
    /// Search the document corpus
    #[serde(default = "default_true")]
    pub search_docs: bool,
    /// Per adapter call timeout override
    #[serde(default)]
    pub adapter_timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 0,
            route: RequestedRoute::Auto,
            filters: None,
            search_kb: true,
            search_docs: true,
            adapter_timeout_ms: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_route(mut self, route: impl Into<RequestedRoute>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_corpora(mut self, search_kb: bool, search_docs: bool) -> Self {
        self.search_kb = search_kb;
        self.search_docs = search_docs;
        self
    }

    pub fn with_adapter_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.adapter_timeout_ms = Some(timeout_ms);
        self
    }

    /// Corpora selected by the toggles, FAQ first
    pub fn corpora(&self) -> Vec<ResultKind> {
        let mut corpora = Vec::with_capacity(2);
        if self.search_kb {
            corpora.push(ResultKind::Faq);
        }
        if self.search_docs {
            corpora.push(ResultKind::Document);
        }
        corpora
    }
}

/// Qualitative verdict of the assessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    NoResults,
    Excellent,
    Good,
    Fair,
    Poor,
    Error,
}

impl QualityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::NoResults => "no_results",
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Fair => "fair",
            QualityLevel::Poor => "poor",
            QualityLevel::Error => "error",
        }
    }
}

/// Advisory quality metadata; never alters the result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub level: QualityLevel,
    pub confidence: f32,
    pub avg_score: f32,
    pub max_score: f32,
    pub unique_sources: usize,
    pub unique_types: usize,
    pub avg_content_length: f32,
    pub recommendations: Vec<String>,
}

impl QualityVerdict {
    /// Verdict attached to error envelopes
    pub fn error() -> Self {
        Self {
            level: QualityLevel::Error,
            confidence: 0.0,
            avg_score: 0.0,
            max_score: 0.0,
            unique_sources: 0,
            unique_types: 0,
            avg_content_length: 0.0,
            recommendations: Vec::new(),
        }
    }
}

/// Timing and diagnostic metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: Uuid,
    pub decision: Option<RouteDecision>,
    pub duration_ms: f64,
    /// Pooled candidates before dedup/re-rank
    pub candidate_count: usize,
    pub fallback_attempts: u32,
    pub states: Vec<FallbackState>,
    pub strategies: Vec<StrategyDiagnostics>,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMetadata {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            decision: None,
            duration_ms: 0.0,
            candidate_count: 0,
            fallback_attempts: 0,
            states: Vec::new(),
            strategies: Vec::new(),
            errors: Vec::new(),
            error_kind: None,
            timestamp: Utc::now(),
        }
    }
}

/// Search response envelope, built once per request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// "requested->resolved", or "error"
    pub route: String,
    pub query: String,
    pub results: Vec<SearchResult>,
    pub quality: QualityVerdict,
    pub fallback_applied: bool,
    pub metadata: ResponseMetadata,
}

impl SearchResponse {
    pub fn is_error(&self) -> bool {
        self.quality.level == QualityLevel::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requested_route_parsing() {
        assert_eq!(RequestedRoute::parse("AUTO"), RequestedRoute::Auto);
        assert_eq!(RequestedRoute::parse(" vector "), RequestedRoute::Vector);
        assert_eq!(RequestedRoute::parse("vector").normalized(), RequestedRoute::Semantic);
        assert_eq!(
            RequestedRoute::parse("fuzzy"),
            RequestedRoute::Unrecognized("fuzzy".to_string())
        );

        let request: SearchRequest =
            serde_json::from_value(json!({ "query": "reset password", "route": "hybrid" })).unwrap();
        assert_eq!(request.route, RequestedRoute::Hybrid);
        assert!(request.search_kb && request.search_docs);
        assert_eq!(request.top_k, 0);
    }

    #[test]
    fn test_route_decision_label() {
        let decision = RouteDecision {
            requested: RequestedRoute::Auto,
            resolved: Route::Exact,
        };
        assert_eq!(decision.label(), "auto->exact");
    }

    #[test]
    fn test_metadata_filter_matching() {
        let record = KnowledgeRecord::faq("billing-1", "How do refunds work?", "Refunds take 5 days.")
            .with_category("billing")
            .with_tags(["refund", "payments"]);
        let metadata = &record.metadata;

        assert!(metadata.matches(&SearchFilters::new()));
        assert!(metadata.matches(&SearchFilters::new().with("category", "billing")));
        assert!(metadata.matches(&SearchFilters::new().with("tags", "refund")));
        assert!(metadata.matches(&SearchFilters::new().with("tags", json!(["refund", "payments"]))));
        assert!(!metadata.matches(&SearchFilters::new().with("tags", json!(["refund", "shipping"]))));
        assert!(!metadata.matches(&SearchFilters::new().with("category", "auth")));
        assert!(!metadata.matches(&SearchFilters::new().with("tenant", "acme")));
    }

    #[test]
    fn test_containment_json_wraps_single_tag() {
        let filters = SearchFilters::new().with("tags", "refund").with("category", "billing");
        assert_eq!(
            filters.to_containment_json(),
            json!({ "category": "billing", "tags": ["refund"] })
        );
    }

    #[test]
    fn test_into_result_drops_embedding() {
        let record = KnowledgeRecord::document_chunk("42", 0, "Guide", "Install the agent first.")
            .with_embedding(vec![0.1, 0.2]);
        assert!(record.has_embedding());

        let result = record.into_result(0.8, source_tags::VECTOR_INDEX, score_metrics::COSINE);
        assert_eq!(result.identity.as_deref(), Some("doc:42:chunk:0"));
        assert_eq!(result.metadata.chunk_index, Some(0));
        let serialized = serde_json::to_value(&result).unwrap();
        assert!(serialized.get("embedding").is_none());
    }

    #[test]
    fn test_fingerprint_truncates_content() {
        let long = "x".repeat(250);
        let result = KnowledgeRecord::faq("1", "q", long).into_result(1.0, "t", "m");
        assert_eq!(result.fingerprint().map(|f| f.chars().count()), Some(FINGERPRINT_CHARS));

        let empty = KnowledgeRecord::faq("2", "q", "   ").into_result(1.0, "t", "m");
        assert_eq!(empty.fingerprint(), None);
    }
}

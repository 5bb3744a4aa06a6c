use super::*;
use crate::config::SearchConfig;
use crate::embedding::SyntheticEmbedder;
use crate::error::{RouterError, RouterResult};
use crate::exact_backend::KeywordIndex;
use crate::observability::TelemetrySink;
use crate::store::InMemoryStore;
use crate::types::{
    score_metrics, source_tags, Corpus, KnowledgeRecord, QualityLevel, RequestedRoute, Route,
    SearchFilters, SearchRequest, SearchResult,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DIM: usize = 256;

fn corpus() -> Vec<KnowledgeRecord> {
    let embedder = SyntheticEmbedder::new(DIM);
    let records = vec![
        KnowledgeRecord::faq("1", "How do I reset my password?", "Use the reset link on the login page.")
            .with_category("account"),
        KnowledgeRecord::faq("2", "Can I change my billing plan?", "Plans can be changed from billing settings.")
            .with_category("billing"),
        KnowledgeRecord::document_chunk(
            "42",
            0,
            "Security guide",
            "Passwords must be rotated every ninety days by administrators.",
        )
        .with_tags(["security", "admin"]),
        KnowledgeRecord::document_chunk(
            "42",
            1,
            "Security guide",
            "Two factor authentication protects administrator accounts.",
        )
        .with_tags(["security"]),
        KnowledgeRecord::document_chunk(
            "77",
            0,
            "Invoices",
            "Invoices are emailed monthly to the billing owner of the workspace.",
        ),
    ];

    records
        .into_iter()
        .map(|record| {
            let embedding = embedder.vector_for(&format!("{} {}", record.title, record.content));
            record.with_embedding(embedding)
        })
        .collect()
}

fn router() -> SearchRouter {
    SearchRouter::builder(Arc::new(InMemoryStore::with_records(corpus())))
        .synthetic_embeddings(DIM)
        .build()
        .unwrap()
}

fn result(identity: &str, source: &str, score: f32, content: &str) -> SearchResult {
    let mut result = KnowledgeRecord::document_chunk("0", 0, "Title", content).into_result(
        score,
        source,
        score_metrics::COSINE,
    );
    result.identity = Some(identity.to_string());
    result
}

/// Returns the same results for every corpus, or fails
struct StaticAdapter {
    strategy: Strategy,
    results: Option<Vec<SearchResult>>,
}

impl StaticAdapter {
    fn new(strategy: Strategy, results: Vec<SearchResult>) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            results: Some(results),
        })
    }

    fn failing(strategy: Strategy) -> Arc<Self> {
        Arc::new(Self {
            strategy,
            results: None,
        })
    }
}

#[async_trait]
impl SearchAdapter for StaticAdapter {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn search(&self, query: &AdapterQuery<'_>) -> RouterResult<Vec<SearchResult>> {
        let mut results = self
            .results
            .clone()
            .ok_or_else(|| RouterError::Backend(format!("{} backend down", self.strategy)))?;
        sort_and_truncate(&mut results, query.top_k);
        Ok(results)
    }
}

struct SlowAdapter;

#[async_trait]
impl SearchAdapter for SlowAdapter {
    fn strategy(&self) -> Strategy {
        Strategy::Vector
    }

    async fn search(&self, _query: &AdapterQuery<'_>) -> RouterResult<Vec<SearchResult>> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingTelemetry {
    events: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, event: &str, fields: &Map<String, Value>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((event.to_string(), fields.clone()));
        }
    }
}

fn mock_router(exact: Arc<dyn SearchAdapter>, vector: Arc<dyn SearchAdapter>) -> SearchRouter {
    SearchRouter::builder(Arc::new(InMemoryStore::new()))
        .adapters(exact, vector)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_exact_hit_without_fallback() {
    let router = router();
    let request = SearchRequest::new("How do I reset my password?")
        .with_top_k(5)
        .with_route("exact");

    let response = router.route(request).await;

    assert_eq!(response.route, "exact->exact");
    assert!(!response.fallback_applied);
    assert_eq!(response.results[0].identity.as_deref(), Some("faq:1"));
    assert_eq!(response.results[0].metric, score_metrics::TEXT_SCORE);
    assert_eq!(response.metadata.fallback_attempts, 0);
    assert!(response.metadata.states.contains(&FallbackState::Accepted));
}

#[tokio::test]
async fn test_exact_miss_triggers_vector_fallback() {
    let router = router();
    let request = SearchRequest::new("xyzzy-nonexistent-term")
        .with_top_k(5)
        .with_route("exact");

    let response = router.route(request).await;

    assert_eq!(response.route, "exact->exact");
    assert!(response.fallback_applied);
    assert_eq!(response.metadata.fallback_attempts, 1);
    assert!(!response.results.is_empty());
    assert!(response
        .results
        .iter()
        .all(|r| r.source == source_tags::VECTOR_INDEX));
    assert_eq!(response.metadata.strategies[1].strategy, Strategy::Vector);
}

#[tokio::test]
async fn test_duplicate_identity_is_suppressed() {
    let router = mock_router(
        StaticAdapter::new(
            Strategy::Exact,
            vec![result("doc:42:chunk:0", source_tags::TEXT_INDEX, 0.8, "Passwords must be rotated.")],
        ),
        StaticAdapter::new(
            Strategy::Vector,
            vec![result("doc:42:chunk:0", source_tags::VECTOR_INDEX, 0.2, "Passwords must be rotated!")],
        ),
    );

    let response = router
        .route(SearchRequest::new("password rotation policy").with_route("semantic"))
        .await;

    assert!(response.fallback_applied);
    let matching: Vec<_> = response
        .results
        .iter()
        .filter(|r| r.identity.as_deref() == Some("doc:42:chunk:0"))
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].score, 0.8);
    // Two corpora, two stages, one distinct result
    assert_eq!(response.metadata.candidate_count, 4);
}

#[tokio::test]
async fn test_excellent_quality_verdict() {
    let router = mock_router(
        StaticAdapter::new(
            Strategy::Exact,
            vec![
                result("faq:1", source_tags::TEXT_INDEX, 0.95, "Use the reset link on the login page to pick a new password."),
                result("doc:9:chunk:0", source_tags::EXACT_BACKEND, 0.95, "Administrators can force a password reset for any member account."),
            ],
        ),
        StaticAdapter::new(Strategy::Vector, Vec::new()),
    );

    let response = router
        .route(SearchRequest::new("reset password").with_route("exact").with_corpora(true, false))
        .await;

    assert_eq!(response.quality.level, QualityLevel::Excellent);
    assert_eq!(response.quality.unique_sources, 2);
    assert!(!response.fallback_applied);
}

#[tokio::test]
async fn test_fallback_is_single_hop() {
    let config = SearchConfig {
        max_fallback_attempts: 3,
        ..SearchConfig::default()
    };
    let router = SearchRouter::builder(Arc::new(InMemoryStore::new()))
        .config(config)
        .adapters(
            StaticAdapter::new(
                Strategy::Exact,
                vec![result("faq:3", source_tags::TEXT_INDEX, 0.01, "Barely related answer.")],
            ),
            StaticAdapter::new(Strategy::Vector, Vec::new()),
        )
        .build()
        .unwrap();

    let response = router
        .route(SearchRequest::new("anything at all").with_route("hybrid"))
        .await;

    assert!(response.fallback_applied);
    assert_eq!(response.metadata.fallback_attempts, 1);
    assert_eq!(response.quality.level, QualityLevel::Poor);
}

#[tokio::test]
async fn test_results_bounded_by_top_k() {
    let router = router();
    for top_k in [1, 2, 3] {
        let response = router
            .route(SearchRequest::new("security billing password").with_top_k(top_k))
            .await;
        assert!(response.results.len() <= top_k);
    }

    let response = router
        .route(SearchRequest::new("security billing password").with_top_k(500))
        .await;
    assert!(response.results.len() <= router.config().max_top_k);
}

#[tokio::test]
async fn test_missing_embedder_is_configuration_error() {
    let telemetry = Arc::new(RecordingTelemetry::default());
    let router = SearchRouter::builder(Arc::new(InMemoryStore::with_records(corpus())))
        .telemetry(telemetry.clone())
        .build()
        .unwrap();

    let response = router
        .route(SearchRequest::new("explain how invoices work").with_route("semantic"))
        .await;

    assert!(response.is_error());
    assert_eq!(response.route, "error");
    assert!(response.results.is_empty());
    assert_eq!(response.metadata.error_kind.as_deref(), Some("configuration"));

    let events = telemetry.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].0, "knowledge_search_error");
    assert_eq!(events[1].1["error_kind"], "configuration");
}

#[tokio::test]
async fn test_total_failure_is_error_envelope() {
    let router = mock_router(
        StaticAdapter::failing(Strategy::Exact),
        StaticAdapter::failing(Strategy::Vector),
    );

    let response = router
        .route(SearchRequest::new("reset password").with_route("exact"))
        .await;

    assert_eq!(response.route, "error");
    assert_eq!(response.quality.level, QualityLevel::Error);
    // The vector stage ran and failed too
    assert!(response.fallback_applied);
    assert_eq!(response.metadata.fallback_attempts, 1);
    assert!(response.metadata.states.contains(&FallbackState::FallbackExecuted));
    assert_eq!(response.metadata.error_kind.as_deref(), Some("backend"));
    // Two corpora per stage plus the summary
    assert_eq!(response.metadata.errors.len(), 5);
    assert_eq!(response.metadata.strategies.len(), 2);
}

#[tokio::test]
async fn test_primary_failure_without_fallback_is_empty() {
    let config = SearchConfig {
        enable_exact_fallback: false,
        ..SearchConfig::default()
    };
    let router = SearchRouter::builder(Arc::new(InMemoryStore::new()))
        .config(config)
        .adapters(
            StaticAdapter::failing(Strategy::Exact),
            StaticAdapter::new(Strategy::Vector, Vec::new()),
        )
        .build()
        .unwrap();

    let response = router
        .route(SearchRequest::new("reset password").with_route("exact"))
        .await;

    assert_eq!(response.route, "exact->exact");
    assert!(response.results.is_empty());
    assert_eq!(response.quality.level, QualityLevel::NoResults);
    assert_eq!(response.metadata.errors.len(), 2);
}

#[tokio::test]
async fn test_cancelled_request() {
    let router = mock_router(
        StaticAdapter::new(Strategy::Exact, Vec::new()),
        Arc::new(SlowAdapter),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = router
        .route_with_cancel(SearchRequest::new("reset password").with_route("semantic"), cancel)
        .await;

    assert!(response.is_error());
    assert_eq!(response.metadata.error_kind.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_request_deadline() {
    let config = SearchConfig {
        request_timeout_ms: 50,
        ..SearchConfig::default()
    };
    let router = SearchRouter::builder(Arc::new(InMemoryStore::new()))
        .config(config)
        .adapters(StaticAdapter::new(Strategy::Exact, Vec::new()), Arc::new(SlowAdapter))
        .build()
        .unwrap();

    let response = router
        .route(
            SearchRequest::new("reset password")
                .with_route("semantic")
                .with_adapter_timeout_ms(5_000),
        )
        .await;

    assert_eq!(response.metadata.error_kind.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn test_adapter_timeout_triggers_fallback() {
    let router = mock_router(
        StaticAdapter::new(
            Strategy::Exact,
            vec![result("faq:1", source_tags::TEXT_INDEX, 0.7, "Use the reset link.")],
        ),
        Arc::new(SlowAdapter),
    );

    let response = router
        .route(
            SearchRequest::new("reset password")
                .with_route("semantic")
                .with_adapter_timeout_ms(20),
        )
        .await;

    assert!(!response.is_error());
    assert!(response.fallback_applied);
    assert_eq!(response.results.len(), 1);
    assert!(response.metadata.errors.iter().all(|e| e.contains("Timed out")));
}

#[tokio::test]
async fn test_route_aliases() {
    let decision = SearchRouter::decide(&RequestedRoute::parse("Vector"), "anything");
    assert_eq!(decision.resolved, Route::Semantic);
    assert_eq!(decision.label(), "vector->semantic");

    let decision = SearchRouter::decide(&RequestedRoute::parse("fuzzy"), "anything");
    assert_eq!(decision.resolved, Route::Semantic);

    let decision = SearchRouter::decide(&RequestedRoute::Auto, "\"exact phrase\"");
    assert_eq!(decision.resolved, Route::Exact);
    assert_eq!(decision.label(), "auto->exact");
}

#[tokio::test]
async fn test_corpus_toggles_and_filters() {
    let router = router();

    let faq_only = router
        .route(
            SearchRequest::new("password")
                .with_route("exact")
                .with_corpora(true, false),
        )
        .await;
    assert!(faq_only.results.iter().all(|r| r.kind == Corpus::Faq));

    let filtered = router
        .route(
            SearchRequest::new("security")
                .with_route("exact")
                .with_corpora(false, true)
                .with_filters(SearchFilters::new().with("tags", "admin")),
        )
        .await;
    assert_eq!(filtered.results.len(), 1);
    assert_eq!(filtered.results[0].identity.as_deref(), Some("doc:42:chunk:0"));

    let nothing = router
        .route(SearchRequest::new("password").with_corpora(false, false))
        .await;
    assert!(nothing.results.is_empty());
    assert!(!nothing.is_error());
}

#[tokio::test]
async fn test_external_exact_backend() {
    let index = Arc::new(KeywordIndex::new());
    index.extend(corpus()).await;
    let router = SearchRouter::builder(Arc::new(InMemoryStore::with_records(corpus())))
        .synthetic_embeddings(DIM)
        .exact_backend(index)
        .build()
        .unwrap();

    let response = router
        .route(SearchRequest::new("faq:2").with_route("exact"))
        .await;

    assert_eq!(response.results[0].identity.as_deref(), Some("faq:2"));
    assert_eq!(response.results[0].source, source_tags::EXACT_BACKEND);
}

#[tokio::test]
async fn test_health_report() {
    let health = router().health_check().await;

    assert_eq!(health.faq_entries, Some(2));
    assert_eq!(health.document_chunks, Some(3));
    assert_eq!(health.status, crate::observability::HealthStatus::Healthy);
    assert_eq!(health.embedder.as_deref(), Some("synthetic"));
    assert_eq!(health.vector_backend, "managed");
    assert_eq!(health.exact_backend, "noop");

    let bare = SearchRouter::builder(Arc::new(InMemoryStore::new())).build().unwrap();
    assert_eq!(
        bare.health_check().await.status,
        crate::observability::HealthStatus::Degraded
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = SearchConfig {
        max_top_k: 0,
        ..SearchConfig::default()
    };
    let result = SearchRouter::builder(Arc::new(InMemoryStore::new()))
        .config(config)
        .build();
    assert!(result.err().is_some_and(|e| e.is_config_error()));
}

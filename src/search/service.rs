/// Search router façade
///
/// Resolves the route once per request, drives the fallback controller
/// over the selected corpora, deduplicates and ranks the pooled results,
/// grades them and wraps everything in a `SearchResponse`. Callers always
/// get an envelope back: unrecoverable failures become `route = "error"`.
use super::{
    assess, classify, dedupe_and_rank, ExactBackend, ExactSearchAdapter, FallbackController,
    FallbackOutcome, SearchAdapter, SearchPlan, VectorBackend, VectorSearchAdapter,
};
use crate::config::{Config, SearchConfig};
use crate::embedding::{HttpEmbedder, QueryEmbedder, SyntheticEmbedder};
use crate::error::{RouterError, RouterResult};
use crate::exact_backend::ExactMatchService;
use crate::observability::health::overall_status;
use crate::observability::telemetry::{SEARCH_ERROR_EVENT, SEARCH_EVENT};
use crate::observability::{
    sanitize_query, telemetry_from_config, ComponentHealth, HealthStatus, NoopTelemetry,
    RouterHealth, TelemetrySink,
};
use crate::store::{DocumentStore, InMemoryStore, PostgresStore};
use crate::types::{
    Corpus, QualityVerdict, RequestedRoute, ResponseMetadata, Route, RouteDecision, SearchRequest,
    SearchResponse,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, field, info, instrument, warn, Span};
use uuid::Uuid;

/// Route label used by error envelopes
pub const ERROR_ROUTE: &str = "error";

/// Knowledge search router, built once and shared by handle
pub struct SearchRouter {
    config: Arc<SearchConfig>,
    store: Arc<dyn DocumentStore>,
    controller: FallbackController,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    exact_backend: ExactBackend,
    vector_backend: VectorBackend,
    telemetry: Arc<dyn TelemetrySink>,
}

pub struct SearchRouterBuilder {
    store: Arc<dyn DocumentStore>,
    config: SearchConfig,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    exact_backend: ExactBackend,
    vector_backend: Option<VectorBackend>,
    telemetry: Arc<dyn TelemetrySink>,
    adapters: Option<(Arc<dyn SearchAdapter>, Arc<dyn SearchAdapter>)>,
}

impl SearchRouterBuilder {
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn QueryEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Deterministic hashed embeddings, for tests and offline corpora
    pub fn synthetic_embeddings(self, dimension: usize) -> Self {
        self.embedder(Arc::new(SyntheticEmbedder::new(dimension)))
    }

    pub fn exact_backend(mut self, service: Arc<dyn ExactMatchService>) -> Self {
        self.exact_backend = ExactBackend::External(service);
        self
    }

    /// Overrides `SearchConfig::vector_backend`
    pub fn vector_backend(mut self, backend: VectorBackend) -> Self {
        self.vector_backend = Some(backend);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replace the store-backed adapters with custom strategies
    pub fn adapters(mut self, exact: Arc<dyn SearchAdapter>, vector: Arc<dyn SearchAdapter>) -> Self {
        self.adapters = Some((exact, vector));
        self
    }

    pub fn build(self) -> RouterResult<SearchRouter> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let vector_backend = self
            .vector_backend
            .unwrap_or_else(|| VectorBackend::from(config.vector_backend));

        let (exact, vector) = match self.adapters {
            Some(adapters) => adapters,
            None => {
                let exact: Arc<dyn SearchAdapter> = Arc::new(ExactSearchAdapter::new(
                    self.store.clone(),
                    self.exact_backend.clone(),
                    config.scan_limit,
                ));
                let vector: Arc<dyn SearchAdapter> = Arc::new(VectorSearchAdapter::new(
                    self.store.clone(),
                    self.embedder.clone(),
                    vector_backend,
                    config.clone(),
                ));
                (exact, vector)
            }
        };

        info!(
            "Search router ready: store={}, exact_backend={}, vector_backend={}, embedder={}",
            self.store.name(),
            self.exact_backend.name(),
            vector_backend.name(),
            self.embedder.as_ref().map_or("none", |e| e.name())
        );

        Ok(SearchRouter {
            controller: FallbackController::new(config.clone(), exact, vector),
            config,
            store: self.store,
            embedder: self.embedder,
            exact_backend: self.exact_backend,
            vector_backend,
            telemetry: self.telemetry,
        })
    }
}

impl SearchRouter {
    pub fn builder(store: Arc<dyn DocumentStore>) -> SearchRouterBuilder {
        SearchRouterBuilder {
            store,
            config: SearchConfig::default(),
            embedder: None,
            exact_backend: ExactBackend::NoOp,
            vector_backend: None,
            telemetry: Arc::new(NoopTelemetry),
            adapters: None,
        }
    }

    /// Wire store, embedder and telemetry from configuration
    pub async fn from_config(config: &Config) -> RouterResult<Self> {
        config.validate()?;

        let store: Arc<dyn DocumentStore> = match &config.database.url {
            Some(_) => Arc::new(PostgresStore::new(&config.database).await?),
            None => {
                info!("DATABASE_URL not set, using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };

        let mut builder = SearchRouter::builder(store)
            .config(config.search.clone())
            .telemetry(telemetry_from_config(&config.telemetry));

        if config.embedding.api_base.is_some() {
            builder = builder.embedder(Arc::new(HttpEmbedder::from_config(&config.embedding)?));
        } else if config.embedding.synthetic {
            builder = builder.synthetic_embeddings(config.embedding.dimension);
        } else {
            warn!("No query embedder configured; vector searches will fail with a configuration error");
        }

        builder.build()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Resolve aliases and `auto`; fixed for the rest of the request
    pub fn decide(requested: &RequestedRoute, query: &str) -> RouteDecision {
        let resolved = match requested.clone().normalized() {
            RequestedRoute::Auto => classify(query),
            RequestedRoute::Exact => Route::Exact,
            RequestedRoute::Semantic | RequestedRoute::Vector => Route::Semantic,
            RequestedRoute::Hybrid => Route::Hybrid,
            RequestedRoute::Unrecognized(value) => {
                warn!("Unrecognized route {:?}, using semantic", value);
                Route::Semantic
            }
        };

        RouteDecision {
            requested: requested.clone(),
            resolved,
        }
    }

    pub async fn route(&self, request: SearchRequest) -> SearchResponse {
        self.route_with_cancel(request, CancellationToken::new()).await
    }

    #[instrument(
        skip(self, request, cancel),
        fields(request_id = field::Empty, route = field::Empty, top_k = field::Empty)
    )]
    pub async fn route_with_cancel(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> SearchResponse {
        let start = Instant::now();
        let request_id = Uuid::new_v4();

        let decision = Self::decide(&request.route, &request.query);
        let top_k = self.config.clamp_top_k(request.top_k);
        if request.top_k > self.config.max_top_k {
            warn!("top_k {} exceeds maximum, clamped to {}", request.top_k, top_k);
        }

        let span = Span::current();
        span.record("request_id", field::display(request_id));
        span.record("route", field::display(decision.label()));
        span.record("top_k", top_k);

        info!(
            "Search request: query='{}', route={}, top_k={}",
            sanitize_query(&request.query),
            decision.label(),
            top_k
        );

        let call_timeout = request
            .adapter_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.adapter_timeout());

        let plan = SearchPlan {
            query: &request.query,
            route: decision.resolved,
            top_k,
            filters: request.filters.as_ref().filter(|f| !f.is_empty()),
            corpora: request.corpora(),
            call_timeout,
            cancel,
        };

        let mut metadata = ResponseMetadata::new(request_id);
        metadata.decision = Some(decision.clone());

        let request_timeout = self.config.request_timeout();
        let mut response = match timeout(request_timeout, self.controller.execute(&plan)).await {
            Ok(Ok(outcome)) if outcome.total_failure => {
                let errors = outcome.errors.join("; ");
                let e = RouterError::Backend(format!("All retrieval strategies failed: {}", errors));
                let mut metadata = metadata;
                Self::attach_outcome(&mut metadata, &outcome);
                self.error_response(&request.query, metadata, outcome.fallback_applied, &e)
            }
            Ok(Ok(outcome)) => self.build_response(&request.query, &decision, top_k, metadata, outcome),
            Ok(Err(e)) => self.error_response(&request.query, metadata, false, &e),
            Err(_) => {
                let e = RouterError::Timeout(request_timeout.as_millis() as u64);
                self.error_response(&request.query, metadata, false, &e)
            }
        };

        response.metadata.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.emit_telemetry(&response, &decision);

        debug!(
            "Search completed in {:.2}ms: {} results, quality={}",
            response.metadata.duration_ms,
            response.results.len(),
            response.quality.level.as_str()
        );

        response
    }

    fn attach_outcome(metadata: &mut ResponseMetadata, outcome: &FallbackOutcome) {
        metadata.candidate_count = outcome.results.len();
        metadata.fallback_attempts = outcome.fallback_attempts;
        metadata.states = outcome.states.clone();
        metadata.strategies = outcome.strategies.clone();
        metadata.errors = outcome.errors.clone();
    }

    fn build_response(
        &self,
        query: &str,
        decision: &RouteDecision,
        top_k: usize,
        mut metadata: ResponseMetadata,
        outcome: FallbackOutcome,
    ) -> SearchResponse {
        Self::attach_outcome(&mut metadata, &outcome);

        let results = dedupe_and_rank(outcome.results, top_k);
        let quality = assess(&results, query);

        SearchResponse {
            route: decision.label(),
            query: query.to_string(),
            results,
            quality,
            fallback_applied: outcome.fallback_applied,
            metadata,
        }
    }

    fn error_response(
        &self,
        query: &str,
        mut metadata: ResponseMetadata,
        fallback_applied: bool,
        e: &RouterError,
    ) -> SearchResponse {
        if e.is_config_error() {
            error!("Search failed due to configuration: {}", e);
        } else {
            warn!("Search failed: {}", e);
        }

        metadata.errors.push(e.to_string());
        metadata.error_kind = Some(e.error_type().to_string());

        SearchResponse {
            route: ERROR_ROUTE.to_string(),
            query: query.to_string(),
            results: Vec::new(),
            quality: QualityVerdict::error(),
            fallback_applied,
            metadata,
        }
    }

    fn emit_telemetry(&self, response: &SearchResponse, decision: &RouteDecision) {
        let resolved_route = if response.is_error() {
            ERROR_ROUTE
        } else {
            decision.resolved.as_str()
        };

        let mut fields = Map::new();
        fields.insert("request_id".to_string(), json!(response.metadata.request_id));
        fields.insert("query".to_string(), json!(sanitize_query(&response.query)));
        fields.insert("route".to_string(), json!(response.route));
        fields.insert("requested_route".to_string(), json!(decision.requested.as_str()));
        fields.insert("resolved_route".to_string(), json!(resolved_route));
        fields.insert("result_count".to_string(), json!(response.results.len()));
        fields.insert("candidate_count".to_string(), json!(response.metadata.candidate_count));
        fields.insert("fallback_applied".to_string(), json!(response.fallback_applied));
        fields.insert("fallback_attempts".to_string(), json!(response.metadata.fallback_attempts));
        fields.insert("quality".to_string(), json!(response.quality.level.as_str()));
        fields.insert("duration_ms".to_string(), json!(response.metadata.duration_ms));
        if let Some(kind) = &response.metadata.error_kind {
            fields.insert("error_kind".to_string(), Value::from(kind.as_str()));
        }

        self.telemetry.emit(SEARCH_EVENT, &fields);
        if response.is_error() {
            self.telemetry.emit(SEARCH_ERROR_EVENT, &fields);
        }
    }

    /// Store reachability, corpus sizes and wiring
    pub async fn health_check(&self) -> RouterHealth {
        let mut components = BTreeMap::new();

        let start = Instant::now();
        let (faq_entries, document_chunks) = match self.store.health_check().await {
            Ok(()) => {
                let (faq, docs) = tokio::join!(
                    self.store.count(Corpus::Faq, None),
                    self.store.count(Corpus::Document, None)
                );
                let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                let health = match (&faq, &docs) {
                    (Ok(_), Ok(_)) => ComponentHealth::healthy(elapsed),
                    (Err(e), _) | (_, Err(e)) => {
                        ComponentHealth::with_status(HealthStatus::Degraded, format!("Count failed: {}", e))
                    }
                };
                components.insert("store".to_string(), health);
                (faq.ok(), docs.ok())
            }
            Err(e) => {
                components.insert(
                    "store".to_string(),
                    ComponentHealth::with_status(HealthStatus::Unhealthy, e.to_string()),
                );
                (None, None)
            }
        };

        let embedder_health = match &self.embedder {
            Some(embedder) => ComponentHealth::with_status(
                HealthStatus::Healthy,
                format!("{} ({} dimensions)", embedder.name(), embedder.dimension()),
            ),
            None => ComponentHealth::with_status(
                HealthStatus::Degraded,
                "no query embedder configured",
            ),
        };
        components.insert("embedder".to_string(), embedder_health);

        RouterHealth {
            status: overall_status(components.values()),
            timestamp: chrono::Utc::now(),
            components,
            faq_entries,
            document_chunks,
            store: self.store.name().to_string(),
            exact_backend: self.exact_backend.name().to_string(),
            vector_backend: self.vector_backend.name().to_string(),
            embedder: self.embedder.as_ref().map(|e| e.name().to_string()),
        }
    }
}

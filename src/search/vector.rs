/// Vector search adapter
///
/// Embeds the query, then asks the store's managed nearest-neighbour index
/// for `min(top_k * multiplier, cap)` candidates. When the managed index is
/// unavailable (or the scan backend is configured) candidates come from text
/// search or an embedded-records scan and are scored locally by cosine
/// similarity. Hybrid requests blend in keyword overlap in the same pass.
use super::{sort_and_truncate, AdapterQuery, SearchAdapter, Strategy};
use crate::config::{SearchConfig, VectorBackendKind};
use crate::embedding::QueryEmbedder;
use crate::error::{RouterError, RouterResult};
use crate::search::similarity::{cosine_similarity, keyword_overlap};
use crate::store::{DocumentStore, StoreQuery};
use crate::types::{score_metrics, source_tags, KnowledgeRecord, Route, ScoredRecord, SearchResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Vector retrieval variant, chosen once when the router is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    /// Store-managed index, with local scoring as the failure path
    Managed,
    /// Local candidate fetch plus cosine scoring only
    FallbackScan,
}

impl VectorBackend {
    pub fn name(&self) -> &'static str {
        match self {
            VectorBackend::Managed => "managed",
            VectorBackend::FallbackScan => "fallback-scan",
        }
    }
}

impl From<VectorBackendKind> for VectorBackend {
    fn from(kind: VectorBackendKind) -> Self {
        match kind {
            VectorBackendKind::Managed => VectorBackend::Managed,
            VectorBackendKind::Scan => VectorBackend::FallbackScan,
        }
    }
}

pub struct VectorSearchAdapter {
    store: Arc<dyn DocumentStore>,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    backend: VectorBackend,
    config: Arc<SearchConfig>,
}

impl VectorSearchAdapter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Option<Arc<dyn QueryEmbedder>>,
        backend: VectorBackend,
        config: Arc<SearchConfig>,
    ) -> Self {
        Self {
            store,
            embedder,
            backend,
            config,
        }
    }

    async fn managed_search(
        &self,
        query_vector: &[f32],
        query: &AdapterQuery<'_>,
        limit: usize,
    ) -> RouterResult<Vec<SearchResult>> {
        let store_query = StoreQuery::new(query.corpus, limit).with_filters(query.filters.cloned());
        let hits = self.store.vector_search(query_vector, &store_query).await?;
        debug!("Managed vector index returned {} {} candidates", hits.len(), query.corpus);

        Ok(hits
            .into_iter()
            .map(|hit| {
                hit.record
                    .into_result(hit.score, source_tags::VECTOR_INDEX, score_metrics::COSINE)
            })
            .collect())
    }

    /// Fetch candidates via text search or scan, then score them locally
    async fn local_search(
        &self,
        query_vector: &[f32],
        query: &AdapterQuery<'_>,
        limit: usize,
    ) -> RouterResult<Vec<SearchResult>> {
        let text_query = StoreQuery::new(query.corpus, limit)
            .with_filters(query.filters.cloned())
            .with_embeddings();

        let text_hits: Vec<ScoredRecord> = if query.query.trim().is_empty() {
            Vec::new()
        } else {
            match self.store.text_search(query.query, &text_query).await {
                Ok(hits) => hits,
                Err(e) => {
                    debug!("Text candidate fetch failed, using scan: {}", e);
                    Vec::new()
                }
            }
        };

        let mut candidates: Vec<KnowledgeRecord> =
            text_hits.iter().map(|hit| hit.record.clone()).collect();

        let usable = |record: &KnowledgeRecord| {
            record
                .embedding
                .as_ref()
                .is_some_and(|e| e.len() == query_vector.len())
        };
        if !candidates.iter().any(usable) {
            let scan_query = StoreQuery::new(query.corpus, self.config.scan_limit)
                .with_filters(query.filters.cloned())
                .embedded_only();
            match self.store.scan(&scan_query).await {
                Ok(records) => candidates = records,
                Err(e) if text_hits.is_empty() => {
                    return Err(RouterError::Backend(format!(
                        "No vector candidates available: {}",
                        e
                    )));
                }
                Err(e) => warn!("Candidate scan failed: {}", e),
            }
        }

        let candidate_count = candidates.len();
        let scored: Vec<SearchResult> = candidates
            .into_iter()
            .filter_map(|record| {
                let score = match record.embedding.as_deref() {
                    Some(embedding) if embedding.len() == query_vector.len() => {
                        cosine_similarity(query_vector, embedding)
                    }
                    Some(embedding) => {
                        debug!(
                            "Skipping candidate {:?}: dimension {} != {}",
                            record.identity,
                            embedding.len(),
                            query_vector.len()
                        );
                        return None;
                    }
                    None => return None,
                };
                if record.content.trim().is_empty() {
                    return None;
                }
                Some(record.into_result(score, source_tags::FALLBACK_SCAN, score_metrics::COSINE))
            })
            .collect();

        debug!(
            "Local scoring kept {} of {} {} candidates",
            scored.len(),
            candidate_count,
            query.corpus
        );

        if scored.is_empty() && !text_hits.is_empty() {
            // Unranked text hits beat an empty answer
            return Ok(text_hits
                .into_iter()
                .map(|hit| {
                    hit.record
                        .into_result(hit.score, source_tags::TEXT_INDEX, score_metrics::TEXT_SCORE)
                })
                .collect());
        }

        Ok(scored)
    }

    fn blend_hybrid(&self, query: &str, results: &mut [SearchResult]) {
        let weight = self.config.hybrid_text_weight;
        for result in results.iter_mut().filter(|r| r.metric == score_metrics::COSINE) {
            let overlap = keyword_overlap(query, &format!("{} {}", result.title, result.content));
            result.score = (1.0 - weight) * result.score + weight * overlap;
            result.metric = score_metrics::HYBRID.to_string();
        }
    }
}

#[async_trait]
impl SearchAdapter for VectorSearchAdapter {
    fn strategy(&self) -> Strategy {
        Strategy::Vector
    }

    #[instrument(skip(self, query), fields(corpus = %query.corpus, top_k = query.top_k, backend = self.backend.name()))]
    async fn search(&self, query: &AdapterQuery<'_>) -> RouterResult<Vec<SearchResult>> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            RouterError::ConfigError(
                "no query embedder configured and synthetic embeddings are disabled".to_string(),
            )
        })?;

        let query_vector = embedder.embed(query.query).await?;
        let limit = self.config.candidate_limit(query.top_k);

        let mut results = match self.backend {
            VectorBackend::Managed => match self.managed_search(&query_vector, query, limit).await {
                Ok(results) => results,
                Err(e) => {
                    warn!("Managed vector index failed, scoring locally: {}", e);
                    self.local_search(&query_vector, query, limit).await?
                }
            },
            VectorBackend::FallbackScan => self.local_search(&query_vector, query, limit).await?,
        };

        if query.route == Route::Hybrid {
            self.blend_hybrid(query.query, &mut results);
        }

        sort_and_truncate(&mut results, query.top_k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::SyntheticEmbedder;
    use crate::store::InMemoryStore;
    use crate::types::Corpus;

    const DIM: usize = 256;

    fn store_with(records: Vec<KnowledgeRecord>) -> InMemoryStore {
        InMemoryStore::with_records(records)
    }

    fn embedded_records() -> Vec<KnowledgeRecord> {
        let embedder = SyntheticEmbedder::new(DIM);
        let mut records = vec![
            KnowledgeRecord::document_chunk("1", 0, "Password reset", "Reset your password from the login page."),
            KnowledgeRecord::document_chunk("2", 0, "Invoices", "Invoices are emailed monthly to billing owners."),
            KnowledgeRecord::document_chunk("3", 0, "Refunds", "Refunds are processed within five business days."),
        ];
        for record in &mut records {
            record.embedding = Some(embedder.vector_for(&format!("{} {}", record.title, record.content)));
        }
        records
    }

    fn adapter(store: InMemoryStore, backend: VectorBackend) -> VectorSearchAdapter {
        VectorSearchAdapter::new(
            Arc::new(store),
            Some(Arc::new(SyntheticEmbedder::new(DIM))),
            backend,
            Arc::new(SearchConfig::default()),
        )
    }

    fn query(text: &str, route: Route) -> AdapterQuery<'_> {
        AdapterQuery {
            query: text,
            corpus: Corpus::Document,
            top_k: 2,
            filters: None,
            route,
        }
    }

    #[tokio::test]
    async fn test_missing_embedder_is_config_error() {
        let adapter = VectorSearchAdapter::new(
            Arc::new(InMemoryStore::new()),
            None,
            VectorBackend::Managed,
            Arc::new(SearchConfig::default()),
        );
        let err = adapter.search(&query("reset password", Route::Semantic)).await.unwrap_err();
        assert!(err.is_config_error());
    }

    #[tokio::test]
    async fn test_managed_index_results() {
        let adapter = adapter(store_with(embedded_records()), VectorBackend::Managed);
        let results = adapter.search(&query("reset password", Route::Semantic)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].identity.as_deref(), Some("doc:1:chunk:0"));
        assert_eq!(results[0].source, source_tags::VECTOR_INDEX);
        assert_eq!(results[0].metric, score_metrics::COSINE);
    }

    #[tokio::test]
    async fn test_unavailable_index_scores_locally() {
        let store = store_with(embedded_records()).without_vector_index();
        let adapter = adapter(store, VectorBackend::Managed);
        let results = adapter.search(&query("reset password", Route::Semantic)).await.unwrap();

        assert_eq!(results[0].identity.as_deref(), Some("doc:1:chunk:0"));
        assert_eq!(results[0].source, source_tags::FALLBACK_SCAN);
        assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_skipped() {
        let mut records = embedded_records();
        records[0].embedding = Some(vec![1.0, 0.0, 0.0]);
        let adapter = adapter(store_with(records), VectorBackend::FallbackScan);

        let results = adapter.search(&query("reset password", Route::Semantic)).await.unwrap();
        assert!(results.iter().all(|r| r.identity.as_deref() != Some("doc:1:chunk:0")));
    }

    #[tokio::test]
    async fn test_blank_content_is_skipped() {
        let embedder = SyntheticEmbedder::new(DIM);
        let mut records = embedded_records();
        let mut blank = KnowledgeRecord::document_chunk("4", 0, "Password reset policy", "   ");
        blank.embedding = Some(embedder.vector_for("Password reset policy"));
        records.push(blank);
        let adapter = adapter(store_with(records), VectorBackend::FallbackScan);

        let results = adapter.search(&query("reset password", Route::Semantic)).await.unwrap();

        assert!(results.iter().all(|r| r.identity.as_deref() != Some("doc:4:chunk:0")));
        assert_eq!(results[0].identity.as_deref(), Some("doc:1:chunk:0"));
        assert_eq!(results[0].source, source_tags::FALLBACK_SCAN);
        assert_eq!(results[0].metric, score_metrics::COSINE);
    }

    #[tokio::test]
    async fn test_no_embeddings_returns_raw_text_hits() {
        let records = vec![KnowledgeRecord::document_chunk(
            "7",
            0,
            "Password reset",
            "Reset your password from the login page.",
        )];
        let adapter = adapter(store_with(records), VectorBackend::FallbackScan);

        let results = adapter.search(&query("reset password", Route::Semantic)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metric, score_metrics::TEXT_SCORE);
    }

    #[tokio::test]
    async fn test_hybrid_blends_keyword_overlap() {
        let adapter = adapter(store_with(embedded_records()), VectorBackend::Managed);
        let semantic = adapter.search(&query("reset password", Route::Semantic)).await.unwrap();
        let hybrid = adapter.search(&query("reset password", Route::Hybrid)).await.unwrap();

        assert_eq!(hybrid[0].metric, score_metrics::HYBRID);
        let weight = SearchConfig::default().hybrid_text_weight;
        let expected = (1.0 - weight) * semantic[0].score + weight * 1.0;
        assert!((hybrid[0].score - expected).abs() < 1e-5);
    }
}

/// Exact search adapter
///
/// Tries, in order: the external exact-match backend, the store's full-text
/// index, then a permissive keyword scan. Failures fall through to the next
/// path; only a failing scan is reported to the caller.
use super::{sort_and_truncate, AdapterQuery, SearchAdapter, Strategy};
use crate::error::RouterResult;
use crate::exact_backend::ExactMatchService;
use crate::search::similarity::terms;
use crate::store::{DocumentStore, StoreQuery};
use crate::types::{score_metrics, source_tags, KnowledgeRecord, SearchResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Score assigned to every scanned record when the query is empty
const NEUTRAL_SCAN_SCORE: f32 = 0.5;

/// Exact-match fast path, chosen once when the router is built
#[derive(Clone)]
pub enum ExactBackend {
    External(Arc<dyn ExactMatchService>),
    NoOp,
}

impl ExactBackend {
    pub fn name(&self) -> &str {
        match self {
            ExactBackend::External(service) => service.name(),
            ExactBackend::NoOp => "noop",
        }
    }
}

/// Keyword/full-text adapter over one store
pub struct ExactSearchAdapter {
    store: Arc<dyn DocumentStore>,
    backend: ExactBackend,
    scan_limit: usize,
}

impl ExactSearchAdapter {
    pub fn new(store: Arc<dyn DocumentStore>, backend: ExactBackend, scan_limit: usize) -> Self {
        Self {
            store,
            backend,
            scan_limit,
        }
    }

    async fn external_search(
        &self,
        service: &dyn ExactMatchService,
        query: &AdapterQuery<'_>,
    ) -> Option<Vec<SearchResult>> {
        let scope = StoreQuery::new(query.corpus, query.top_k).with_filters(query.filters.cloned());
        match service.search(query.query, &scope).await {
            Ok(mut results) => {
                if results.is_empty() {
                    debug!("Exact backend {} had no {} matches", service.name(), query.corpus);
                    return None;
                }
                sort_and_truncate(&mut results, query.top_k);
                Some(results)
            }
            Err(e) => {
                warn!("Exact backend {} failed, falling through: {}", service.name(), e);
                None
            }
        }
    }

    async fn text_search(&self, query: &AdapterQuery<'_>) -> Option<Vec<SearchResult>> {
        let store_query =
            StoreQuery::new(query.corpus, query.top_k).with_filters(query.filters.cloned());
        match self.store.text_search(query.query, &store_query).await {
            Ok(hits) => {
                let mut results: Vec<SearchResult> = hits
                    .into_iter()
                    .map(|hit| {
                        hit.record
                            .into_result(hit.score, source_tags::TEXT_INDEX, score_metrics::TEXT_SCORE)
                    })
                    .collect();
                sort_and_truncate(&mut results, query.top_k);
                Some(results)
            }
            Err(e) => {
                warn!("Text search on {} failed, falling back to scan: {}", self.store.name(), e);
                None
            }
        }
    }

    async fn keyword_scan(&self, query: &AdapterQuery<'_>) -> RouterResult<Vec<SearchResult>> {
        let store_query =
            StoreQuery::new(query.corpus, self.scan_limit).with_filters(query.filters.cloned());
        let records = self.store.scan(&store_query).await?;
        debug!("Keyword scan over {} {} records", records.len(), query.corpus);

        let words: Vec<String> = {
            let mut seen = HashSet::new();
            terms(query.query)
                .into_iter()
                .filter(|w| seen.insert(w.clone()))
                .collect()
        };

        let mut results: Vec<SearchResult> = records
            .into_iter()
            .filter_map(|record| {
                let score = if words.is_empty() {
                    NEUTRAL_SCAN_SCORE
                } else {
                    scan_score(&words, &record)
                };
                (score > 0.0).then(|| {
                    record.into_result(score, source_tags::KEYWORD_SCAN, score_metrics::REGEX_MATCH)
                })
            })
            .collect();

        sort_and_truncate(&mut results, query.top_k);
        Ok(results)
    }
}

/// Occurrences of each query word normalized by content length in words,
/// averaged over query words
fn scan_score(words: &[String], record: &KnowledgeRecord) -> f32 {
    let haystack = format!("{} {}", record.title, record.content).to_lowercase();
    let length = haystack.split_whitespace().count().max(1) as f32;

    let total: f32 = words
        .iter()
        .map(|word| haystack.matches(word.as_str()).count() as f32 / length)
        .sum();

    (total / words.len() as f32).min(1.0)
}

#[async_trait]
impl SearchAdapter for ExactSearchAdapter {
    fn strategy(&self) -> Strategy {
        Strategy::Exact
    }

    async fn search(&self, query: &AdapterQuery<'_>) -> RouterResult<Vec<SearchResult>> {
        if let ExactBackend::External(service) = &self.backend {
            if let Some(results) = self.external_search(service.as_ref(), query).await {
                return Ok(results);
            }
        }

        if !query.query.trim().is_empty() {
            if let Some(results) = self.text_search(query).await {
                return Ok(results);
            }
        }

        self.keyword_scan(query).await
    }
}

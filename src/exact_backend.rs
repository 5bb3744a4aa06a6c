/// Exact-match backend boundary
///
/// An optional fast path for identity and keyword lookups. When no backend
/// is wired the exact adapter goes straight to full-text search.
use crate::error::RouterResult;
use crate::search::similarity::terms;
use crate::store::StoreQuery;
use crate::types::{score_metrics, source_tags, KnowledgeRecord, SearchResult};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// External identity/keyword store
#[async_trait]
pub trait ExactMatchService: Send + Sync {
    fn name(&self) -> &str;

    /// Matches restricted to `scope.corpus` and `scope.filters`, at most `scope.limit`
    async fn search(&self, query: &str, scope: &StoreQuery) -> RouterResult<Vec<SearchResult>>;
}

/// Score for an identity or whole-title match
const IDENTITY_MATCH_SCORE: f32 = 1.0;
/// Score when every query term appears in the title
const KEYWORD_MATCH_SCORE: f32 = 0.9;

/// In-process keyword index keyed by identity and normalized title
#[derive(Default)]
pub struct KeywordIndex {
    entries: RwLock<HashMap<String, KnowledgeRecord>>,
}

fn normalize(text: &str) -> String {
    terms(text).join(" ")
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index records; records without identity are ignored
    pub async fn extend(&self, records: impl IntoIterator<Item = KnowledgeRecord>) {
        let mut entries = self.entries.write().await;
        for mut record in records {
            record.embedding = None;
            if let Some(identity) = record.identity.clone() {
                entries.insert(identity, record);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ExactMatchService for KeywordIndex {
    fn name(&self) -> &str {
        "keyword-index"
    }

    async fn search(&self, query: &str, scope: &StoreQuery) -> RouterResult<Vec<SearchResult>> {
        let trimmed = query.trim();
        let normalized = normalize(trimmed);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let query_terms = terms(trimmed);

        let entries = self.entries.read().await;
        let mut results: Vec<SearchResult> = entries
            .iter()
            .filter(|(_, record)| record.kind == scope.corpus)
            .filter(|(_, record)| {
                scope
                    .filters
                    .as_ref()
                    .map_or(true, |f| record.metadata.matches(f))
            })
            .filter_map(|(identity, record)| {
                let title = normalize(&record.title);
                let score = if identity.eq_ignore_ascii_case(trimmed) || title == normalized {
                    IDENTITY_MATCH_SCORE
                } else {
                    let title_terms = terms(&record.title);
                    if query_terms.iter().all(|term| title_terms.contains(term)) {
                        KEYWORD_MATCH_SCORE
                    } else {
                        return None;
                    }
                };
                Some(record.clone().into_result(
                    score,
                    source_tags::EXACT_BACKEND,
                    score_metrics::EXACT_MATCH,
                ))
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        results.truncate(scope.limit);
        Ok(results)
    }
}

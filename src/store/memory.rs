use super::{DocumentStore, StoreQuery};
use crate::error::{RouterError, RouterResult};
use crate::search::similarity::{cosine_similarity, keyword_overlap};
use crate::types::{Corpus, KnowledgeRecord, ScoredRecord, SearchFilters};
use async_trait::async_trait;
use std::cmp::Ordering;
use tokio::sync::RwLock;
use tracing::debug;

/// In-process store over a vector of records
///
/// The text index scores a record by the fraction of query terms found in
/// its title and content. The vector index is a brute-force cosine scan.
/// Either index can be switched off to exercise adapter fallback paths.
pub struct InMemoryStore {
    records: RwLock<Vec<KnowledgeRecord>>,
    text_index: bool,
    vector_index: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<KnowledgeRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            text_index: true,
            vector_index: true,
        }
    }

    /// Make `text_search` fail as if no full-text index existed
    pub fn without_text_index(mut self) -> Self {
        self.text_index = false;
        self
    }

    /// Make `vector_search` fail as if no managed vector index existed
    pub fn without_vector_index(mut self) -> Self {
        self.vector_index = false;
        self
    }

    pub async fn insert(&self, record: KnowledgeRecord) {
        self.records.write().await.push(record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn selects(record: &KnowledgeRecord, query: &StoreQuery) -> bool {
        record.kind == query.corpus
            && query
                .filters
                .as_ref()
                .map_or(true, |filters| record.metadata.matches(filters))
            && (!query.embedded_only
                || (record.has_embedding() && !record.content.trim().is_empty()))
    }

    fn project(record: &KnowledgeRecord, query: &StoreQuery) -> KnowledgeRecord {
        let mut record = record.clone();
        if !query.include_embeddings {
            record.embedding = None;
        }
        record
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn rank(mut hits: Vec<ScoredRecord>, limit: usize) -> Vec<ScoredRecord> {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(limit);
    hits
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn text_search(&self, text: &str, query: &StoreQuery) -> RouterResult<Vec<ScoredRecord>> {
        if !self.text_index {
            return Err(RouterError::BackendUnavailable(
                "no full-text index on in-memory store".to_string(),
            ));
        }

        let records = self.records.read().await;
        let hits: Vec<ScoredRecord> = records
            .iter()
            .filter(|record| Self::selects(record, query))
            .filter_map(|record| {
                let haystack = format!("{} {}", record.title, record.content);
                let score = keyword_overlap(text, &haystack);
                (score > 0.0).then(|| ScoredRecord {
                    record: Self::project(record, query),
                    score,
                })
            })
            .collect();

        debug!("In-memory text search matched {} {} records", hits.len(), query.corpus);
        Ok(rank(hits, query.limit))
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        query: &StoreQuery,
    ) -> RouterResult<Vec<ScoredRecord>> {
        if !self.vector_index {
            return Err(RouterError::BackendUnavailable(
                "no vector index on in-memory store".to_string(),
            ));
        }

        let records = self.records.read().await;
        let hits: Vec<ScoredRecord> = records
            .iter()
            .filter(|record| Self::selects(record, query))
            .filter_map(|record| {
                let stored = record.embedding.as_deref()?;
                if stored.len() != embedding.len() {
                    return None;
                }
                Some(ScoredRecord {
                    score: cosine_similarity(embedding, stored),
                    record: Self::project(record, query),
                })
            })
            .collect();

        Ok(rank(hits, query.limit))
    }

    async fn scan(&self, query: &StoreQuery) -> RouterResult<Vec<KnowledgeRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| Self::selects(record, query))
            .take(query.limit)
            .map(|record| Self::project(record, query))
            .collect())
    }

    async fn count(&self, corpus: Corpus, filters: Option<&SearchFilters>) -> RouterResult<u64> {
        let records = self.records.read().await;
        let count = records
            .iter()
            .filter(|record| record.kind == corpus)
            .filter(|record| filters.map_or(true, |f| record.metadata.matches(f)))
            .count();
        Ok(count as u64)
    }

    async fn health_check(&self) -> RouterResult<()> {
        Ok(())
    }
}

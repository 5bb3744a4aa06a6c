/// Document/FAQ store boundary
///
/// The router only reads from the store. Implementations must support text
/// search with relevance scores, nearest-neighbour search over embeddings,
/// filtered scans and counting. `PostgresStore` backs production deployments
/// (pgvector + tsvector); `InMemoryStore` backs tests and small corpora.

mod memory;
mod postgres_client;
mod schema;


use crate::error::RouterResult;
use crate::types::{Corpus, KnowledgeRecord, ScoredRecord, SearchFilters};
use async_trait::async_trait;

pub use memory::InMemoryStore;
pub use postgres_client::{PostgresStats, PostgresStore};
pub use schema::KnowledgeSchema;

/// Parameters shared by every store read
#[derive(Debug, Clone)]
pub struct StoreQuery {
    pub corpus: Corpus,
    pub filters: Option<SearchFilters>,
    pub limit: usize,
    /// Project embeddings into returned records
    pub include_embeddings: bool,
    /// Only return records that carry an embedding and non-empty content
    pub embedded_only: bool,
}

impl StoreQuery {
    pub fn new(corpus: Corpus, limit: usize) -> Self {
        Self {
            corpus,
            filters: None,
            limit,
            include_embeddings: false,
            embedded_only: false,
        }
    }

    pub fn with_filters(mut self, filters: Option<SearchFilters>) -> Self {
        self.filters = filters.filter(|f| !f.is_empty());
        self
    }

    pub fn with_embeddings(mut self) -> Self {
        self.include_embeddings = true;
        self
    }

    pub fn embedded_only(mut self) -> Self {
        self.include_embeddings = true;
        self.embedded_only = true;
        self
    }
}

/// Read-only access to the FAQ and document corpora
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and health reports
    fn name(&self) -> &'static str;

    /// Full-text search scored by the backend's native relevance function
    async fn text_search(&self, text: &str, query: &StoreQuery) -> RouterResult<Vec<ScoredRecord>>;

    /// Managed nearest-neighbour search; scores are cosine similarities
    async fn vector_search(
        &self,
        embedding: &[f32],
        query: &StoreQuery,
    ) -> RouterResult<Vec<ScoredRecord>>;

    /// Filtered scan bounded by `query.limit`
    async fn scan(&self, query: &StoreQuery) -> RouterResult<Vec<KnowledgeRecord>>;

    /// Count records in a corpus matching the filters
    async fn count(&self, corpus: Corpus, filters: Option<&SearchFilters>) -> RouterResult<u64>;

    /// Check store reachability
    async fn health_check(&self) -> RouterResult<()>;
}

/// Parse the textual pgvector form "[1,2,3]"
pub(crate) fn parse_vector_literal(text: &str) -> Result<Vec<f32>, std::num::ParseFloatError> {
    let trimmed = text.trim().trim_start_matches('[').trim_end_matches(']');
    if trimmed.trim().is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|s| s.trim().parse::<f32>())
        .collect()
}

/// Render a vector in the textual pgvector form
pub(crate) fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

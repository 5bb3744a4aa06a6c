/// Knowledge search module
///
/// This module contains:
/// - Query classification and similarity primitives
/// - Exact and vector search adapters over the document/FAQ store
/// - The fallback controller that sequences adapter calls
/// - Deduplication, re-ranking and quality assessment
/// - The `SearchRouter` façade

pub mod classifier;
pub mod exact;
pub mod fallback;
pub mod quality;
pub mod reranking;
pub mod service;
pub mod similarity;
pub mod vector;

#[cfg(test)]
mod tests;

use crate::error::RouterResult;
use crate::types::{Corpus, Route, SearchFilters, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use classifier::classify;
pub use exact::{ExactBackend, ExactSearchAdapter};
pub use fallback::{
    CorpusOutcome, FallbackController, FallbackOutcome, FallbackState, SearchPlan, StrategyDiagnostics,
    StrategyRole,
};
pub use quality::assess;
pub use reranking::dedupe_and_rank;
pub use service::{SearchRouter, SearchRouterBuilder};
pub use similarity::cosine_similarity;
pub use vector::{VectorBackend, VectorSearchAdapter};

/// Retrieval strategy implemented by an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Exact,
    Vector,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Exact => f.write_str("exact"),
            Strategy::Vector => f.write_str("vector"),
        }
    }
}

/// One adapter call: a query against a single corpus
#[derive(Debug, Clone, Copy)]
pub struct AdapterQuery<'a> {
    pub query: &'a str,
    pub corpus: Corpus,
    pub top_k: usize,
    pub filters: Option<&'a SearchFilters>,
    /// Resolved route of the request; the vector adapter blends scores for hybrid
    pub route: Route,
}

/// A backend search strategy
///
/// Adapters return at most `top_k` results sorted by score descending, never
/// expose embeddings, and keep no reference to results after returning.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn search(&self, query: &AdapterQuery<'_>) -> RouterResult<Vec<SearchResult>>;
}

/// Sort by score descending and keep the first `top_k`
pub(crate) fn sort_and_truncate(results: &mut Vec<SearchResult>, top_k: usize) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
}

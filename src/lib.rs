//! Knowledge search router
//!
//! Classifies a query into an exact, semantic or hybrid route, runs the
//! matching retrieval strategy over the FAQ and document corpora with a
//! single-hop fallback to the opposite strategy, then deduplicates, ranks
//! and grades the pooled results.

pub mod config;
pub mod embedding;
pub mod error;
pub mod exact_backend;
pub mod observability;
pub mod search;
pub mod store;
pub mod types;

pub use config::{Config, SearchConfig};
pub use embedding::{HttpEmbedder, QueryEmbedder, SyntheticEmbedder};
pub use error::{RouterError, RouterResult};
pub use exact_backend::{ExactMatchService, KeywordIndex};
pub use observability::{init_tracing, TelemetrySink};
pub use search::{
    assess, classify, cosine_similarity, dedupe_and_rank, ExactBackend, FallbackController,
    SearchAdapter, SearchRouter, SearchRouterBuilder, Strategy, VectorBackend,
};
pub use store::{DocumentStore, InMemoryStore, PostgresStore, StoreQuery};
pub use types::*;

/// Query embedding boundary
///
/// Embedding generation itself is an external capability. The router only
/// needs `embed(text) -> Vec<f32>`; `HttpEmbedder` calls an OpenAI-compatible
/// endpoint and `SyntheticEmbedder` provides a deterministic test mode.

mod http;
mod synthetic;

use crate::error::RouterResult;
use async_trait::async_trait;

pub use http::HttpEmbedder;
pub use synthetic::SyntheticEmbedder;

/// Turns a query into a vector comparable with stored embeddings
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Embed one query
    async fn embed(&self, text: &str) -> RouterResult<Vec<f32>>;

    /// Dimension of produced vectors
    fn dimension(&self) -> usize;

    /// Provider name for logs and health reports
    fn name(&self) -> &str;
}

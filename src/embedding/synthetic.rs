use super::QueryEmbedder;
use crate::error::{RouterError, RouterResult};
use crate::search::similarity::terms;
use async_trait::async_trait;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic hashed bag-of-words embedder
///
/// Words and character trigrams are hashed into signed buckets, then the
/// vector is normalized to unit length. Texts sharing vocabulary land close
/// together, which is enough for tests and offline demos.
#[derive(Debug, Clone)]
pub struct SyntheticEmbedder {
    dimension: usize,
}

impl SyntheticEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed synchronously; used to seed stores in tests and demos
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for word in terms(text) {
            self.accumulate(&mut embedding, word.as_bytes(), 1.0);

            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for trigram in padded.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.accumulate(&mut embedding, trigram.as_bytes(), 0.5);
            }
        }

        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }

    fn accumulate(&self, embedding: &mut [f32], bytes: &[u8], weight: f32) {
        let hash = fnv1a(bytes);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign * weight;
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl QueryEmbedder for SyntheticEmbedder {
    async fn embed(&self, text: &str) -> RouterResult<Vec<f32>> {
        if terms(text).is_empty() {
            return Err(RouterError::EmbeddingError("Empty query for encoding".to_string()));
        }
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::similarity::cosine_similarity;

    #[tokio::test]
    async fn test_embedding_is_deterministic_and_normalized() {
        let embedder = SyntheticEmbedder::new(64);
        let a = embedder.embed("reset my password").await.unwrap();
        let b = embedder.embed("reset my password").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_closer() {
        let embedder = SyntheticEmbedder::new(256);
        let query = embedder.vector_for("reset password");
        let related = embedder.vector_for("How do I reset my password?");
        let unrelated = embedder.vector_for("Quarterly invoices are emailed to owners.");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let embedder = SyntheticEmbedder::new(16);
        let err = embedder.embed("   ").await.unwrap_err();
        assert_eq!(err.error_type(), "embedding");
    }
}

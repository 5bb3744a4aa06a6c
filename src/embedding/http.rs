use super::QueryEmbedder;
use crate::config::EmbeddingConfig;
use crate::error::{RouterError, RouterResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client for an OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl HttpEmbedder {
    /// Build from configuration; requires `api_base`
    pub fn from_config(config: &EmbeddingConfig) -> RouterResult<Self> {
        let api_base = config.api_base.as_ref().ok_or_else(|| {
            RouterError::ConfigError("EMBEDDING_API_BASE is required for the HTTP embedder".to_string())
        })?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RouterError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", api_base.trim_end_matches('/'), config.path),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl QueryEmbedder for HttpEmbedder {
    #[instrument(skip(self, text), fields(model = %self.model, text_len = text.len()))]
    async fn embed(&self, text: &str) -> RouterResult<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
            "dimensions": self.dimension,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RouterError::EmbeddingError(format!("Embedding request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| RouterError::EmbeddingError(format!("Embedding provider error: {}", e)))?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| RouterError::EmbeddingError(format!("Invalid embedding response: {}", e)))?;

        let embedding = parse_embedding_response(json)?;
        if embedding.len() != self.dimension {
            return Err(RouterError::EmbeddingError(format!(
                "Expected {} dimensions, provider returned {}",
                self.dimension,
                embedding.len()
            )));
        }

        debug!("Embedded query into {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Extract the first embedding (by `index`) from a provider response
fn parse_embedding_response(json: Value) -> RouterResult<Vec<f32>> {
    let data = json
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RouterError::EmbeddingError("Embedding response is missing data array".to_string()))?;

    let item = data
        .iter()
        .enumerate()
        .min_by_key(|(position, item)| {
            item.get("index")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(*position)
        })
        .map(|(_, item)| item)
        .ok_or_else(|| RouterError::EmbeddingError("Embedding response has no items".to_string()))?;

    let values = item
        .get("embedding")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RouterError::EmbeddingError("Embedding item missing embedding array".to_string()))?;

    values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|n| n as f32)
                .ok_or_else(|| RouterError::EmbeddingError("Embedding value must be numeric".to_string()))
        })
        .collect()
}

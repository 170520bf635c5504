use crate::error::ProviderError;
use crate::provider::{ensure_success, malformed, ProviderConfig};
use crate::traits::Embedder;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// Deterministic character-trigram embedder. Needs no network and no key,
/// so it backs offline runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buf = [0u8; 4];
                for byte in ch.encode_utf8(&mut buf).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    config: ProviderConfig,
}

impl OpenAiEmbedder {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self.config.credentials.resolve()?;
        let payload = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        debug!(model = %self.config.embedding_model, inputs = texts.len(), "requesting embeddings");
        let response = self
            .client
            .post(self.config.endpoint("embeddings")?)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let parsed: EmbeddingResponse = ensure_success(response).await?.json().await?;
        order_embeddings(parsed, texts.len())
    }
}

fn order_embeddings(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if response.data.len() != expected {
        return Err(malformed(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        )));
    }

    let mut data = response.data;
    data.sort_by_key(|item| item.index);
    Ok(data.into_iter().map(|item| item.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed_one("Hydraulic pressure and flow");
        let second = embedder.embed_one("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = HashingEmbedder { dimensions: 32 };
        assert_eq!(embedder.embed_one("abc").len(), 32);
        assert!(embedder.embed_one("").iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn batch_embedding_keeps_input_order() {
        let embedder = HashingEmbedder::default();
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], embedder.embed_one("second text"));
    }

    #[test]
    fn provider_embeddings_are_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ],
            "model": "text-embedding-ada-002"
        }))
        .unwrap();

        let ordered = order_embeddings(response, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn short_provider_response_is_malformed() {
        let response = EmbeddingResponse { data: Vec::new() };
        assert!(matches!(
            order_embeddings(response, 3),
            Err(ProviderError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let config = ProviderConfig::new(
            "http://127.0.0.1:9/v1",
            crate::Credentials::from_env("PDF_CHAT_TEST_EMBEDDER_UNSET_KEY"),
        )
        .unwrap();
        let embedder = OpenAiEmbedder::new(config).unwrap();

        let result = embedder.embed(&["text".to_string()]).await;
        assert!(matches!(result, Err(ProviderError::MissingCredential(_))));
    }
}

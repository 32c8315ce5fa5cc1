use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use ridge_models::{EmbeddingConfig, EmbeddingProviderKind};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::vector_index::normalize;

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;
    fn dimension(&self) -> usize;
}

/// Deterministic signed feature hashing of tokens and token bigrams.
///
/// Identical text always yields the identical vector, and texts sharing
/// many tokens land close together. No network, no model.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        let mut v = vec![0.0_f32; self.dimension];
        for token in &tokens {
            self.accumulate(&mut v, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut v, bigram.as_bytes(), 0.5);
        }
        normalize(&v)
    }

    fn accumulate(&self, v: &mut [f32], bytes: &[u8], weight: f32) {
        let h = fnv1a(bytes);
        let slot = (h % self.dimension as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[slot] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ *b as u64).wrapping_mul(PRIME))
}

/// OpenAI-compatible `/v1/embeddings` client.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StoreError::Embedding(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                input: vec![text],
                model: &self.model,
                dimensions: self.dimension,
            })
            .send()
            .await
            .map_err(|e| StoreError::Embedding(format!("embeddings API error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Embedding(format!(
                "embeddings API {status}: {body}"
            )));
        }

        let result: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Embedding(format!("embeddings parse error: {e}")))?;
        let embedding = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| StoreError::Embedding("embeddings API returned no data".to_string()))?;
        if embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the configured embedder.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, StoreError> {
    match config.provider {
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        EmbeddingProviderKind::OpenAi => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                StoreError::Embedding(format!("{} is not set", config.api_key_env))
            })?;
            Ok(Arc::new(OpenAiEmbedder::new(config, api_key)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::cosine_similarity;

    #[tokio::test]
    async fn hashing_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("symbol ACME rsi oversold").await.unwrap();
        let b = embedder.embed("symbol ACME rsi oversold").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hashing_is_unit_length() {
        let v = HashingEmbedder::new(128).embed_sync("a b c d e f");
        let norm: f64 = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_text_is_closer_than_unrelated_text() {
        let embedder = HashingEmbedder::new(256);
        let base = embedder.embed_sync("sector tech rsi oversold pullback moderate priority high");
        let near = embedder.embed_sync("sector tech rsi oversold pullback moderate priority mid");
        let far = embedder.embed_sync("sector energy rsi overbought pullback none priority low");
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashingEmbedder::new(8).embed_sync("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn openai_provider_requires_key() {
        let config = EmbeddingConfig {
            provider: EmbeddingProviderKind::OpenAi,
            api_key_env: "RIDGE_TEST_UNSET_EMBEDDING_KEY".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            build_embedder(&config),
            Err(StoreError::Embedding(_))
        ));
    }
}

//! Text embeddings: an OpenAI-compatible HTTP provider with a deterministic
//! local fallback so retrieval keeps functioning (with collapsed relevance)
//! when the provider is unreachable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Dimension of the local fallback vectors (matches text-embedding-3-small).
pub const LOCAL_EMBEDDING_DIM: usize = 1536;

/// Provider inputs per HTTP call.
const BATCH_SIZE: usize = 100;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client construction is infallible");
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let mut all = Vec::with_capacity(texts.len());

        for batch in texts.chunks(BATCH_SIZE) {
            debug!(count = batch.len(), model = %self.model, "requesting embeddings");
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "model": self.model, "input": batch }))
                .send()
                .await
                .map_err(|e| e.to_string())?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(format!("embeddings API error {status}: {body}"));
            }

            let parsed: EmbeddingsResponse = resp.json().await.map_err(|e| e.to_string())?;
            all.extend(parsed.data.into_iter().map(|item| item.embedding));
        }
        Ok(all)
    }
}

/// Batched embedding front-end. Provider failures fall back to deterministic
/// local vectors with a one-time warning.
pub struct Embedder {
    provider: Option<Box<dyn EmbeddingProvider>>,
    warned_fallback: AtomicBool,
}

impl Embedder {
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: Some(provider),
            warned_fallback: AtomicBool::new(false),
        }
    }

    /// Local-only embedder — used in tests and when no API key is configured.
    pub fn local_only() -> Self {
        Self {
            provider: None,
            warned_fallback: AtomicBool::new(false),
        }
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let cleaned: Vec<String> = texts.iter().map(|t| clean_input(t)).collect();

        if let Some(provider) = &self.provider {
            match provider.embed(&cleaned).await {
                Ok(vectors) if vectors.len() == cleaned.len() => return vectors,
                Ok(vectors) => {
                    warn!(
                        expected = cleaned.len(),
                        got = vectors.len(),
                        "embedding provider returned wrong count, using local fallback"
                    );
                }
                Err(e) => {
                    debug!(error = %e, "embedding provider failed, using local fallback");
                }
            }
        }

        if !self.warned_fallback.swap(true, Ordering::Relaxed) {
            warn!(
                "using LOCAL fallback embeddings — not semantically meaningful; \
                 check OPENAI_API_KEY and provider reachability"
            );
        }
        cleaned.iter().map(|t| local_embedding(t)).collect()
    }

    pub async fn embed_one(&self, text: &str) -> Vec<f32> {
        self.embed_batch(std::slice::from_ref(&text.to_string()))
            .await
            .pop()
            .unwrap_or_else(|| local_embedding("empty"))
    }
}

fn clean_input(text: &str) -> String {
    let cleaned = text.replace('\n', " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "empty".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Deterministic pseudo-embedding from iterated hashing, unit-normalized.
/// Not semantically meaningful — purely a liveness fallback.
pub fn local_embedding(text: &str) -> Vec<f32> {
    let mut values = Vec::with_capacity(LOCAL_EMBEDDING_DIM + 32);
    let mut round: u32 = 0;
    while values.len() < LOCAL_EMBEDDING_DIM {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(round.to_be_bytes());
        for byte in hasher.finalize() {
            values.push((byte as f32 / 255.0) * 2.0 - 1.0);
        }
        round += 1;
    }
    values.truncate(LOCAL_EMBEDDING_DIM);

    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v /= norm;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_embedding_is_deterministic_and_unit_length() {
        let a = local_embedding("hello world");
        let b = local_embedding("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), LOCAL_EMBEDDING_DIM);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn different_texts_differ() {
        assert_ne!(local_embedding("a"), local_embedding("b"));
    }

    #[tokio::test]
    async fn fallback_used_without_provider() {
        let embedder = Embedder::local_only();
        let out = embedder
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], local_embedding("first"));
    }

    #[tokio::test]
    async fn inputs_are_whitespace_normalized() {
        let embedder = Embedder::local_only();
        let a = embedder.embed_one("line\nbreak").await;
        let b = embedder.embed_one("line break").await;
        assert_eq!(a, b);

        // Empty input is coerced rather than rejected.
        let c = embedder.embed_one("   ").await;
        assert_eq!(c, local_embedding("empty"));
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
            Err("connection refused".into())
        }
    }

    #[tokio::test]
    async fn provider_failure_falls_back_locally() {
        let embedder = Embedder::new(Box::new(FailingProvider));
        let out = embedder.embed_batch(&["query".to_string()]).await;
        assert_eq!(out, vec![local_embedding("query")]);
    }
}

//! Embedding backend abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two concrete backends:
//! - **[`OpenAiEmbedder`]** — `POST /v1/embeddings` with batching, retry,
//!   and exponential backoff.
//! - **[`OllamaEmbedder`]** — a local Ollama instance's `/api/embed`
//!   endpoint.
//!
//! Also provides the vector utilities the index relies on:
//! [`vec_to_blob`] / [`blob_to_vec`] for SQLite BLOB storage and
//! [`cosine_similarity`] for retrieval scoring.
//!
//! # Retry strategy
//!
//! Transient failures are retried with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Capability for computing embedding vectors. Injected into the build
/// and ask pipelines so tests can substitute a fake.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded in the index meta for the load-time
    /// compatibility check.
    fn model_name(&self) -> &str;

    /// Vector dimensionality, likewise recorded in the index meta.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbedError> {
    let vectors = embedder.embed(&[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| EmbedError::MalformedResponse("empty embedding response".to_string()))
}

/// Instantiate the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, EmbedError> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        "disabled" => Err(EmbedError::Disabled),
        other => Err(EmbedError::MalformedResponse(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

fn required_model(config: &EmbeddingConfig) -> Result<String, EmbedError> {
    config
        .model
        .clone()
        .ok_or_else(|| EmbedError::MalformedResponse("embedding.model not set".to_string()))
}

fn required_dims(config: &EmbeddingConfig) -> Result<usize, EmbedError> {
    config
        .dims
        .ok_or_else(|| EmbedError::MalformedResponse("embedding.dims not set".to_string()))
}

// ============ OpenAI ============

/// Embedding backend using the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| EmbedError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: required_model(config)?,
            dims: required_dims(config)?,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let vectors = parse_openai_embeddings(&json)?;
                        check_batch(texts.len(), &vectors)?;
                        return Ok(vectors);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(attempt, %status, "embedding request rate limited or failed, retrying");
                        last_err = Some(format!("{status}: {body_text}"));
                        continue;
                    }

                    return Err(EmbedError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "embedding request error, retrying");
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(EmbedError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn parse_openai_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::MalformedResponse("missing data array".to_string()))?;

    let mut vectors = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::MalformedResponse("missing embedding".to_string()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        vectors.push(vec);
    }

    Ok(vectors)
}

// ============ Ollama ============

/// Embedding backend using a local Ollama instance
/// (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: required_model(config)?,
            dims: required_dims(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let vectors = parse_ollama_embeddings(&json)?;
                        check_batch(texts.len(), &vectors)?;
                        return Ok(vectors);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(attempt, %status, "embedding request failed, retrying");
                        last_err = Some(format!("{status}: {body_text}"));
                        continue;
                    }

                    return Err(EmbedError::Api {
                        status: status.as_u16(),
                        body: body_text,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        url = %self.url,
                        "embedding request error (is Ollama running?), retrying"
                    );
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(EmbedError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last: last_err.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn parse_ollama_embeddings(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::MalformedResponse("missing embeddings array".to_string()))?;

    let mut vectors = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| EmbedError::MalformedResponse("embedding is not an array".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        vectors.push(vec);
    }

    Ok(vectors)
}

fn check_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::MalformedResponse(format!(
            "expected {expected} embeddings, got {}",
            vectors.len()
        )));
    }
    Ok(())
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn parses_openai_shape() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2], "index": 0 },
                { "embedding": [0.3, 0.4], "index": 1 }
            ]
        });
        let vectors = parse_openai_embeddings(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn rejects_missing_data() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(parse_openai_embeddings(&json).is_err());
    }

    #[test]
    fn parses_ollama_shape() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.5], [1.0, 0.0]] });
        let vectors = parse_ollama_embeddings(&json).unwrap();
        assert_eq!(vectors.len(), 2);
    }

    #[test]
    fn batch_size_mismatch_is_malformed() {
        let vectors = vec![vec![0.0f32]];
        assert!(check_batch(2, &vectors).is_err());
        assert!(check_batch(1, &vectors).is_ok());
    }

    #[test]
    fn disabled_provider_errors() {
        let config = EmbeddingConfig {
            provider: "disabled".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_embedder(&config), Err(EmbedError::Disabled)));
    }
}

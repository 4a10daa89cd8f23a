//! Remote embedding provider
//!
//! Delegates embedding to a vector-store service that runs the model
//! server-side. The wire contract is a minimal JSON POST: `{ model, input }`
//! against `{base_url}/embed` with a bearer token, answered with
//! `{ embeddings: [[f32]] }`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::{l2_normalize, EmbeddingError, EmbeddingProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Embedding provider backed by a remote vector-store API
pub struct RemoteEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    sub_batch_size: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl RemoteEmbeddingProvider {
    /// Create a provider against `base_url`, authenticating with the token
    /// found in the `api_key_env` environment variable.
    pub fn new(
        base_url: impl Into<String>,
        api_key_env: &str,
        model: impl Into<String>,
        dimension: usize,
        sub_batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var(api_key_env).map_err(|_| {
            EmbeddingError::Initialization(format!("{api_key_env} environment variable not set"))
        })?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EmbeddingError::Initialization(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            dimension,
            sub_batch_size: sub_batch_size.max(1),
        })
    }

    async fn embed_sub_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(
            batch_size = texts.len(),
            model = %self.model,
            "requesting remote embeddings"
        );

        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "remote embedding request failed");
                EmbeddingError::Generation(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "remote embedding service returned an error");
            return Err(EmbeddingError::Generation(format!(
                "service returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Generation(format!("failed to parse response: {e}")))?;

        let mut embeddings = parsed.embeddings;
        for embedding in &mut embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
            l2_normalize(embedding);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let mut embeddings = self.embed_sub_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("Service returned no embeddings".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for sub in texts.chunks(self.sub_batch_size) {
            let embeddings = self.embed_sub_batch(sub).await?;
            if embeddings.len() != sub.len() {
                return Err(EmbeddingError::Generation(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    sub.len(),
                    embeddings.len()
                )));
            }
            all.extend(embeddings);
        }

        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

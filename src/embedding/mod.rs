//! Embedding generation
//!
//! Converts text to fixed-length vectors for similarity search. Two
//! interchangeable providers sit behind one trait: a local
//! sentence-embedding model (fastembed) and a remote vector-store API that
//! embeds server-side. Both guarantee L2-normalized output so cosine
//! similarity is meaningful without caller-side scaling.

mod provider;
mod remote;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use remote::RemoteEmbeddingProvider;

use serde::{Deserialize, Serialize};

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider kind: "local" or "remote"
    pub provider: String,
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Embedding dimension (384 for MiniLM)
    pub dimension: usize,
    /// Upper bound on texts embedded per request, a resource-safety cap
    pub sub_batch_size: usize,
    /// Base URL of the remote embedding service (remote provider only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_base_url: Option<String>,
    /// Environment variable holding the remote service token
    #[serde(default = "default_remote_key_env")]
    pub remote_api_key_env: String,
}

fn default_remote_key_env() -> String {
    "LORE_VECTOR_STORE_KEY".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            sub_batch_size: 5,
            remote_base_url: None,
            remote_api_key_env: default_remote_key_env(),
        }
    }
}

/// Scale a vector to unit length. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let magnitude: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}

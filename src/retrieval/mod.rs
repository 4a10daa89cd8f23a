//! Retrieval
//!
//! Ranks a user's indexed chunks against a query. The primary path embeds
//! the query and scores every chunk by cosine similarity (brute-force linear
//! scan; per-user indices are small). When no embedding provider is
//! available, or the index holds no embeddings, a lexical-overlap fallback
//! keeps search functional. Feedback-derived content-type preferences apply
//! as an advisory re-rank before truncation.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{LoreError, Result};
use crate::index::{ChunkInfo, IndexStore, IndexedChunk};

/// Configuration for retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of results returned
    pub top_k: usize,
    /// Minimum similarity for a result to qualify
    pub min_similarity: f32,
    /// Score multiplier for preferred content types
    pub preferred_boost: f32,
    /// Score multiplier for avoided content types
    pub avoided_penalty: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: 0.3,
            preferred_boost: 1.15,
            avoided_penalty: 0.85,
        }
    }
}

/// Per-query overrides for [`Retriever::search`]
#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_similarity: f32,
}

/// Content-type preferences distilled from user feedback.
///
/// Advisory only: an empty bias is valid and changes nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankingBias {
    pub preferred: HashSet<String>,
    pub avoided: HashSet<String>,
}

impl RankingBias {
    pub fn is_empty(&self) -> bool {
        self.preferred.is_empty() && self.avoided.is_empty()
    }
}

/// One retrieval hit, ephemeral per query
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk_text: String,
    /// Similarity in `[0, 1]`
    pub similarity: f32,
    pub info: ChunkInfo,
}

/// Ranks index entries against queries
pub struct Retriever {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    store: Arc<IndexStore>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        store: Arc<IndexStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Search with the configured defaults.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        bias: Option<&RankingBias>,
    ) -> Result<Vec<RetrievalResult>> {
        let opts = SearchOptions {
            top_k: self.config.top_k,
            min_similarity: self.config.min_similarity,
        };
        self.search_with(user_id, query, opts, bias).await
    }

    /// Search with explicit options.
    ///
    /// Results are ordered by descending similarity, at most `top_k` long,
    /// all at or above `min_similarity`. An empty index yields an empty set,
    /// not an error.
    pub async fn search_with(
        &self,
        user_id: &str,
        query: &str,
        opts: SearchOptions,
        bias: Option<&RankingBias>,
    ) -> Result<Vec<RetrievalResult>> {
        if opts.top_k == 0 {
            return Err(LoreError::InvalidArgument("top_k must be at least 1".to_string()));
        }
        if query.trim().is_empty() {
            return Err(LoreError::InvalidArgument("query is empty".to_string()));
        }

        // Score against a snapshot taken at call start; writes racing this
        // search land in the next one.
        let entries = self.store.entries(user_id).await;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let embeddable = entries.iter().any(|e| e.embedding.is_some());
        let provider = self.provider.as_ref().filter(|p| p.is_available());

        let mut scored = match provider {
            Some(provider) if embeddable => {
                debug!(user_id, "retrieval via embedding similarity");
                let query_embedding = provider.embed(query).await?;
                score_semantic(&entries, &query_embedding)
            }
            _ => {
                debug!(user_id, "retrieval via keyword fallback");
                score_keywords(&entries, query)
            }
        };

        scored.retain(|r| r.similarity >= opts.min_similarity);

        if let Some(bias) = bias.filter(|b| !b.is_empty()) {
            // Multiplicative re-rank only; no candidate is dropped here, so
            // a penalized sole survivor is reordered at worst.
            for result in &mut scored {
                if bias.preferred.contains(&result.info.content_type) {
                    result.similarity = (result.similarity * self.config.preferred_boost).min(1.0);
                } else if bias.avoided.contains(&result.info.content_type) {
                    result.similarity *= self.config.avoided_penalty;
                }
            }
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(opts.top_k);

        Ok(scored)
    }
}

/// Cosine similarity clamped to `[0, 1]`; negative similarity counts as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a <= f32::EPSILON || mag_b <= f32::EPSILON {
        return 0.0;
    }

    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}

fn score_semantic(entries: &[IndexedChunk], query_embedding: &[f32]) -> Vec<RetrievalResult> {
    entries
        .iter()
        .filter_map(|entry| {
            let embedding = entry.embedding.as_ref()?;
            Some(RetrievalResult {
                chunk_text: entry.text.clone(),
                similarity: cosine_similarity(query_embedding, embedding),
                info: entry.info.clone(),
            })
        })
        .collect()
}

/// Lexical overlap: the fraction of query words (longer than 2 characters)
/// found as case-insensitive substrings of the chunk.
fn score_keywords(entries: &[IndexedChunk], query: &str) -> Vec<RetrievalResult> {
    let words: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 2)
        .collect();

    if words.is_empty() {
        return Vec::new();
    }

    entries
        .iter()
        .filter_map(|entry| {
            let haystack = entry.text.to_lowercase();
            let matched = words.iter().filter(|w| haystack.contains(w.as_str())).count();
            if matched == 0 {
                return None;
            }
            Some(RetrievalResult {
                chunk_text: entry.text.clone(),
                similarity: matched as f32 / words.len() as f32,
                info: entry.info.clone(),
            })
        })
        .collect()
}

//! Per-user in-memory index
//!
//! Holds the (chunk text, embedding, metadata) triples produced by indexing.
//! The store is an explicit injected object keyed by user identifier; user
//! indices are created lazily on first write and live for the process
//! lifetime. Persistence across restarts belongs to the caller.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{LoreError, Result};

/// Structured metadata attached to every indexed chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Caller-supplied document identifier (file path or name)
    pub document_id: String,
    /// Free-form content tag ("pdf", "note", "spreadsheet", ...)
    pub content_type: String,
    /// 0-based position of this chunk within its document
    pub chunk_index: usize,
    /// Unrecognized caller metadata, carried through untouched
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One index entry: a chunk with its optional embedding and metadata
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub info: ChunkInfo,
}

#[derive(Default)]
struct UserIndex {
    entries: Vec<IndexedChunk>,
    /// Established embedding dimensionality; set by the first embedded entry
    dimension: Option<usize>,
}

/// Store of per-user indices
#[derive(Default)]
pub struct IndexStore {
    users: RwLock<AHashMap<String, UserIndex>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append prepared entries for a user.
    ///
    /// All embedding work must already be done; this call only mutates the
    /// store. Entries with embeddings whose dimensionality differs from the
    /// index's established dimensionality are rejected before any mutation,
    /// so a failing call leaves the index untouched.
    ///
    /// Indexing the same `document_id` twice duplicates entries; callers
    /// replace a document by removing it first.
    pub async fn add_entries(&self, user_id: &str, entries: Vec<IndexedChunk>) -> Result<usize> {
        if user_id.is_empty() {
            return Err(LoreError::InvalidArgument("user_id is empty".to_string()));
        }

        let mut users = self.users.write().await;
        let index = users.entry(user_id.to_string()).or_default();

        let mut dimension = index.dimension;
        for entry in &entries {
            if let Some(embedding) = &entry.embedding {
                match dimension {
                    Some(expected) if embedding.len() != expected => {
                        return Err(LoreError::DimensionMismatch {
                            expected,
                            actual: embedding.len(),
                        });
                    }
                    Some(_) => {}
                    None => dimension = Some(embedding.len()),
                }
            }
        }

        let added = entries.len();
        index.dimension = dimension;
        index.entries.extend(entries);

        tracing::debug!(user_id, added, total = index.entries.len(), "indexed chunks");
        Ok(added)
    }

    /// Remove every entry belonging to `document_id`. Returns the number of
    /// chunks removed; 0 when nothing matched (not an error).
    pub async fn remove_document(&self, user_id: &str, document_id: &str) -> usize {
        let mut users = self.users.write().await;
        let Some(index) = users.get_mut(user_id) else {
            return 0;
        };

        let before = index.entries.len();
        index.entries.retain(|e| e.info.document_id != document_id);
        let removed = before - index.entries.len();

        if index.entries.is_empty() {
            index.dimension = None;
        }

        tracing::debug!(user_id, document_id, removed, "removed document chunks");
        removed
    }

    /// Distinct document ids for a user, in first-indexed order.
    pub async fn list_documents(&self, user_id: &str) -> Vec<String> {
        let users = self.users.read().await;
        let Some(index) = users.get(user_id) else {
            return Vec::new();
        };

        let mut seen = ahash::AHashSet::new();
        index
            .entries
            .iter()
            .filter(|e| seen.insert(e.info.document_id.clone()))
            .map(|e| e.info.document_id.clone())
            .collect()
    }

    /// Total chunk count for a user.
    pub async fn chunk_count(&self, user_id: &str) -> usize {
        let users = self.users.read().await;
        users.get(user_id).map_or(0, |i| i.entries.len())
    }

    /// Whether any entry for this user carries an embedding.
    pub async fn has_embeddings(&self, user_id: &str) -> bool {
        let users = self.users.read().await;
        users
            .get(user_id)
            .is_some_and(|i| i.entries.iter().any(|e| e.embedding.is_some()))
    }

    /// Clone the user's entries for scoring outside the lock.
    ///
    /// Retrieval observes index state as of this call; no snapshot isolation
    /// beyond that is promised.
    pub async fn entries(&self, user_id: &str) -> Vec<IndexedChunk> {
        let users = self.users.read().await;
        users.get(user_id).map_or_else(Vec::new, |i| i.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(doc: &str, idx: usize, dim: Option<usize>) -> IndexedChunk {
        IndexedChunk {
            text: format!("chunk {idx} of {doc}"),
            embedding: dim.map(|d| vec![0.5; d]),
            info: ChunkInfo {
                document_id: doc.to_string(),
                content_type: "note".to_string(),
                chunk_index: idx,
                extra: HashMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let store = IndexStore::new();
        store
            .add_entries("u1", vec![entry("a.txt", 0, Some(4)), entry("b.txt", 0, Some(4))])
            .await
            .unwrap();

        assert_eq!(store.list_documents("u1").await, vec!["a.txt", "b.txt"]);
        assert_eq!(store.chunk_count("u1").await, 2);
        assert!(store.has_embeddings("u1").await);
    }

    #[tokio::test]
    async fn test_duplicate_indexing_duplicates_entries() {
        let store = IndexStore::new();
        let chunks = vec![entry("a.txt", 0, Some(4)), entry("a.txt", 1, Some(4))];
        store.add_entries("u1", chunks.clone()).await.unwrap();
        store.add_entries("u1", chunks).await.unwrap();

        assert_eq!(store.chunk_count("u1").await, 4);
        assert_eq!(store.list_documents("u1").await, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_removal_is_idempotent() {
        let store = IndexStore::new();
        store
            .add_entries("u1", vec![entry("a.txt", 0, Some(4)), entry("b.txt", 0, Some(4))])
            .await
            .unwrap();

        assert_eq!(store.remove_document("u1", "a.txt").await, 1);
        assert_eq!(store.remove_document("u1", "a.txt").await, 0);
        assert_eq!(store.remove_document("u1", "missing.txt").await, 0);
        assert_eq!(store.chunk_count("u1").await, 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_atomically() {
        let store = IndexStore::new();
        store.add_entries("u1", vec![entry("a.txt", 0, Some(4))]).await.unwrap();

        let bad = vec![entry("c.txt", 0, Some(4)), entry("c.txt", 1, Some(8))];
        let err = store.add_entries("u1", bad).await.unwrap_err();
        assert!(matches!(err, LoreError::DimensionMismatch { expected: 4, actual: 8 }));

        // Nothing from the failing call was applied.
        assert_eq!(store.chunk_count("u1").await, 1);
        assert_eq!(store.list_documents("u1").await, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = IndexStore::new();
        store.add_entries("u1", vec![entry("a.txt", 0, None)]).await.unwrap();

        assert_eq!(store.chunk_count("u2").await, 0);
        assert!(store.list_documents("u2").await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_user_id_rejected() {
        let store = IndexStore::new();
        let err = store.add_entries("", vec![entry("a.txt", 0, None)]).await.unwrap_err();
        assert!(matches!(err, LoreError::InvalidArgument(_)));
    }
}

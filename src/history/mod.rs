//! Conversation history
//!
//! Bounded per-user log of answered questions. Oldest entries are evicted
//! first once the cap is reached.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Maximum records retained per user
pub const HISTORY_CAPACITY: usize = 50;

/// One answered question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    pub source_document_ids: Vec<String>,
    /// 0..=100
    pub confidence: u8,
    pub timestamp: DateTime<Utc>,
}

/// Per-user conversation log store
#[derive(Default)]
pub struct HistoryStore {
    users: RwLock<AHashMap<String, VecDeque<AnswerRecord>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, evicting the oldest entry at capacity.
    pub async fn append(&self, user_id: &str, record: AnswerRecord) {
        let mut users = self.users.write().await;
        let log = users.entry(user_id.to_string()).or_default();

        if log.len() >= HISTORY_CAPACITY {
            log.pop_front();
        }
        log.push_back(record);
    }

    /// All retained records for a user, oldest first.
    pub async fn get(&self, user_id: &str) -> Vec<AnswerRecord> {
        let users = self.users.read().await;
        users
            .get(user_id)
            .map_or_else(Vec::new, |log| log.iter().cloned().collect())
    }

    /// Drop every record for a user.
    pub async fn clear(&self, user_id: &str) {
        let mut users = self.users.write().await;
        users.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(question: &str) -> AnswerRecord {
        AnswerRecord {
            question: question.to_string(),
            answer: "answer".to_string(),
            source_document_ids: vec!["doc.txt".to_string()],
            confidence: 75,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_get() {
        let store = HistoryStore::new();
        store.append("u1", record("first")).await;
        store.append("u1", record("second")).await;

        let log = store.get("u1").await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].question, "first");
        assert_eq!(log[1].question, "second");
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = HistoryStore::new();
        for i in 0..HISTORY_CAPACITY + 5 {
            store.append("u1", record(&format!("q{i}"))).await;
        }

        let log = store.get("u1").await;
        assert_eq!(log.len(), HISTORY_CAPACITY);
        assert_eq!(log[0].question, "q5");
        assert_eq!(log.last().unwrap().question, format!("q{}", HISTORY_CAPACITY + 4));
    }

    #[tokio::test]
    async fn test_clear() {
        let store = HistoryStore::new();
        store.append("u1", record("q")).await;
        store.clear("u1").await;
        assert!(store.get("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_users_isolated() {
        let store = HistoryStore::new();
        store.append("u1", record("q")).await;
        assert!(store.get("u2").await.is_empty());
    }
}

//! Feedback learning
//!
//! Users mark answers (or the documents behind them) relevant or not;
//! batches of those judgments are distilled into LearningInsights that bias
//! future retrieval toward content types that keep proving useful.

mod processor;

pub use processor::FeedbackProcessor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's relevance judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Judgment {
    Relevant,
    NotRelevant,
}

/// One recorded judgment, immutable once written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// The query that produced the judged result
    pub query: String,
    pub document_id: String,
    pub content_type: String,
    pub judgment: Judgment,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(
        query: impl Into<String>,
        document_id: impl Into<String>,
        content_type: impl Into<String>,
        judgment: Judgment,
    ) -> Self {
        Self {
            query: query.into(),
            document_id: document_id.into(),
            content_type: content_type.into(),
            judgment,
            timestamp: Utc::now(),
        }
    }
}

/// Aggregated relevance counts for one content type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypePattern {
    pub content_type: String,
    pub relevant: usize,
    pub not_relevant: usize,
}

impl ContentTypePattern {
    /// Fraction of judgments that were positive
    pub fn ratio(&self) -> f64 {
        let total = self.relevant + self.not_relevant;
        if total == 0 {
            0.0
        } else {
            self.relevant as f64 / total as f64
        }
    }
}

/// What one batch of feedback looked like
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightPatterns {
    /// Per-content-type judgment counts
    pub content_types: Vec<ContentTypePattern>,
    /// Frequent words from relevant-judged queries; observability signal,
    /// not a ranking input
    pub priority_keywords: Vec<String>,
}

/// A derived, append-only learning record consumed read-only by retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningInsight {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub patterns: InsightPatterns,
    /// Content types whose relevance ratio exceeded the preferred threshold
    pub preferred: Vec<String>,
    /// Content types whose relevance ratio fell below the avoided threshold
    pub avoided: Vec<String>,
    /// Optional provider-written one-liner; best-effort
    pub recommendation: Option<String>,
}

/// Configuration for the feedback loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Queue length that triggers immediate batch processing
    pub batch_size: usize,
    /// Interval of the background drain, seconds
    pub interval_secs: u64,
    /// In-memory insight retention
    pub insight_capacity: usize,
    /// How many recent insights feed the ranking bias
    pub bias_window: usize,
    /// Relevance ratio above which a content type is preferred
    pub preferred_ratio: f64,
    /// Relevance ratio below which a content type is avoided
    pub avoided_ratio: f64,
    /// Maximum priority keywords kept per insight
    pub keyword_limit: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            interval_secs: 30,
            insight_capacity: 50,
            bias_window: 5,
            preferred_ratio: 0.7,
            avoided_ratio: 0.3,
            keyword_limit: 5,
        }
    }
}

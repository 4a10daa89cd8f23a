//! Feedback batch processing
//!
//! Judgments are written through to the durable log, queued in memory, and
//! distilled in batches: either when the queue reaches the batch size or on
//! the background interval tick, whichever comes first. Exactly one batch is
//! in flight at a time; a failed batch returns to the front of the queue for
//! the next tick rather than being dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use chrono::Utc;
use regex::Regex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::providers::ProviderChain;
use crate::retrieval::RankingBias;
use crate::storage::FeedbackLog;

use super::{
    ContentTypePattern, FeedbackConfig, FeedbackEvent, InsightPatterns, Judgment, LearningInsight,
};

const RECOMMENDATION_SYSTEM_PROMPT: &str = "You analyze document-retrieval feedback patterns. \
Given relevance statistics, reply with one short sentence recommending how future retrieval \
should be adjusted.";

pub struct FeedbackProcessor {
    log: Arc<dyn FeedbackLog>,
    /// Used for the optional textual recommendation only
    chain: Option<ProviderChain>,
    config: FeedbackConfig,
    queue: Mutex<VecDeque<FeedbackEvent>>,
    insights: RwLock<VecDeque<LearningInsight>>,
    /// Single in-flight batch invariant
    busy: AtomicBool,
    word_re: Regex,
}

impl FeedbackProcessor {
    /// Create a processor, rehydrating recent insights from the durable log
    /// so ranking bias survives restarts.
    pub fn new(
        log: Arc<dyn FeedbackLog>,
        chain: Option<ProviderChain>,
        config: FeedbackConfig,
    ) -> Result<Self> {
        let restored = log.recent_insights(config.insight_capacity)?;
        if !restored.is_empty() {
            debug!(count = restored.len(), "restored learning insights from log");
        }

        Ok(Self {
            log,
            chain,
            config,
            queue: Mutex::new(VecDeque::new()),
            insights: RwLock::new(restored.into()),
            busy: AtomicBool::new(false),
            // Compiled once; words of 4+ alphanumerics count as keywords.
            word_re: Regex::new(r"[A-Za-z0-9]{4,}").expect("static regex"),
        })
    }

    /// Record a judgment: write-through to the durable log, then enqueue.
    /// Reaching the batch size triggers immediate processing; a processing
    /// failure is retried later and does not fail the recording itself.
    pub async fn record(&self, event: FeedbackEvent) -> Result<()> {
        self.log.append_event(&event)?;

        let pending = {
            let mut queue = self.queue.lock().await;
            queue.push_back(event);
            queue.len()
        };

        if pending >= self.config.batch_size {
            if let Err(e) = self.process_pending().await {
                warn!(error = %e, "feedback batch failed, events kept for retry");
            }
        }

        Ok(())
    }

    /// Process at most one batch of queued events.
    ///
    /// Reentrancy-safe: a second caller while a batch is in flight returns
    /// immediately. On failure the drained events are pushed back to the
    /// front of the queue in their original order.
    pub async fn process_pending(&self) -> Result<()> {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!("feedback batch already in flight, skipping");
            return Ok(());
        }

        let result = self.process_one_batch().await;
        self.busy.store(false, Ordering::Release);
        result
    }

    async fn process_one_batch(&self) -> Result<()> {
        let batch: Vec<FeedbackEvent> = {
            let mut queue = self.queue.lock().await;
            let take = queue.len().min(self.config.batch_size);
            queue.drain(..take).collect()
        };

        if batch.is_empty() {
            return Ok(());
        }

        debug!(events = batch.len(), "processing feedback batch");

        match self.derive_insight(&batch).await {
            Ok(insight) => {
                self.store_insight(insight).await?;
                Ok(())
            }
            Err(e) => {
                // Return the batch to the front so nothing is lost.
                let mut queue = self.queue.lock().await;
                for event in batch.into_iter().rev() {
                    queue.push_front(event);
                }
                Err(e)
            }
        }
    }

    async fn derive_insight(&self, batch: &[FeedbackEvent]) -> Result<LearningInsight> {
        let patterns = self.analyze_batch(batch);

        let mut preferred = Vec::new();
        let mut avoided = Vec::new();
        for pattern in &patterns.content_types {
            let ratio = pattern.ratio();
            if ratio > self.config.preferred_ratio {
                preferred.push(pattern.content_type.clone());
            } else if ratio < self.config.avoided_ratio {
                avoided.push(pattern.content_type.clone());
            }
        }

        let recommendation = self.request_recommendation(&patterns).await;

        Ok(LearningInsight {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            patterns,
            preferred,
            avoided,
            recommendation,
        })
    }

    /// Partition a batch by content type and pull frequent words out of
    /// relevant-judged queries.
    fn analyze_batch(&self, batch: &[FeedbackEvent]) -> InsightPatterns {
        let mut by_type: AHashMap<String, (usize, usize)> = AHashMap::new();
        let mut keyword_counts: AHashMap<String, usize> = AHashMap::new();

        for event in batch {
            let counts = by_type.entry(event.content_type.clone()).or_default();
            match event.judgment {
                Judgment::Relevant => {
                    counts.0 += 1;
                    for word in self.word_re.find_iter(&event.query.to_lowercase()) {
                        *keyword_counts.entry(word.as_str().to_string()).or_default() += 1;
                    }
                }
                Judgment::NotRelevant => counts.1 += 1,
            }
        }

        let mut content_types: Vec<ContentTypePattern> = by_type
            .into_iter()
            .map(|(content_type, (relevant, not_relevant))| ContentTypePattern {
                content_type,
                relevant,
                not_relevant,
            })
            .collect();
        content_types.sort_by(|a, b| a.content_type.cmp(&b.content_type));

        let mut keywords: Vec<(String, usize)> = keyword_counts.into_iter().collect();
        keywords.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        keywords.truncate(self.config.keyword_limit);

        InsightPatterns {
            content_types,
            priority_keywords: keywords.into_iter().map(|(w, _)| w).collect(),
        }
    }

    /// Ask the provider chain for a one-line recommendation. Best-effort:
    /// any failure just leaves the field empty.
    async fn request_recommendation(&self, patterns: &InsightPatterns) -> Option<String> {
        let chain = self.chain.as_ref().filter(|c| !c.is_empty())?;

        let summary = patterns
            .content_types
            .iter()
            .map(|p| {
                format!(
                    "{}: {} relevant, {} not relevant",
                    p.content_type, p.relevant, p.not_relevant
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        chain
            .generate(RECOMMENDATION_SYSTEM_PROMPT, &summary)
            .await
            .ok()
    }

    async fn store_insight(&self, insight: LearningInsight) -> Result<()> {
        self.log.append_insight(&insight)?;

        let mut insights = self.insights.write().await;
        if insights.len() >= self.config.insight_capacity {
            insights.pop_front();
        }

        info!(
            preferred = ?insight.preferred,
            avoided = ?insight.avoided,
            "derived learning insight"
        );
        insights.push_back(insight);
        Ok(())
    }

    /// The most recent insights, newest first.
    pub async fn recent_insights(&self, limit: usize) -> Vec<LearningInsight> {
        let insights = self.insights.read().await;
        insights.iter().rev().take(limit).cloned().collect()
    }

    /// Merge the recent insight window into a ranking bias. Newer insights
    /// win when they disagree about a content type. No insights, no bias.
    pub async fn current_bias(&self) -> RankingBias {
        let mut bias = RankingBias::default();

        for insight in self.recent_insights(self.config.bias_window).await {
            for content_type in &insight.preferred {
                if !bias.avoided.contains(content_type) {
                    bias.preferred.insert(content_type.clone());
                }
            }
            for content_type in &insight.avoided {
                if !bias.preferred.contains(content_type) {
                    bias.avoided.insert(content_type.clone());
                }
            }
        }

        bias
    }

    /// Number of events waiting for the next batch.
    pub async fn pending_events(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Spawn the interval drain worker. The handle is aborted on engine
    /// shutdown after a final drain.
    pub fn spawn_interval_worker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let processor = Arc::clone(self);
        let interval = std::time::Duration::from_secs(self.config.interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = processor.process_pending().await {
                    warn!(error = %e, "interval feedback batch failed, will retry");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoreError;
    use std::sync::Mutex as StdMutex;

    /// In-memory log; can be switched into a failing mode.
    #[derive(Default)]
    struct MemoryLog {
        events: StdMutex<Vec<FeedbackEvent>>,
        insights: StdMutex<Vec<LearningInsight>>,
        fail_insights: AtomicBool,
    }

    impl FeedbackLog for MemoryLog {
        fn append_event(&self, event: &FeedbackEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn append_insight(&self, insight: &LearningInsight) -> Result<()> {
            if self.fail_insights.load(Ordering::SeqCst) {
                return Err(LoreError::Config("log unavailable".to_string()));
            }
            self.insights.lock().unwrap().push(insight.clone());
            Ok(())
        }

        fn recent_insights(&self, limit: usize) -> Result<Vec<LearningInsight>> {
            let insights = self.insights.lock().unwrap();
            Ok(insights.iter().rev().take(limit).rev().cloned().collect())
        }
    }

    fn processor_with(log: Arc<MemoryLog>) -> FeedbackProcessor {
        FeedbackProcessor::new(log, None, FeedbackConfig::default()).unwrap()
    }

    fn event(content_type: &str, judgment: Judgment) -> FeedbackEvent {
        FeedbackEvent::new("what was the quarterly revenue", "doc.txt", content_type, judgment)
    }

    #[tokio::test]
    async fn test_batch_triggers_at_size() {
        let log = Arc::new(MemoryLog::default());
        let processor = processor_with(log.clone());

        for _ in 0..4 {
            processor.record(event("report", Judgment::Relevant)).await.unwrap();
        }
        assert_eq!(processor.pending_events().await, 4);
        assert!(processor.recent_insights(10).await.is_empty());

        // Fifth event completes the batch.
        processor.record(event("report", Judgment::Relevant)).await.unwrap();
        assert_eq!(processor.pending_events().await, 0);

        let insights = processor.recent_insights(10).await;
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].preferred, vec!["report"]);
        assert!(insights[0].avoided.is_empty());
        assert_eq!(log.insights.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ratio_thresholds() {
        let log = Arc::new(MemoryLog::default());
        let processor = processor_with(log);

        // 4/5 relevant for notes (0.8 > 0.7); spreadsheets 0/1... but a
        // single batch holds 5 events, so build it explicitly.
        let batch = vec![
            event("note", Judgment::Relevant),
            event("note", Judgment::Relevant),
            event("note", Judgment::Relevant),
            event("note", Judgment::Relevant),
            event("spreadsheet", Judgment::NotRelevant),
        ];
        for e in batch {
            processor.record(e).await.unwrap();
        }

        let insights = processor.recent_insights(1).await;
        assert_eq!(insights[0].preferred, vec!["note"]);
        assert_eq!(insights[0].avoided, vec!["spreadsheet"]);
    }

    #[tokio::test]
    async fn test_middling_ratio_is_neither() {
        let log = Arc::new(MemoryLog::default());
        let processor = processor_with(log);

        for judgment in [
            Judgment::Relevant,
            Judgment::Relevant,
            Judgment::Relevant,
            Judgment::NotRelevant,
            Judgment::NotRelevant,
        ] {
            processor.record(event("note", judgment)).await.unwrap();
        }

        // 3/5 = 0.6 sits between the thresholds.
        let insights = processor.recent_insights(1).await;
        assert!(insights[0].preferred.is_empty());
        assert!(insights[0].avoided.is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_returns_to_queue_front() {
        let log = Arc::new(MemoryLog::default());
        log.fail_insights.store(true, Ordering::SeqCst);
        let processor = processor_with(log.clone());

        for _ in 0..5 {
            // record() itself succeeds; the batch failure is internal.
            processor.record(event("report", Judgment::Relevant)).await.unwrap();
        }

        assert_eq!(processor.pending_events().await, 5);
        assert!(processor.recent_insights(10).await.is_empty());

        // Heal the log; the next drain succeeds with the retained events.
        log.fail_insights.store(false, Ordering::SeqCst);
        processor.process_pending().await.unwrap();
        assert_eq!(processor.pending_events().await, 0);
        assert_eq!(processor.recent_insights(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_priority_keywords_from_relevant_queries() {
        let log = Arc::new(MemoryLog::default());
        let processor = processor_with(log);

        for _ in 0..5 {
            processor
                .record(FeedbackEvent::new(
                    "quarterly revenue breakdown",
                    "budget.txt",
                    "report",
                    Judgment::Relevant,
                ))
                .await
                .unwrap();
        }

        let insights = processor.recent_insights(1).await;
        let keywords = &insights[0].patterns.priority_keywords;
        assert!(keywords.contains(&"revenue".to_string()));
        assert!(keywords.contains(&"quarterly".to_string()));
    }

    #[tokio::test]
    async fn test_current_bias_merges_recent_insights() {
        let log = Arc::new(MemoryLog::default());
        let processor = processor_with(log);

        for _ in 0..5 {
            processor.record(event("report", Judgment::Relevant)).await.unwrap();
        }
        for _ in 0..5 {
            processor.record(event("note", Judgment::NotRelevant)).await.unwrap();
        }

        let bias = processor.current_bias().await;
        assert!(bias.preferred.contains("report"));
        assert!(bias.avoided.contains("note"));
    }

    #[tokio::test]
    async fn test_insight_capacity_evicts_oldest() {
        let log = Arc::new(MemoryLog::default());
        let config = FeedbackConfig {
            batch_size: 1,
            insight_capacity: 3,
            ..FeedbackConfig::default()
        };
        let processor = FeedbackProcessor::new(log, None, config).unwrap();

        for _ in 0..5 {
            processor.record(event("report", Judgment::Relevant)).await.unwrap();
        }

        assert_eq!(processor.recent_insights(10).await.len(), 3);
    }

    #[tokio::test]
    async fn test_insights_rehydrated_from_log() {
        let log = Arc::new(MemoryLog::default());
        {
            let processor = processor_with(log.clone());
            for _ in 0..5 {
                processor.record(event("report", Judgment::Relevant)).await.unwrap();
            }
        }

        // A fresh processor over the same log sees the stored insight.
        let processor = processor_with(log);
        let bias = processor.current_bias().await;
        assert!(bias.preferred.contains("report"));
    }
}

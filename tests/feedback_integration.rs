//! Feedback loop integration tests
//!
//! Drive the learning loop through the public engine surface: judgments in,
//! insights out, ranking bias applied to later questions, all persisted
//! through the SQLite log.

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use lore::config::Config;
use lore::engine::Engine;
use lore::feedback::{FeedbackEvent, Judgment};
use lore::providers::ProviderChain;
use lore::storage::{FeedbackLog, SqliteFeedbackLog};

fn engine_with_log(log: Arc<SqliteFeedbackLog>) -> Engine {
    Engine::with_parts(Config::default(), None, ProviderChain::default(), log).unwrap()
}

fn relevant(content_type: &str) -> FeedbackEvent {
    FeedbackEvent::new("quarterly revenue numbers", "doc", content_type, Judgment::Relevant)
}

fn irrelevant(content_type: &str) -> FeedbackEvent {
    FeedbackEvent::new("quarterly revenue numbers", "doc", content_type, Judgment::NotRelevant)
}

#[tokio::test]
async fn test_batch_of_five_produces_insight_in_one_cycle() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(SqliteFeedbackLog::new(&dir.path().join("feedback.db")).unwrap());
    let engine = engine_with_log(log.clone());

    // Five same-type relevant judgments hit the batch-size trigger.
    for _ in 0..5 {
        engine.record_feedback(relevant("report")).await.unwrap();
    }

    let insights = engine.insights(10).await;
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].preferred, vec!["report"]);
    assert!(insights[0].avoided.is_empty());

    // The insight reached the durable log too.
    assert_eq!(log.recent_insights(10).unwrap().len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_partial_batch_drains_on_flush() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(SqliteFeedbackLog::new(&dir.path().join("feedback.db")).unwrap());
    let engine = engine_with_log(log);

    // Three events stay queued below the batch size...
    for _ in 0..3 {
        engine.record_feedback(relevant("note")).await.unwrap();
    }
    assert!(engine.insights(10).await.is_empty());

    // ...until the interval drain (forced here) picks them up.
    engine.flush_feedback().await.unwrap();

    let insights = engine.insights(10).await;
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].preferred, vec!["note"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_mixed_judgments_split_preferred_and_avoided() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(SqliteFeedbackLog::new(&dir.path().join("feedback.db")).unwrap());
    let engine = engine_with_log(log);

    engine.record_feedback(relevant("spreadsheet")).await.unwrap();
    engine.record_feedback(relevant("spreadsheet")).await.unwrap();
    engine.record_feedback(relevant("spreadsheet")).await.unwrap();
    engine.record_feedback(irrelevant("webpage")).await.unwrap();
    engine.record_feedback(irrelevant("webpage")).await.unwrap();

    let insights = engine.insights(1).await;
    assert_eq!(insights[0].preferred, vec!["spreadsheet"]);
    assert_eq!(insights[0].avoided, vec!["webpage"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_bias_changes_answer_sources() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(SqliteFeedbackLog::new(&dir.path().join("feedback.db")).unwrap());
    let engine = engine_with_log(log);

    // Two documents that tie on keyword overlap for the question; the
    // first-indexed one wins the tie unbiased.
    let question = "maintenance schedule details";
    engine
        .index_document(
            "u1",
            "old.html",
            "webpage",
            "The maintenance schedule has further details inside.",
            HashMap::new(),
        )
        .await
        .unwrap();
    engine
        .index_document(
            "u1",
            "new.csv",
            "spreadsheet",
            "A maintenance schedule with details per machine.",
            HashMap::new(),
        )
        .await
        .unwrap();

    let before = engine.answer_question("u1", question).await.unwrap();
    assert_eq!(before.source_document_ids[0], "old.html");

    // Teach the engine that webpages keep missing and spreadsheets hit.
    engine.record_feedback(relevant("spreadsheet")).await.unwrap();
    engine.record_feedback(relevant("spreadsheet")).await.unwrap();
    engine.record_feedback(relevant("spreadsheet")).await.unwrap();
    engine.record_feedback(irrelevant("webpage")).await.unwrap();
    engine.record_feedback(irrelevant("webpage")).await.unwrap();

    let after = engine.answer_question("u1", question).await.unwrap();
    assert_eq!(after.source_document_ids[0], "new.csv");

    engine.shutdown().await;
}

#[tokio::test]
async fn test_bias_survives_restart_via_durable_log() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("feedback.db");

    {
        let log = Arc::new(SqliteFeedbackLog::new(&db_path).unwrap());
        let engine = engine_with_log(log);
        for _ in 0..5 {
            engine.record_feedback(relevant("report")).await.unwrap();
        }
        engine.shutdown().await;
    }

    // A fresh engine over the same log rehydrates the insight.
    let log = Arc::new(SqliteFeedbackLog::new(&db_path).unwrap());
    let engine = engine_with_log(log);

    let insights = engine.insights(10).await;
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].preferred, vec!["report"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_events_are_never_dropped_before_processing() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(SqliteFeedbackLog::new(&dir.path().join("feedback.db")).unwrap());
    let engine = engine_with_log(log.clone());

    for _ in 0..3 {
        engine.record_feedback(relevant("report")).await.unwrap();
    }

    // Events are in the durable log even while the batch is pending.
    assert_eq!(log.event_count().unwrap(), 3);
    assert_eq!(log.recent_events(10).unwrap().len(), 3);

    engine.shutdown().await;
}

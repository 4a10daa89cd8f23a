//! Durable feedback log
//!
//! The engine core depends only on the [`FeedbackLog`] port; the bundled
//! implementation is SQLite behind a connection pool with WAL enabled and a
//! migration table. The in-memory feedback queue is a write-through cache in
//! front of this log.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use uuid::Uuid;

use crate::error::{LoreError, Result};
use crate::feedback::{FeedbackEvent, InsightPatterns, Judgment, LearningInsight};

/// Abstract append/read interface for feedback persistence.
///
/// Events and insights are append-only; insights are read back on startup so
/// ranking bias survives restarts.
pub trait FeedbackLog: Send + Sync {
    fn append_event(&self, event: &FeedbackEvent) -> Result<()>;
    fn append_insight(&self, insight: &LearningInsight) -> Result<()>;
    /// Up to `limit` most recent insights, oldest first.
    fn recent_insights(&self, limit: usize) -> Result<Vec<LearningInsight>>;
}

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const MIGRATIONS: &[&str] = &[
    // v1: initial schema
    "CREATE TABLE feedback_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query TEXT NOT NULL,
        document_id TEXT NOT NULL,
        content_type TEXT NOT NULL,
        judgment TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE TABLE learning_insights (
        id TEXT PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        patterns TEXT NOT NULL,
        preferred TEXT NOT NULL,
        avoided TEXT NOT NULL,
        recommendation TEXT
    );
    CREATE INDEX idx_events_timestamp ON feedback_events(timestamp);
    CREATE INDEX idx_insights_timestamp ON learning_insights(timestamp);",
];

/// SQLite-backed feedback log
pub struct SqliteFeedbackLog {
    pool: DbPool,
}

impl SqliteFeedbackLog {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LoreError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| LoreError::Config(format!("Failed to create connection pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| LoreError::Config(format!("Failed to get connection: {}", e)))?;

            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let log = Self { pool };
        log.migrate()?;
        Ok(log)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| LoreError::Config(format!("Failed to get connection: {}", e)))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;
            if version > current_version {
                tracing::info!("Applying feedback log migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Total number of recorded events, mainly for status display.
    pub fn event_count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM feedback_events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn judgment_str(judgment: Judgment) -> &'static str {
    match judgment {
        Judgment::Relevant => "relevant",
        Judgment::NotRelevant => "not_relevant",
    }
}

fn parse_judgment(raw: &str) -> Judgment {
    match raw {
        "relevant" => Judgment::Relevant,
        _ => Judgment::NotRelevant,
    }
}

impl FeedbackLog for SqliteFeedbackLog {
    fn append_event(&self, event: &FeedbackEvent) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO feedback_events (query, document_id, content_type, judgment, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &event.query,
                &event.document_id,
                &event.content_type,
                judgment_str(event.judgment),
                event.timestamp.timestamp(),
            ],
        )?;
        Ok(())
    }

    fn append_insight(&self, insight: &LearningInsight) -> Result<()> {
        let patterns = serde_json::to_string(&insight.patterns).map_err(|e| LoreError::Json {
            source: e,
            context: "Failed to serialize insight patterns".to_string(),
        })?;
        let preferred = serde_json::to_string(&insight.preferred).map_err(|e| LoreError::Json {
            source: e,
            context: "Failed to serialize preferred types".to_string(),
        })?;
        let avoided = serde_json::to_string(&insight.avoided).map_err(|e| LoreError::Json {
            source: e,
            context: "Failed to serialize avoided types".to_string(),
        })?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO learning_insights (id, timestamp, patterns, preferred, avoided, recommendation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                insight.id.to_string(),
                insight.timestamp.timestamp(),
                patterns,
                preferred,
                avoided,
                insight.recommendation,
            ],
        )?;
        Ok(())
    }

    fn recent_insights(&self, limit: usize) -> Result<Vec<LearningInsight>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, patterns, preferred, avoided, recommendation
             FROM learning_insights
             ORDER BY timestamp DESC, rowid DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: String = row.get(0)?;
            let timestamp: i64 = row.get(1)?;
            let patterns: String = row.get(2)?;
            let preferred: String = row.get(3)?;
            let avoided: String = row.get(4)?;
            let recommendation: Option<String> = row.get(5)?;
            Ok((id, timestamp, patterns, preferred, avoided, recommendation))
        })?;

        let mut insights = Vec::new();
        for row in rows {
            let (id, timestamp, patterns, preferred, avoided, recommendation) = row?;

            let patterns: InsightPatterns =
                serde_json::from_str(&patterns).map_err(|e| LoreError::Json {
                    source: e,
                    context: "Failed to deserialize insight patterns".to_string(),
                })?;
            let preferred: Vec<String> =
                serde_json::from_str(&preferred).map_err(|e| LoreError::Json {
                    source: e,
                    context: "Failed to deserialize preferred types".to_string(),
                })?;
            let avoided: Vec<String> =
                serde_json::from_str(&avoided).map_err(|e| LoreError::Json {
                    source: e,
                    context: "Failed to deserialize avoided types".to_string(),
                })?;

            insights.push(LearningInsight {
                id: Uuid::parse_str(&id)
                    .map_err(|e| LoreError::Config(format!("Corrupt insight id: {e}")))?,
                timestamp: DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now),
                patterns,
                preferred,
                avoided,
                recommendation,
            });
        }

        // Query returns newest first; callers want oldest first.
        insights.reverse();
        Ok(insights)
    }
}

impl SqliteFeedbackLog {
    /// Up to `limit` most recent events, newest first. Used for status
    /// display; the learning loop reads its own in-memory queue.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<FeedbackEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT query, document_id, content_type, judgment, timestamp
             FROM feedback_events
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let judgment: String = row.get(3)?;
            let timestamp: i64 = row.get(4)?;
            Ok(FeedbackEvent {
                query: row.get(0)?,
                document_id: row.get(1)?,
                content_type: row.get(2)?,
                judgment: parse_judgment(&judgment),
                timestamp: DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(LoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_log(dir: &TempDir) -> SqliteFeedbackLog {
        SqliteFeedbackLog::new(&dir.path().join("feedback.db")).unwrap()
    }

    fn insight(preferred: Vec<&str>) -> LearningInsight {
        LearningInsight {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            patterns: InsightPatterns::default(),
            preferred: preferred.into_iter().map(String::from).collect(),
            avoided: Vec::new(),
            recommendation: Some("prefer reports".to_string()),
        }
    }

    #[test]
    fn test_append_and_count_events() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        let event = FeedbackEvent::new("query", "doc.txt", "report", Judgment::Relevant);
        log.append_event(&event).unwrap();
        log.append_event(&event).unwrap();

        assert_eq!(log.event_count().unwrap(), 2);

        let events = log.recent_events(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].document_id, "doc.txt");
        assert_eq!(events[0].judgment, Judgment::Relevant);
    }

    #[test]
    fn test_insights_roundtrip() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        let stored = insight(vec!["report"]);
        log.append_insight(&stored).unwrap();

        let loaded = log.recent_insights(10).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, stored.id);
        assert_eq!(loaded[0].preferred, vec!["report"]);
        assert_eq!(loaded[0].recommendation.as_deref(), Some("prefer reports"));
    }

    #[test]
    fn test_recent_insights_limit_and_order() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        for name in ["a", "b", "c"] {
            log.append_insight(&insight(vec![name])).unwrap();
        }

        let loaded = log.recent_insights(2).unwrap();
        assert_eq!(loaded.len(), 2);
        // Oldest-first within the most recent two.
        assert_eq!(loaded[0].preferred, vec!["b"]);
        assert_eq!(loaded[1].preferred, vec!["c"]);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        {
            let log = open_log(&dir);
            log.append_insight(&insight(vec!["report"])).unwrap();
        }

        let log = open_log(&dir);
        assert_eq!(log.recent_insights(10).unwrap().len(), 1);
    }

    #[test]
    fn test_judgment_roundtrip() {
        assert_eq!(parse_judgment(judgment_str(Judgment::Relevant)), Judgment::Relevant);
        assert_eq!(
            parse_judgment(judgment_str(Judgment::NotRelevant)),
            Judgment::NotRelevant
        );
    }
}

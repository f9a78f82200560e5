//! libSQL store for the review dataset, pipeline telemetry and model outputs.
//!
//! Implements both pipeline seams ([`ExampleStore`], [`TelemetrySink`]) on
//! a single connection. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{ConversationState, Sentiment, Topic};
use crate::store::migrations;
use crate::store::records::{ImportRow, ModelOutput, PipelineEvent, ReviewCount, ReviewRecord};
use crate::store::traits::{ExampleStore, FewShotExample, TelemetrySink};

/// libSQL-backed store.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    // ── Reviews ─────────────────────────────────────────────────────

    /// Insert or replace a dataset row.
    pub async fn insert_review(&self, review: &ReviewRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO reviews
                    (review_id, topic, sentiment, rating, prompt, ideal_response, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    review.review_id.clone(),
                    review.topic.as_str(),
                    opt_text(review.sentiment.map(|s| s.as_str())),
                    opt_int(review.rating),
                    review.prompt.clone(),
                    review.ideal_response.clone(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_review: {e}")))?;
        Ok(())
    }

    /// Import reviews from a JSON-lines file. Blank lines are skipped; the
    /// first malformed line aborts the import.
    pub async fn import_reviews_jsonl(&self, path: &Path) -> Result<usize, DatabaseError> {
        let text = tokio::fs::read_to_string(path).await?;
        let mut imported = 0;
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: ImportRow = serde_json::from_str(line).map_err(|e| DatabaseError::Import {
                line: i + 1,
                reason: e.to_string(),
            })?;
            let record = row.into_record().map_err(|reason| DatabaseError::Import {
                line: i + 1,
                reason,
            })?;
            self.insert_review(&record).await?;
            imported += 1;
        }
        info!(path = %path.display(), imported, "Reviews imported");
        Ok(imported)
    }

    /// Random sample of up to `limit` reviews for a topic.
    pub async fn sample_reviews(
        &self,
        topic: Topic,
        limit: usize,
    ) -> Result<Vec<ReviewRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT review_id, topic, sentiment, rating, prompt, ideal_response
                 FROM reviews WHERE topic = ?1 ORDER BY RANDOM() LIMIT ?2",
                params![topic.as_str(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("sample_reviews: {e}")))?;

        let mut reviews = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_review(&row) {
                Ok(review) => reviews.push(review),
                Err(e) => warn!("Skipping review row: {e}"),
            }
        }
        Ok(reviews)
    }

    /// Row counts grouped by topic and sentiment.
    pub async fn review_counts(&self) -> Result<Vec<ReviewCount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT topic, sentiment, COUNT(*) FROM reviews
                 GROUP BY topic, sentiment ORDER BY topic, sentiment",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("review_counts: {e}")))?;

        let mut counts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let topic: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("review_counts: {e}")))?;
            let count: i64 = row
                .get(2)
                .map_err(|e| DatabaseError::Query(format!("review_counts: {e}")))?;
            counts.push(ReviewCount {
                topic,
                sentiment: row.get::<String>(1).ok(),
                count,
            });
        }
        Ok(counts)
    }

    // ── Model outputs ───────────────────────────────────────────────

    pub async fn insert_model_output(&self, output: &ModelOutput) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO model_outputs
                    (id, review_id, topic, sentiment, prompt, ideal_response, model_reply, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.clone(),
                    opt_text(output.review_id.as_deref()),
                    output.topic.as_str(),
                    opt_text(output.sentiment.map(|s| s.as_str())),
                    output.prompt.clone(),
                    output.ideal_response.clone(),
                    output.model_reply.clone(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_model_output: {e}")))?;
        debug!(id = %id, "Model output stored");
        Ok(id)
    }

    /// Most recent model outputs, newest first.
    pub async fn latest_model_outputs(
        &self,
        limit: usize,
    ) -> Result<Vec<ModelOutput>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT review_id, topic, sentiment, prompt, ideal_response, model_reply
                 FROM model_outputs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_model_outputs: {e}")))?;

        let mut outputs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_model_output(&row) {
                Ok(output) => outputs.push(output),
                Err(e) => warn!("Skipping model output row: {e}"),
            }
        }
        Ok(outputs)
    }

    // ── Pipeline events ─────────────────────────────────────────────

    pub async fn insert_event(&self, event: &PipelineEvent) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let churn_score = event.payload.get("churn_score").and_then(|v| v.as_f64());
        let frustration = event
            .payload
            .get("frustration")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        self.conn()
            .execute(
                "INSERT INTO pipeline_events
                    (id, session_id, topic, sentiment, frustration, churn_score, churn_label,
                     escalate, negative_streak, final_reply, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    event.id.clone(),
                    opt_text(event.session_id.as_deref()),
                    event.topic.clone(),
                    opt_text(event.sentiment.as_deref()),
                    opt_text(frustration.as_deref()),
                    opt_real(churn_score),
                    opt_text(event.churn_label.as_deref()),
                    i64::from(event.escalate),
                    event.negative_streak,
                    opt_text(event.final_reply.as_deref()),
                    payload,
                    event.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_event: {e}")))?;
        Ok(())
    }

    /// Most recent pipeline events, newest first.
    pub async fn recent_events(&self, limit: usize) -> Result<Vec<PipelineEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, session_id, topic, sentiment, churn_label, escalate,
                        negative_streak, final_reply, payload, created_at
                 FROM pipeline_events ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_events: {e}")))?;

        let mut events = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_event(&row) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping event row: {e}"),
            }
        }
        Ok(events)
    }
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ExampleStore for LibSqlStore {
    async fn examples_for(
        &self,
        topic: Topic,
        sentiment: Option<Sentiment>,
        limit: usize,
    ) -> Result<Vec<FewShotExample>, DatabaseError> {
        let mut rows = match sentiment {
            Some(sentiment) => self
                .conn()
                .query(
                    "SELECT prompt, ideal_response FROM reviews
                     WHERE topic = ?1 AND sentiment = ?2 ORDER BY RANDOM() LIMIT ?3",
                    params![topic.as_str(), sentiment.as_str(), limit as i64],
                )
                .await,
            None => self
                .conn()
                .query(
                    "SELECT prompt, ideal_response FROM reviews
                     WHERE topic = ?1 ORDER BY RANDOM() LIMIT ?2",
                    params![topic.as_str(), limit as i64],
                )
                .await,
        }
        .map_err(|e| DatabaseError::Query(format!("examples_for: {e}")))?;

        let mut examples = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let prompt: Result<String, _> = row.get(0);
            let reply: Result<String, _> = row.get(1);
            match (prompt, reply) {
                (Ok(prompt), Ok(reply)) => examples.push(FewShotExample::new(prompt, reply)),
                _ => warn!("Skipping malformed example row"),
            }
        }
        Ok(examples)
    }
}

#[async_trait]
impl TelemetrySink for LibSqlStore {
    async fn record(&self, state: &ConversationState) -> Result<(), DatabaseError> {
        let event = PipelineEvent::from_state(state)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.insert_event(&event).await?;
        debug!(id = %event.id, "Pipeline event recorded");
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

/// Column order: review_id, topic, sentiment, rating, prompt, ideal_response.
fn row_to_review(row: &libsql::Row) -> Result<ReviewRecord, libsql::Error> {
    let topic: String = row.get(1)?;
    Ok(ReviewRecord {
        review_id: row.get(0)?,
        topic: Topic::from_label(&topic).unwrap_or(Topic::Other),
        sentiment: row
            .get::<String>(2)
            .ok()
            .and_then(|s| Sentiment::from_label(&s)),
        rating: row.get::<i64>(3).ok(),
        prompt: row.get(4)?,
        ideal_response: row.get(5)?,
    })
}

/// Column order: review_id, topic, sentiment, prompt, ideal_response, model_reply.
fn row_to_model_output(row: &libsql::Row) -> Result<ModelOutput, libsql::Error> {
    let topic: String = row.get(1)?;
    Ok(ModelOutput {
        review_id: row.get::<String>(0).ok(),
        topic: Topic::from_label(&topic).unwrap_or(Topic::Other),
        sentiment: row
            .get::<String>(2)
            .ok()
            .and_then(|s| Sentiment::from_label(&s)),
        prompt: row.get(3)?,
        ideal_response: row.get(4)?,
        model_reply: row.get(5)?,
    })
}

/// Column order matches the `recent_events` query.
fn row_to_event(row: &libsql::Row) -> Result<PipelineEvent, libsql::Error> {
    let payload: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    Ok(PipelineEvent {
        id: row.get(0)?,
        session_id: row.get::<String>(1).ok(),
        topic: row.get(2)?,
        sentiment: row.get::<String>(3).ok(),
        churn_label: row.get::<String>(4).ok(),
        escalate: row.get::<i64>(5)? != 0,
        negative_streak: row.get(6)?,
        final_reply: row.get::<String>(7).ok(),
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        created_at: parse_datetime(&created_at),
    })
}

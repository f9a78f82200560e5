//! Rows persisted by the libSQL store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::types::{ChurnLabel, ConversationState, Sentiment, Topic};

/// A dataset row: customer prompt plus the reply we would like to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub review_id: String,
    pub topic: Topic,
    pub sentiment: Option<Sentiment>,
    pub rating: Option<i64>,
    pub prompt: String,
    pub ideal_response: String,
}

impl ReviewRecord {
    pub fn new(
        topic: Topic,
        sentiment: Option<Sentiment>,
        prompt: impl Into<String>,
        ideal_response: impl Into<String>,
    ) -> Self {
        Self {
            review_id: Uuid::new_v4().to_string(),
            topic,
            sentiment,
            rating: None,
            prompt: prompt.into(),
            ideal_response: ideal_response.into(),
        }
    }
}

/// One line of a JSON-lines import file.
///
/// Lenient on purpose: unknown topics map to `other`, unknown sentiments
/// are dropped, and `review_text` stands in for a missing `prompt`.
#[derive(Debug, Deserialize)]
pub(crate) struct ImportRow {
    pub review_id: Option<String>,
    pub topic: Option<String>,
    pub sentiment: Option<String>,
    pub rating: Option<i64>,
    pub prompt: Option<String>,
    pub review_text: Option<String>,
    pub ideal_response: Option<String>,
}

impl ImportRow {
    pub(crate) fn into_record(self) -> Result<ReviewRecord, String> {
        let prompt = self
            .prompt
            .or(self.review_text)
            .filter(|p| !p.trim().is_empty())
            .ok_or("missing prompt/review_text")?;
        let ideal_response = self
            .ideal_response
            .filter(|r| !r.trim().is_empty())
            .ok_or("missing ideal_response")?;
        let topic = match self.topic.as_deref() {
            Some(raw) => Topic::from_label(raw).unwrap_or(Topic::Other),
            None => Topic::Support,
        };

        Ok(ReviewRecord {
            review_id: self
                .review_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            topic,
            sentiment: self.sentiment.as_deref().and_then(Sentiment::from_label),
            rating: self.rating,
            prompt,
            ideal_response,
        })
    }
}

/// Topic / sentiment bucket size in the review dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCount {
    pub topic: String,
    pub sentiment: Option<String>,
    pub count: i64,
}

/// A model reply produced against a dataset row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelOutput {
    pub review_id: Option<String>,
    pub topic: Topic,
    pub sentiment: Option<Sentiment>,
    pub prompt: String,
    pub ideal_response: String,
    pub model_reply: String,
}

impl ModelOutput {
    pub fn for_review(review: &ReviewRecord, model_reply: impl Into<String>) -> Self {
        Self {
            review_id: Some(review.review_id.clone()),
            topic: review.topic,
            sentiment: review.sentiment,
            prompt: review.prompt.clone(),
            ideal_response: review.ideal_response.clone(),
            model_reply: model_reply.into(),
        }
    }
}

/// A stored pipeline run, as written by the telemetry sink.
#[derive(Debug, Clone)]
pub struct PipelineEvent {
    pub id: String,
    pub session_id: Option<String>,
    pub topic: String,
    pub sentiment: Option<String>,
    pub churn_label: Option<String>,
    pub escalate: bool,
    pub negative_streak: i64,
    pub final_reply: Option<String>,
    /// Full serialized state.
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PipelineEvent {
    /// Snapshot a state for storage.
    pub fn from_state(state: &ConversationState) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            session_id: state.session_id.clone(),
            topic: state.resolved_topic().as_str().to_string(),
            sentiment: state.sentiment.map(|s| s.as_str().to_string()),
            churn_label: state.churn_label().map(|l: ChurnLabel| l.as_str().to_string()),
            escalate: state.escalate,
            negative_streak: i64::from(state.negative_streak),
            final_reply: state.final_reply.clone(),
            payload: serde_json::to_value(state)?,
            created_at: state.chat_timestamp.unwrap_or_else(Utc::now),
        })
    }
}

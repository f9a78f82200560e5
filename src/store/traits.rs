//! Storage seams used by the pipeline: the few-shot example store and the
//! telemetry sink.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::pipeline::types::{ConversationState, Sentiment, Topic};

/// A prompt / ideal-reply pair used to steer reply style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub prompt: String,
    pub ideal_response: String,
}

impl FewShotExample {
    pub fn new(prompt: impl Into<String>, ideal_response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ideal_response: ideal_response.into(),
        }
    }
}

/// Read-only source of topic-grounded examples.
#[async_trait]
pub trait ExampleStore: Send + Sync {
    /// Up to `limit` examples for `topic` (optionally narrowed by sentiment),
    /// in no particular order. May be empty.
    async fn examples_for(
        &self,
        topic: Topic,
        sentiment: Option<Sentiment>,
        limit: usize,
    ) -> Result<Vec<FewShotExample>, DatabaseError>;
}

/// Best-effort sink for completed pipeline runs.
///
/// Receives the state by shared reference; failures are logged by the
/// caller and never abort a run.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, state: &ConversationState) -> Result<(), DatabaseError>;
}

// ── In-process implementations ──────────────────────────────────────

/// An example store with nothing in it.
pub struct NoExamples;

#[async_trait]
impl ExampleStore for NoExamples {
    async fn examples_for(
        &self,
        _topic: Topic,
        _sentiment: Option<Sentiment>,
        _limit: usize,
    ) -> Result<Vec<FewShotExample>, DatabaseError> {
        Ok(Vec::new())
    }
}

/// In-memory example store keyed by topic.
#[derive(Default)]
pub struct StaticExamples {
    by_topic: HashMap<Topic, Vec<(Option<Sentiment>, FewShotExample)>>,
}

impl StaticExamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_example(
        mut self,
        topic: Topic,
        sentiment: Option<Sentiment>,
        example: FewShotExample,
    ) -> Self {
        self.by_topic
            .entry(topic)
            .or_default()
            .push((sentiment, example));
        self
    }
}

#[async_trait]
impl ExampleStore for StaticExamples {
    async fn examples_for(
        &self,
        topic: Topic,
        sentiment: Option<Sentiment>,
        limit: usize,
    ) -> Result<Vec<FewShotExample>, DatabaseError> {
        let mut matching: Vec<FewShotExample> = self
            .by_topic
            .get(&topic)
            .into_iter()
            .flatten()
            .filter(|(s, _)| sentiment.is_none() || *s == sentiment)
            .map(|(_, example)| example.clone())
            .collect();
        matching.shuffle(&mut rand::thread_rng());
        matching.truncate(limit);
        Ok(matching)
    }
}

/// Telemetry sink that discards everything.
pub struct NoopTelemetry;

#[async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn record(&self, _state: &ConversationState) -> Result<(), DatabaseError> {
        Ok(())
    }
}

//! Pipeline orchestrator — walks the conversation state through the stage
//! graph.
//!
//! ```text
//! Classify → ScoreRisk → Aggregate ─┬─ Escalate ──┬─ Telemetry → Compose → Done
//!                                   └─ Recommend ─┘
//! ```
//!
//! The router holds no per-run state; one instance can serve concurrent
//! runs as long as each brings its own `ConversationState`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{AppConfig, RouterConfig};
use crate::error::PipelineError;
use crate::llm::provider::LlmProvider;
use crate::llm::{Temperature, create_provider};
use crate::pipeline::types::ConversationState;
use crate::pipeline::{classifier, composer, risk};
use crate::store::{ExampleStore, LibSqlStore, NoExamples, NoopTelemetry, TelemetrySink};

/// A node of the stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Classify,
    ScoreRisk,
    Aggregate,
    Escalate,
    Recommend,
    Telemetry,
    Compose,
    Done,
}

impl Node {
    /// The node after this one. `Aggregate` is the only conditional edge.
    pub fn next(self, state: &ConversationState) -> Node {
        match self {
            Self::Classify => Self::ScoreRisk,
            Self::ScoreRisk => Self::Aggregate,
            Self::Aggregate => {
                if risk::should_escalate(state) {
                    Self::Escalate
                } else {
                    Self::Recommend
                }
            }
            Self::Escalate | Self::Recommend => Self::Telemetry,
            Self::Telemetry => Self::Compose,
            Self::Compose | Self::Done => Self::Done,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::ScoreRisk => "score_risk",
            Self::Aggregate => "aggregate",
            Self::Escalate => "escalate",
            Self::Recommend => "recommend",
            Self::Telemetry => "telemetry",
            Self::Compose => "compose",
            Self::Done => "done",
        }
    }
}

/// Routes customer messages through classification, risk scoring and reply
/// generation.
pub struct CareRouter {
    llm: Arc<dyn LlmProvider>,
    examples: Arc<dyn ExampleStore>,
    telemetry: Arc<dyn TelemetrySink>,
    config: RouterConfig,
}

impl CareRouter {
    /// Create a router with no example store and no-op telemetry.
    pub fn new(llm: Arc<dyn LlmProvider>, config: RouterConfig) -> Self {
        Self {
            llm,
            examples: Arc::new(NoExamples),
            telemetry: Arc::new(NoopTelemetry),
            config,
        }
    }

    /// Build the production router: configured provider, with the libSQL
    /// store at `config.db_path` as both example store and telemetry sink.
    pub async fn open(config: &AppConfig) -> crate::error::Result<(Self, Arc<LibSqlStore>)> {
        let llm = create_provider(&config.llm)?;
        let store = Arc::new(LibSqlStore::new_local(&config.db_path).await?);
        let router = Self::new(llm, config.router.clone())
            .with_examples(store.clone())
            .with_telemetry(store.clone());
        Ok((router, store))
    }

    pub fn with_examples(mut self, examples: Arc<dyn ExampleStore>) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Change the default temperature for later runs of this router.
    pub fn set_temperature(&mut self, temperature: f32) {
        self.config.temperature = Temperature::new(temperature);
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Run the full pipeline and return the populated state.
    ///
    /// On error the state is dropped: a failed run delivers no reply.
    pub async fn run(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, PipelineError> {
        self.run_in_place(&mut state).await?;
        Ok(state)
    }

    /// Run the full pipeline, mutating `state` in place.
    pub async fn run_in_place(
        &self,
        state: &mut ConversationState,
    ) -> Result<(), PipelineError> {
        self.run_from(state, Node::Classify).await
    }

    /// Run everything after classification, for states whose sentiment,
    /// frustration, churn indicator and topic were set by the caller.
    pub async fn run_preclassified(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, PipelineError> {
        self.run_from(&mut state, Node::ScoreRisk).await?;
        Ok(state)
    }

    /// Walk the graph from `start` until `Done`.
    pub async fn run_from(
        &self,
        state: &mut ConversationState,
        start: Node,
    ) -> Result<(), PipelineError> {
        if state.messages.is_empty() {
            return Err(PipelineError::EmptyConversation);
        }

        let temperature = state.meta.temperature.unwrap_or(self.config.temperature);
        info!(
            session = state.session_id.as_deref().unwrap_or("-"),
            messages = state.messages.len(),
            start = start.label(),
            temperature = %temperature,
            "Routing conversation"
        );

        let mut node = start;
        while node != Node::Done {
            debug!(node = node.label(), "Entering node");
            self.execute(node, state, temperature).await?;
            node = node.next(state);
        }

        info!(
            topic = %state.resolved_topic(),
            sentiment = state.sentiment.map_or("unset", |s| s.as_str()),
            churn_label = state.churn_label().map_or("unset", |l| l.as_str()),
            escalate = state.escalate,
            negative_streak = state.negative_streak,
            "Conversation routed"
        );
        Ok(())
    }

    async fn execute(
        &self,
        node: Node,
        state: &mut ConversationState,
        temperature: Temperature,
    ) -> Result<(), PipelineError> {
        match node {
            Node::Classify => {
                classifier::classify(self.llm.as_ref(), state, temperature).await?;
            }
            Node::ScoreRisk => risk::apply_churn_score(state),
            Node::Aggregate => risk::aggregate(state),
            Node::Escalate => risk::decide_escalation(state),
            Node::Recommend => risk::recommend(state),
            Node::Telemetry => {
                if let Err(e) = self.telemetry.record(state).await {
                    warn!(error = %e, "Telemetry write failed, continuing");
                }
            }
            Node::Compose => {
                composer::compose_reply(
                    self.llm.as_ref(),
                    self.examples.as_ref(),
                    self.config.few_shot_count,
                    state,
                    temperature,
                )
                .await?;
            }
            Node::Done => {}
        }
        Ok(())
    }
}

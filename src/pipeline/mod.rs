//! Customer message routing pipeline.
//!
//! Every inbound message flows through:
//! 1. `classifier`: LLM classification (sentiment, frustration, churn, topic)
//! 2. `risk`: churn score, risk label, then escalation *or* recommendation
//! 3. telemetry: best-effort recording of the run
//! 4. `composer`: few-shot grounded reply, never empty
//!
//! `router::CareRouter` wires the stages together.

pub mod classifier;
pub mod composer;
pub mod extract;
pub mod risk;
pub mod router;
pub mod types;

pub use router::{CareRouter, Node};
pub use types::{
    ChurnIndicator, ChurnLabel, ConversationState, CustomerProfile, Frustration, Sentiment,
    StateMeta, Topic,
};

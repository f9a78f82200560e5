//! Shared types for the routing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::Temperature;

// ── Classification enums ────────────────────────────────────────────

/// Customer sentiment as reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Self::Negative, Self::Neutral, Self::Positive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    /// Case-insensitive parse; `None` for anything outside the enumeration.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

/// How frustrated the customer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frustration {
    Low,
    Medium,
    High,
}

impl Frustration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// The classifier's qualitative churn signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChurnIndicator {
    Likely,
    Unlikely,
}

impl ChurnIndicator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Likely => "likely",
            Self::Unlikely => "unlikely",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "likely" => Some(Self::Likely),
            "unlikely" => Some(Self::Unlikely),
            _ => None,
        }
    }
}

/// Normalized conversation topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    Support,
    Billing,
    Delivery,
    Product,
    App,
    Other,
}

impl Topic {
    /// Topics sampled by the evaluation harness.
    pub const EVAL: [Topic; 5] = [
        Self::Support,
        Self::Billing,
        Self::Delivery,
        Self::Product,
        Self::App,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Billing => "billing",
            Self::Delivery => "delivery",
            Self::Product => "product",
            Self::App => "app",
            Self::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "support" => Some(Self::Support),
            "billing" => Some(Self::Billing),
            "delivery" => Some(Self::Delivery),
            "product" => Some(Self::Product),
            "app" => Some(Self::App),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary risk category derived from the classifier and the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChurnLabel {
    #[serde(rename = "High Risk")]
    HighRisk,
    #[serde(rename = "Low/Medium")]
    LowMedium,
}

impl ChurnLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighRisk => "High Risk",
            Self::LowMedium => "Low/Medium",
        }
    }
}

impl std::fmt::Display for ChurnLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Caller-supplied metadata ────────────────────────────────────────

/// Structured customer attributes (tenure, monthly_charges, rating, ...).
///
/// Kept as a free-form JSON map; readers coerce what they need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerProfile(Map<String, Value>);

impl CustomerProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Read `key` as a float. Numbers, numeric strings and booleans are
    /// coerced; anything else (including a missing key) reads as 0.
    pub fn number(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            Some(Value::Bool(b)) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for CustomerProfile {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Per-run metadata supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMeta {
    /// Overrides the router's default temperature for this run only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<Temperature>,
    #[serde(default)]
    pub structured: CustomerProfile,
}

// ── Conversation state ──────────────────────────────────────────────

/// The record threaded through every pipeline stage.
///
/// Created by the caller per inbound message, mutated in place by the
/// stages. `churn_label` has no public setter: only the aggregator writes it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    /// Conversation history, oldest first. The last entry is classified.
    pub messages: Vec<String>,
    pub sentiment: Option<Sentiment>,
    pub frustration: Option<Frustration>,
    pub churn_indicator: Option<ChurnIndicator>,
    pub churn_score: Option<f64>,
    pub(crate) churn_label: Option<ChurnLabel>,
    pub product_recs: Vec<String>,
    pub escalate: bool,
    /// Negative classifications seen so far. Never decremented in-pipeline.
    pub negative_streak: u32,
    pub final_reply: Option<String>,
    pub meta: StateMeta,
    pub session_id: Option<String>,
    pub chat_timestamp: Option<DateTime<Utc>>,
    pub topic: Option<Topic>,
}

impl ConversationState {
    /// Start a conversation with a single customer message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::from_messages(vec![message.into()])
    }

    pub fn from_messages(messages: Vec<String>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_profile(mut self, profile: CustomerProfile) -> Self {
        self.meta.structured = profile;
        self
    }

    pub fn with_temperature(mut self, temperature: impl Into<Temperature>) -> Self {
        self.meta.temperature = Some(temperature.into());
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.chat_timestamp = Some(Utc::now());
        self
    }

    /// The message the pipeline classifies and answers.
    pub fn latest_message(&self) -> Option<&str> {
        self.messages.last().map(String::as_str)
    }

    /// Topic used for grounding; `support` when unset.
    pub fn resolved_topic(&self) -> Topic {
        self.topic.unwrap_or_default()
    }

    pub fn churn_label(&self) -> Option<ChurnLabel> {
        self.churn_label
    }

    /// Carry the conversation into its next turn.
    ///
    /// History, streak, profile and session survive; per-turn results
    /// are cleared so the next run derives them afresh.
    pub fn next_turn(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self.sentiment = None;
        self.frustration = None;
        self.churn_indicator = None;
        self.churn_score = None;
        self.churn_label = None;
        self.product_recs.clear();
        self.escalate = false;
        self.final_reply = None;
        self.topic = None;
        self.chat_timestamp = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_parsing_is_case_insensitive() {
        assert_eq!(Topic::from_label(" Billing "), Some(Topic::Billing));
        assert_eq!(Topic::from_label("APP"), Some(Topic::App));
        assert_eq!(Topic::from_label("refunds"), None);
    }

    #[test]
    fn enum_labels_round_trip() {
        for s in Sentiment::ALL {
            assert_eq!(Sentiment::from_label(s.as_str()), Some(s));
        }
        assert_eq!(Frustration::from_label("HIGH"), Some(Frustration::High));
        assert_eq!(ChurnIndicator::from_label("likely"), Some(ChurnIndicator::Likely));
        assert_eq!(ChurnIndicator::from_label("maybe"), None);
    }

    #[test]
    fn churn_label_serializes_display_names() {
        assert_eq!(
            serde_json::to_value(ChurnLabel::HighRisk).unwrap(),
            "High Risk"
        );
        assert_eq!(ChurnLabel::LowMedium.to_string(), "Low/Medium");
    }

    #[test]
    fn profile_number_coercion() {
        let profile = CustomerProfile::new()
            .with("tenure", 2)
            .with("monthly_charges", "150.5")
            .with("rating", Value::Null)
            .with("vip", true)
            .with("notes", "n/a");
        assert_eq!(profile.number("tenure"), 2.0);
        assert_eq!(profile.number("monthly_charges"), 150.5);
        assert_eq!(profile.number("rating"), 0.0);
        assert_eq!(profile.number("vip"), 1.0);
        assert_eq!(profile.number("notes"), 0.0);
        assert_eq!(profile.number("missing"), 0.0);
    }

    #[test]
    fn resolved_topic_defaults_to_support() {
        let state = ConversationState::new("hi");
        assert_eq!(state.resolved_topic(), Topic::Support);
        let state = state.with_topic(Topic::Delivery);
        assert_eq!(state.resolved_topic(), Topic::Delivery);
    }

    #[test]
    fn next_turn_keeps_streak_and_clears_results() {
        let mut state = ConversationState::new("first")
            .with_profile(CustomerProfile::new().with("tenure", 12))
            .with_session("s-1");
        state.negative_streak = 2;
        state.sentiment = Some(Sentiment::Negative);
        state.churn_label = Some(ChurnLabel::HighRisk);
        state.escalate = true;
        state.final_reply = Some("sorry".into());

        let state = state.next_turn("second");
        assert_eq!(state.messages, vec!["first", "second"]);
        assert_eq!(state.latest_message(), Some("second"));
        assert_eq!(state.negative_streak, 2);
        assert_eq!(state.session_id.as_deref(), Some("s-1"));
        assert_eq!(state.meta.structured.number("tenure"), 12.0);
        assert!(state.sentiment.is_none());
        assert!(state.churn_label().is_none());
        assert!(!state.escalate);
        assert!(state.final_reply.is_none());
    }

    #[test]
    fn state_meta_deserializes_with_defaults() {
        let meta: StateMeta =
            serde_json::from_str(r#"{"structured": {"tenure": 4}, "temperature": 9.0}"#).unwrap();
        assert_eq!(meta.temperature.map(|t| t.value()), Some(1.5));
        assert_eq!(meta.structured.number("tenure"), 4.0);
    }
}

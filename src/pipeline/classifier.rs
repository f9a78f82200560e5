//! Classification stage — sentiment, frustration, churn signal and topic.
//!
//! Reads only the latest message. A partial classification is accepted:
//! missing or unrecognized fields stay unset (topic falls back to
//! `support`). Only an unparseable response aborts the run.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::llm::Temperature;
use crate::pipeline::extract::{JsonObject, extract_json};
use crate::pipeline::types::{ChurnIndicator, ConversationState, Frustration, Sentiment, Topic};

/// Fixed instruction prepended to the customer message.
pub const CLASSIFIER_INSTRUCTION: &str = "You are a strict classification agent. \
     Return ONLY valid JSON, no prose. \
     Schema: {\"sentiment\":\"positive|neutral|negative\",\
     \"frustration_level\":\"low|medium|high\",\
     \"churn_risk\":\"likely|unlikely\",\
     \"topic\":\"support|billing|delivery|product|app|other\"}";

/// Parsed classifier output. Every field is optional except the topic,
/// which always resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub sentiment: Option<Sentiment>,
    pub frustration: Option<Frustration>,
    pub churn_indicator: Option<ChurnIndicator>,
    pub topic: Topic,
}

impl Classification {
    /// Read the four expected fields from a parsed object.
    pub fn from_object(object: &JsonObject) -> Self {
        Self {
            sentiment: field(object, "sentiment", Sentiment::from_label),
            frustration: field(object, "frustration_level", Frustration::from_label),
            churn_indicator: field(object, "churn_risk", ChurnIndicator::from_label),
            topic: field(object, "topic", Topic::from_label).unwrap_or_default(),
        }
    }

    /// Write the classification into the state and bump the negative
    /// streak when the sentiment is negative.
    pub fn apply(&self, state: &mut ConversationState) {
        state.sentiment = self.sentiment;
        state.frustration = self.frustration;
        state.churn_indicator = self.churn_indicator;
        state.topic = Some(self.topic);
        if self.sentiment == Some(Sentiment::Negative) {
            state.negative_streak += 1;
        }
    }
}

fn field<T>(object: &JsonObject, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    match object.get(key) {
        Some(Value::String(raw)) => {
            let parsed = parse(raw);
            if parsed.is_none() {
                warn!(field = key, value = %raw, "Classifier returned unrecognized value");
            }
            parsed
        }
        Some(Value::Null) | None => {
            debug!(field = key, "Classifier omitted field");
            None
        }
        Some(other) => {
            warn!(field = key, value = %other, "Classifier returned non-string value");
            None
        }
    }
}

/// Build the single-prompt classification request text.
pub fn build_classification_prompt(latest: &str) -> String {
    format!("{CLASSIFIER_INSTRUCTION}\nCustomer: {latest}")
}

/// Parse raw classifier text into a `Classification`.
pub fn parse_classification(raw: &str) -> Result<Classification, PipelineError> {
    let object = extract_json(raw)?;
    debug!(parsed = ?object, "Parsed classifier JSON");
    Ok(Classification::from_object(&object))
}

/// Run the classification stage against `state`.
pub async fn classify(
    llm: &dyn LlmProvider,
    state: &mut ConversationState,
    temperature: Temperature,
) -> Result<Classification, PipelineError> {
    let latest = state.latest_message().unwrap_or_default();
    let prompt = build_classification_prompt(latest);
    debug!(prompt = %prompt, "Classification prompt");

    let request = CompletionRequest::prompt(prompt).with_temperature(temperature);
    let response = llm.complete(request).await?;
    debug!(raw = ?response.content, "Raw classifier response");

    let classification = parse_classification(&response.content).map_err(|e| {
        warn!(error = %e, "Failed to parse classifier response");
        e
    })?;
    classification.apply(state);
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, FinishReason};

    struct FixedLlm(&'static str);

    #[async_trait::async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            assert_eq!(request.messages.len(), 1);
            assert!(request.messages[0].content.starts_with(CLASSIFIER_INSTRUCTION));
            Ok(CompletionResponse {
                content: self.0.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[test]
    fn prompt_contains_schema_and_latest_message() {
        let prompt = build_classification_prompt("Where is my parcel?");
        assert!(prompt.contains("frustration_level"));
        assert!(prompt.contains("support|billing|delivery|product|app|other"));
        assert!(prompt.ends_with("\nCustomer: Where is my parcel?"));
    }

    #[test]
    fn full_classification_parses() {
        let c = parse_classification(
            r#"{"sentiment":"negative","frustration_level":"high","churn_risk":"likely","topic":"Billing"}"#,
        )
        .unwrap();
        assert_eq!(c.sentiment, Some(Sentiment::Negative));
        assert_eq!(c.frustration, Some(Frustration::High));
        assert_eq!(c.churn_indicator, Some(ChurnIndicator::Likely));
        assert_eq!(c.topic, Topic::Billing);
    }

    #[test]
    fn missing_fields_stay_unset_and_topic_defaults() {
        let c = parse_classification(r#"{"sentiment": "neutral"}"#).unwrap();
        assert_eq!(c.sentiment, Some(Sentiment::Neutral));
        assert_eq!(c.frustration, None);
        assert_eq!(c.churn_indicator, None);
        assert_eq!(c.topic, Topic::Support);
    }

    #[test]
    fn unrecognized_values_are_dropped() {
        let c = parse_classification(
            r#"{"sentiment": "furious", "topic": "refunds", "churn_risk": 3}"#,
        )
        .unwrap();
        assert_eq!(c.sentiment, None);
        assert_eq!(c.churn_indicator, None);
        assert_eq!(c.topic, Topic::Support);
    }

    #[test]
    fn unparseable_output_is_classification_error() {
        let err = parse_classification("I'd rather not say.").unwrap_err();
        assert!(matches!(err, PipelineError::Classification(_)));
    }

    #[test]
    fn negative_sentiment_bumps_streak_once() {
        let mut state = ConversationState::new("bad");
        let c = Classification {
            sentiment: Some(Sentiment::Negative),
            frustration: None,
            churn_indicator: None,
            topic: Topic::App,
        };
        c.apply(&mut state);
        assert_eq!(state.negative_streak, 1);
        assert_eq!(state.topic, Some(Topic::App));

        let neutral = Classification {
            sentiment: Some(Sentiment::Neutral),
            ..c
        };
        neutral.apply(&mut state);
        assert_eq!(state.negative_streak, 1);
    }

    #[tokio::test]
    async fn classify_updates_state() {
        let llm = FixedLlm(
            "Sure! {'sentiment': 'negative', 'frustration_level': 'medium', 'churn_risk': 'unlikely', 'topic': 'delivery',}",
        );
        let mut state = ConversationState::new("My order is late again");
        let c = classify(&llm, &mut state, Temperature::DEFAULT).await.unwrap();

        assert_eq!(c.topic, Topic::Delivery);
        assert_eq!(state.sentiment, Some(Sentiment::Negative));
        assert_eq!(state.frustration, Some(Frustration::Medium));
        assert_eq!(state.churn_indicator, Some(ChurnIndicator::Unlikely));
        assert_eq!(state.negative_streak, 1);
    }

    #[tokio::test]
    async fn classify_failure_leaves_state_untouched() {
        let llm = FixedLlm("no idea");
        let mut state = ConversationState::new("hello");
        assert!(classify(&llm, &mut state, Temperature::DEFAULT).await.is_err());
        assert!(state.sentiment.is_none());
        assert!(state.topic.is_none());
        assert_eq!(state.negative_streak, 0);
    }
}

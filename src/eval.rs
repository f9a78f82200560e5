//! Offline evaluation over the review dataset, and the sentiment-variant
//! probe used to compare replies for one prompt across moods.

use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::pipeline::types::{ChurnIndicator, ConversationState, Frustration, Sentiment, Topic};
use crate::pipeline::CareRouter;
use crate::store::{LibSqlStore, ModelOutput, ReviewRecord};

/// One evaluated dataset row.
#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub review: ReviewRecord,
    pub model_reply: String,
    pub escalate: bool,
}

/// Run the router over up to `k_per_topic` sampled reviews for each topic.
///
/// Rows whose run fails are logged and skipped. With `save`, each reply is
/// stored as a [`ModelOutput`]; storage failures are logged too.
pub async fn run_eval(
    router: &CareRouter,
    store: &LibSqlStore,
    topics: &[Topic],
    k_per_topic: usize,
    save: bool,
) -> Vec<EvalResult> {
    let mut rows: Vec<ReviewRecord> = Vec::new();
    for &topic in topics {
        match store.sample_reviews(topic, k_per_topic).await {
            Ok(sampled) => {
                if sampled.is_empty() {
                    warn!(topic = %topic, "No reviews for topic");
                }
                rows.extend(sampled);
            }
            Err(e) => error!(topic = %topic, error = %e, "Failed to sample reviews"),
        }
    }
    rows.shuffle(&mut rand::thread_rng());

    let total = rows.len();
    info!(total, k_per_topic, "Evaluating sampled reviews");

    let mut results = Vec::with_capacity(total);
    for review in rows {
        let state = ConversationState::new(review.prompt.clone()).with_topic(review.topic);
        let state = match router.run(state).await {
            Ok(state) => state,
            Err(e) => {
                error!(review_id = %review.review_id, error = %e, "Evaluation run failed");
                continue;
            }
        };
        let model_reply = state.final_reply.clone().unwrap_or_default();

        info!(
            review_id = %review.review_id,
            topic = %review.topic,
            prompt = %review.prompt,
            ideal = %review.ideal_response,
            model = %model_reply,
            "Evaluated review"
        );

        if save {
            let output = ModelOutput::for_review(&review, model_reply.clone());
            if let Err(e) = store.insert_model_output(&output).await {
                warn!(review_id = %review.review_id, error = %e, "Failed to store model output");
            }
        }

        results.push(EvalResult {
            review,
            model_reply,
            escalate: state.escalate,
        });
    }

    info!(evaluated = results.len(), total, "Evaluation complete");
    results
}

/// Pre-classified state for `prompt` as if the classifier had returned
/// `sentiment`.
pub fn variant_state(prompt: &str, sentiment: Sentiment) -> ConversationState {
    let mut state = ConversationState::new(prompt).with_topic(Topic::Support);
    state.sentiment = Some(sentiment);
    state.frustration = Some(match sentiment {
        Sentiment::Negative => Frustration::High,
        Sentiment::Neutral => Frustration::Medium,
        Sentiment::Positive => Frustration::Low,
    });
    state.churn_indicator = Some(if sentiment == Sentiment::Negative {
        ChurnIndicator::Likely
    } else {
        ChurnIndicator::Unlikely
    });
    state.negative_streak = u32::from(sentiment == Sentiment::Negative);
    state
}

/// Answer the same prompt once per sentiment, skipping classification.
pub async fn sentiment_variants(
    router: &CareRouter,
    prompt: &str,
) -> Result<Vec<(Sentiment, ConversationState)>, PipelineError> {
    let mut variants = Vec::with_capacity(Sentiment::ALL.len());
    for sentiment in Sentiment::ALL {
        let state = router
            .run_preclassified(variant_state(prompt, sentiment))
            .await?;
        info!(
            sentiment = sentiment.as_str(),
            escalate = state.escalate,
            reply = state.final_reply.as_deref().unwrap_or_default(),
            "Variant answered"
        );
        variants.push((sentiment, state));
    }
    Ok(variants)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::RouterConfig;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
    use crate::pipeline::types::ChurnLabel;

    /// Classifies every message as neutral billing, replies with a counter.
    /// Every `fail_every`-th classification call fails.
    struct CountingLlm {
        calls: AtomicUsize,
        fail_every: Option<usize>,
    }

    impl CountingLlm {
        fn new(fail_every: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_every,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CountingLlm {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let content = if request.messages.len() == 1 {
                if self.fail_every.is_some_and(|k| n % k == 0) {
                    return Err(LlmError::RequestFailed {
                        provider: "counting".into(),
                        reason: "boom".into(),
                    });
                }
                r#"{"sentiment":"neutral","frustration_level":"low","churn_risk":"unlikely","topic":"billing"}"#
                    .to_string()
            } else {
                format!("reply #{n}")
            };
            Ok(CompletionResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    async fn seeded_store() -> LibSqlStore {
        let store = LibSqlStore::new_memory().await.unwrap();
        for (topic, prompt) in [
            (Topic::Billing, "Charged twice"),
            (Topic::Billing, "Refund missing"),
            (Topic::Delivery, "Parcel late"),
        ] {
            store
                .insert_review(&ReviewRecord::new(
                    topic,
                    Some(Sentiment::Negative),
                    prompt,
                    "We are sorry.",
                ))
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn variant_states_are_preseeded() {
        let negative = variant_state("hi", Sentiment::Negative);
        assert_eq!(negative.frustration, Some(Frustration::High));
        assert_eq!(negative.churn_indicator, Some(ChurnIndicator::Likely));
        assert_eq!(negative.negative_streak, 1);
        assert_eq!(negative.topic, Some(Topic::Support));

        let positive = variant_state("hi", Sentiment::Positive);
        assert_eq!(positive.frustration, Some(Frustration::Low));
        assert_eq!(positive.churn_indicator, Some(ChurnIndicator::Unlikely));
        assert_eq!(positive.negative_streak, 0);
    }

    #[tokio::test]
    async fn eval_samples_and_saves() {
        let store = seeded_store().await;
        let router = CareRouter::new(Arc::new(CountingLlm::new(None)), RouterConfig::default());

        let results = run_eval(&router, &store, &Topic::EVAL, 1, true).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.model_reply.starts_with("reply #")));

        let saved = store.latest_model_outputs(10).await.unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test]
    async fn eval_skips_failed_runs() {
        let store = seeded_store().await;
        // Calls alternate classify/compose; the second classify (call 3) fails.
        let router = CareRouter::new(Arc::new(CountingLlm::new(Some(3))), RouterConfig::default());

        let results = run_eval(&router, &store, &[Topic::Billing, Topic::Delivery], 5, false).await;
        assert_eq!(results.len(), 2);
        assert!(store.latest_model_outputs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn variants_cover_each_sentiment() {
        let llm = Arc::new(CountingLlm::new(None));
        let router = CareRouter::new(llm.clone(), RouterConfig::default());

        let variants = sentiment_variants(&router, "My order is late").await.unwrap();
        assert_eq!(
            variants.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            Sentiment::ALL.to_vec()
        );
        // No classification calls: one compose call per variant.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);

        let (_, negative) = &variants[0];
        assert_eq!(negative.churn_label(), Some(ChurnLabel::HighRisk));
        assert!(negative.escalate);
        let (_, positive) = &variants[2];
        assert!(!positive.escalate);
        assert_eq!(positive.product_recs.len(), 3);
    }
}

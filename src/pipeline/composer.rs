//! Response composer — few-shot grounded reply generation.
//!
//! The reply is never empty: a blank model response becomes
//! [`FALLBACK_REPLY`].

use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::llm::Temperature;
use crate::pipeline::types::ConversationState;
use crate::store::{ExampleStore, FewShotExample};

/// Reply used when the model returns blank text.
pub const FALLBACK_REPLY: &str = "Thanks for contacting us!";

/// System instruction constraining reply style.
pub const COMPOSER_SYSTEM_PROMPT: &str = "You are a concise, empathetic customer support agent. \
     Reply in 60-120 words. If the customer is upset, acknowledge, apologise briefly, \
     and give ONE concrete next step. Avoid bullets unless asked.";

const ESCALATION_HINT: &str =
    "Escalate to a senior specialist and set expectation for response time.";

/// Used when the example store has nothing for the topic.
const GENERIC_EXAMPLE: (&str, &str) = (
    "My delivery was late.",
    "I'm sorry for the delay, that's not the experience we want. I've checked your order \
     and prioritised a replacement. You'll get an update within 24 hours.",
);

/// Render examples as a few-shot block; one generic example when empty.
pub fn format_examples(examples: &[FewShotExample]) -> String {
    if examples.is_empty() {
        let (prompt, reply) = GENERIC_EXAMPLE;
        return format!("Example:\nUser: {prompt}\nAgent: {reply}");
    }
    examples
        .iter()
        .map(|e| format!("Example:\nUser: {}\nAgent: {}", e.prompt, e.ideal_response))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Routing guidance for the model.
pub fn route_hint(state: &ConversationState) -> String {
    if state.escalate {
        ESCALATION_HINT.to_string()
    } else {
        format!(
            "Optionally offer a helpful suggestion or relevant product: {}",
            state.product_recs.join(", ")
        )
    }
}

/// Build the user block: examples, context, customer message.
pub fn build_reply_prompt(state: &ConversationState, examples: &[FewShotExample]) -> String {
    let sentiment = state.sentiment.map_or("unknown", |s| s.as_str());
    let frustration = state.frustration.map_or("unknown", |f| f.as_str());
    let churn_label = state.churn_label().map_or("unknown", |l| l.as_str());
    let latest = state.latest_message().unwrap_or_default();

    format!(
        "{fewshot}\n\n\
         Context:\n\
         - sentiment: {sentiment}, frustration: {frustration}, churn_label: {churn_label}\n\
         - guidance: {hint}\n\n\
         Customer said: {latest}\n\
         Write ONLY the reply.",
        fewshot = format_examples(examples),
        hint = route_hint(state),
    )
}

/// Trimmed reply, or the fallback when blank.
pub fn finalize_reply(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fetch grounding examples and generate the final reply into `state`.
pub async fn compose_reply(
    llm: &dyn LlmProvider,
    examples: &dyn ExampleStore,
    few_shot_count: usize,
    state: &mut ConversationState,
    temperature: Temperature,
) -> Result<(), PipelineError> {
    let topic = state.resolved_topic();
    let fewshot = match examples.examples_for(topic, None, few_shot_count).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(topic = %topic, error = %e, "Example store failed, using generic example");
            Vec::new()
        }
    };
    info!(topic = %topic, count = fewshot.len(), "Few-shot examples loaded");
    for (i, e) in fewshot.iter().enumerate() {
        debug!(
            n = i + 1,
            prompt = %e.prompt,
            ideal_response = %e.ideal_response,
            "Few-shot example"
        );
    }

    let request = CompletionRequest::new(vec![
        ChatMessage::system(COMPOSER_SYSTEM_PROMPT),
        ChatMessage::user(build_reply_prompt(state, &fewshot)),
    ])
    .with_temperature(temperature);

    let response = llm.complete(request).await?;
    if response.content.trim().is_empty() {
        warn!("Model returned an empty reply, using fallback");
    }
    state.final_reply = Some(finalize_reply(&response.content));
    Ok(())
}

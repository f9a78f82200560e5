//! OpenAI-compatible Chat Completions client (Groq, OpenAI).
//!
//! Non-streaming: one POST to `{base_url}/chat/completions` per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

/// HTTP request timeout for a single completion.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat Completions provider speaking the OpenAI wire format.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    provider: String,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let provider = provider.into();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: provider.clone(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature.map(f32::from),
            max_tokens: request.max_tokens,
        }
    }

    fn error_for_status(
        &self,
        status: StatusCode,
        retry_after: Option<Duration>,
        body: String,
    ) -> LlmError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                provider: self.provider.clone(),
                retry_after,
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
                provider: self.provider.clone(),
            },
            _ => LlmError::RequestFailed {
                provider: self.provider.clone(),
                reason: format!("HTTP {status}: {body}"),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request(&request);
        debug!(
            provider = %self.provider,
            model = %self.model,
            messages = request.messages.len(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(self.error_for_status(status, retry_after, text));
        }

        let text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: self.provider.clone(),
            reason: format!("Failed to read response body: {e}"),
        })?;
        parse_chat_response(&self.provider, &text)
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn parse_chat_response(provider: &str, body: &str) -> Result<CompletionResponse, LlmError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "response contained no choices".into(),
        })?;
    let usage = parsed.usage.unwrap_or(ChatUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });

    Ok(CompletionResponse {
        // A null content is treated as an empty reply.
        content: choice.message.content.unwrap_or_default(),
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
        response_id: parsed.id,
    })
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

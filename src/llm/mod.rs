//! LLM integration for the care router.
//!
//! Supports any backend that speaks the OpenAI Chat Completions format:
//! - **Groq**: default, hosted Llama models
//! - **OpenAI**: direct API access

pub mod openai_compat;
pub mod provider;
mod sampling;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;
pub use sampling::Temperature;

use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable holding this backend's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Groq => "llama-3.1-8b-instant",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "CARE_ROUTER_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected groq or openai)"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Overrides the backend's default base URL.
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.backend.default_base_url().to_string());
    let provider = OpenAiCompatProvider::new(
        config.backend.label(),
        base_url,
        config.api_key.clone(),
        &config.model,
    )?;
    tracing::info!(
        backend = config.backend.label(),
        model = %config.model,
        "LLM provider ready"
    );
    Ok(Arc::new(provider))
}

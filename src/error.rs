//! Error types for the care router.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Import failed at line {line}: {reason}")]
    Import { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The model returned text with no recoverable JSON object.
///
/// `snippet` holds at most [`ParseError::SNIPPET_CHARS`] characters of the
/// original text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Could not parse JSON from LLM output:\n{snippet}")]
pub struct ParseError {
    pub snippet: String,
}

impl ParseError {
    pub const SNIPPET_CHARS: usize = 600;

    pub fn from_text(text: &str) -> Self {
        Self {
            snippet: text.chars().take(Self::SNIPPET_CHARS).collect(),
        }
    }
}

/// Pipeline-related errors. All of these abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Conversation has no messages")]
    EmptyConversation,

    #[error("Classification failed: {0}")]
    Classification(#[from] ParseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_truncates_snippet() {
        let text = "x".repeat(2000);
        let err = ParseError::from_text(&text);
        assert_eq!(err.snippet.chars().count(), 600);
    }

    #[test]
    fn parse_error_snippet_respects_char_boundaries() {
        let text = "é".repeat(700);
        let err = ParseError::from_text(&text);
        assert_eq!(err.snippet.chars().count(), 600);
        assert!(err.snippet.chars().all(|c| c == 'é'));
    }

    #[test]
    fn pipeline_error_wraps_parse_error() {
        let err: PipelineError = ParseError::from_text("no json here").into();
        assert!(err.to_string().starts_with("Classification failed"));
        assert!(err.to_string().contains("no json here"));
    }

    #[test]
    fn top_level_error_from_llm() {
        let err: Error = LlmError::AuthFailed {
            provider: "groq".into(),
        }
        .into();
        assert!(matches!(err, Error::Llm(_)));
    }
}

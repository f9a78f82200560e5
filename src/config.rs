//! Configuration types.
//!
//! Everything is read from environment variables; see [`AppConfig::from_env`].

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig, Temperature};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Default sampling temperature; a state's `meta.temperature` overrides it.
    pub temperature: Temperature,
    /// Maximum few-shot examples fetched per reply.
    pub few_shot_count: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            temperature: Temperature::DEFAULT,
            few_shot_count: 3,
        }
    }
}

/// Full application configuration for the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub router: RouterConfig,
    /// libSQL database file holding reviews, events and model outputs.
    pub db_path: PathBuf,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `CARE_ROUTER_BACKEND` | `groq` |
    /// | `GROQ_API_KEY` / `OPENAI_API_KEY` | required, per backend |
    /// | `CARE_ROUTER_MODEL` | backend default |
    /// | `CARE_ROUTER_BASE_URL` | backend default |
    /// | `CARE_ROUTER_TEMPERATURE` | `0.7` |
    /// | `CARE_ROUTER_FEW_SHOT` | `3` |
    /// | `CARE_ROUTER_DB_PATH` | `./data/care-router.db` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend: LlmBackend = match var("CARE_ROUTER_BACKEND") {
            Some(raw) => raw.parse()?,
            None => LlmBackend::Groq,
        };

        let key_var = backend.api_key_var();
        let api_key = var(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let model = var("CARE_ROUTER_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let temperature = match var("CARE_ROUTER_TEMPERATURE") {
            Some(raw) => {
                let value: f32 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: "CARE_ROUTER_TEMPERATURE".into(),
                    message: format!("{e}"),
                })?;
                Temperature::new(value)
            }
            None => Temperature::DEFAULT,
        };

        let few_shot_count = match var("CARE_ROUTER_FEW_SHOT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "CARE_ROUTER_FEW_SHOT".into(),
                message: format!("{e}"),
            })?,
            None => RouterConfig::default().few_shot_count,
        };

        let db_path = db_path_from_lookup(&lookup);

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
                base_url: var("CARE_ROUTER_BASE_URL"),
            },
            router: RouterConfig {
                temperature,
                few_shot_count,
            },
            db_path,
        })
    }
}

/// Default location of the libSQL database file.
pub const DEFAULT_DB_PATH: &str = "./data/care-router.db";

/// Database path from `CARE_ROUTER_DB_PATH`; blank means the default.
pub fn db_path_from_env() -> PathBuf {
    db_path_from_lookup(|key| std::env::var(key).ok())
}

fn db_path_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("CARE_ROUTER_DB_PATH")
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

//! LLM integration for inbox-digest.
//!
//! One backend: any OpenAI-compatible Chat Completions endpoint, reached
//! through reqwest. Groq is the default base URL.

pub mod openai_compat;
pub mod provider;

pub use openai_compat::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DEFAULT_ADAPTER_TIMEOUT_SECS, EnvLookup, env_or, env_parse, env_value};
use crate::error::{ConfigError, LlmError};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl LlmConfig {
    /// `DIGEST_LLM_API_KEY` wins; `GROQ_API_KEY` is accepted as a fallback.
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let api_key = env_value(env, "DIGEST_LLM_API_KEY")
            .or_else(|| env_value(env, "GROQ_API_KEY"))
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "DIGEST_LLM_API_KEY".to_string(),
                hint: "Set DIGEST_LLM_API_KEY (or GROQ_API_KEY) for the summarizer".to_string(),
            })?;
        let timeout: u64 =
            env_parse(env, "DIGEST_ADAPTER_TIMEOUT_SECS", DEFAULT_ADAPTER_TIMEOUT_SECS)?;

        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            base_url: env_or(env, "DIGEST_LLM_BASE_URL", DEFAULT_BASE_URL),
            model: env_or(env, "DIGEST_LLM_MODEL", DEFAULT_MODEL),
            request_timeout: Duration::from_secs(timeout),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatProvider::new(config.clone())?;
    tracing::info!("Using {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(provider))
}

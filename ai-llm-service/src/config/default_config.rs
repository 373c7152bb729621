//! Default LLM configs loaded from environment variables.
//!
//! One constructor per role:
//!
//! - **Local chat**   → Ollama model used for answers (`DEFAULT_MODEL`)
//! - **Cloud chat**   → Gemini `generateContent` (rate limited, retried)
//! - **OpenAI chat**  → OpenAI-compatible chat completions
//! - **Embedding**    → Ollama or OpenAI embedding model (`EMBEDDING_PROVIDER`)
//!
//! # Environment variables
//!
//! - `OLLAMA_HOST` (or legacy `OLLAMA_URL`) = Ollama base URL, default `http://localhost:11434`
//! - `DEFAULT_MODEL`    = local chat model, default `llama3`
//! - `LLM_MAX_TOKENS`   = optional generation cap (u32)
//! - `GEMINI_API_KEY`, `GEMINI_MODEL` (`gemini-pro`), `GEMINI_API_BASE`
//! - `OPENAI_API_KEY`, `OPENAI_BASE_URL` (`https://api.openai.com`), `OPENAI_MODEL` (`gpt-4o`)
//! - `EMBEDDING_PROVIDER` (`ollama`), `EMBEDDING_MODEL`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, env_opt, env_opt_u32, env_or, validate_http_endpoint},
};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_LOCAL_MODEL: &str = "llama3";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "all-minilm";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// Per-attempt timeout for cloud generation calls.
pub const CLOUD_TIMEOUT_SECS: u64 = 30;

/// Resolves the Ollama endpoint.
///
/// Precedence: `OLLAMA_HOST`, then `OLLAMA_URL`, then the local default.
///
/// # Errors
/// [`ConfigError::InvalidFormat`] when the value is not an http(s) URL.
pub fn ollama_endpoint() -> Result<String, AiLlmError> {
    let url = env_opt("OLLAMA_HOST")
        .or_else(|| env_opt("OLLAMA_URL"))
        .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
    validate_http_endpoint("OLLAMA_HOST", &url)?;
    Ok(url)
}

/// Name of the fallback local model (`DEFAULT_MODEL`).
pub fn default_local_model() -> String {
    env_or("DEFAULT_MODEL", DEFAULT_LOCAL_MODEL)
}

/// Local chat model on Ollama.
///
/// # Defaults
/// - `temperature = 0.7`, `top_p = 0.9`
/// - `timeout_secs = 600` (local models can be slow on CPU)
pub fn config_ollama_chat() -> Result<LlmModelConfig, AiLlmError> {
    Ok(LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: default_local_model(),
        endpoint: ollama_endpoint()?,
        api_key: None,
        max_tokens: env_opt_u32("LLM_MAX_TOKENS")?,
        temperature: Some(0.7),
        top_p: Some(0.9),
        timeout_secs: Some(600),
    })
}

/// Gemini cloud chat.
///
/// The API key is optional here: requests may bring their own key.
///
/// # Defaults
/// - `temperature = 0.7`, `top_p = 0.95`, `max_tokens = 2048`
/// - `timeout_secs = 30` (per attempt)
pub fn config_gemini() -> Result<LlmModelConfig, AiLlmError> {
    let endpoint = env_or("GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE);
    validate_http_endpoint("GEMINI_API_BASE", &endpoint)?;

    Ok(LlmModelConfig {
        provider: LlmProvider::Gemini,
        model: env_or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
        endpoint,
        api_key: env_opt("GEMINI_API_KEY"),
        max_tokens: Some(env_opt_u32("LLM_MAX_TOKENS")?.unwrap_or(2048)),
        temperature: Some(0.7),
        top_p: Some(0.95),
        timeout_secs: Some(CLOUD_TIMEOUT_SECS),
    })
}

/// OpenAI-compatible chat completions.
///
/// # Defaults
/// - `temperature = 0.3`, `max_tokens = 8000`
pub fn config_openai_chat() -> Result<LlmModelConfig, AiLlmError> {
    let endpoint = env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL);
    validate_http_endpoint("OPENAI_BASE_URL", &endpoint)?;

    Ok(LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
        endpoint,
        api_key: env_opt("OPENAI_API_KEY"),
        max_tokens: Some(8000),
        temperature: Some(0.3),
        top_p: None,
        timeout_secs: Some(120),
    })
}

/// Embedding model, chosen by `EMBEDDING_PROVIDER`.
///
/// # Errors
/// - [`ConfigError::UnsupportedProvider`] for providers without embeddings
/// - [`ConfigError::MissingVar`] when OpenAI is selected without `OPENAI_API_KEY`
pub fn config_embedding() -> Result<LlmModelConfig, AiLlmError> {
    let provider: LlmProvider = env_or("EMBEDDING_PROVIDER", "ollama").parse()?;
    match provider {
        LlmProvider::Ollama => Ok(LlmModelConfig {
            provider,
            model: env_or("EMBEDDING_MODEL", DEFAULT_OLLAMA_EMBEDDING_MODEL),
            endpoint: ollama_endpoint()?,
            api_key: None,
            max_tokens: None,
            temperature: Some(0.0),
            top_p: None,
            timeout_secs: Some(120),
        }),
        LlmProvider::OpenAI => {
            let endpoint = env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL);
            validate_http_endpoint("OPENAI_BASE_URL", &endpoint)?;
            let api_key = env_opt("OPENAI_API_KEY").ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;
            Ok(LlmModelConfig {
                provider,
                model: env_or("EMBEDDING_MODEL", DEFAULT_OPENAI_EMBEDDING_MODEL),
                endpoint,
                api_key: Some(api_key),
                max_tokens: None,
                temperature: None,
                top_p: None,
                timeout_secs: Some(120),
            })
        }
        LlmProvider::Gemini => Err(ConfigError::UnsupportedProvider(
            "gemini (embeddings are served by ollama or openai)".into(),
        )
        .into()),
    }
}

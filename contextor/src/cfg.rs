//! Runtime configuration loaded from environment variables.

use std::str::FromStr;

use ai_llm_service::LlmProvider;
use rag_store::{DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP_K, MAX_CONTEXT_DOCS};

use crate::error::ContextorError;
use crate::prompt::MAX_OUTPUT_TOKENS;

pub const DEFAULT_LANGUAGE: &str = "Deutsch";
pub const DEFAULT_COLLECTION: &str = "rag_docs";
/// Output cap for chat replies when the request sets none.
pub const DEFAULT_CHAT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Answering knobs. All fields have defaults via [`ContextorConfig::from_env`].
#[derive(Clone, Debug, PartialEq)]
pub struct ContextorConfig {
    /// Collection used by `ask` when the request names none.
    pub default_collection: String,
    pub default_backend: LlmProvider,
    pub top_k: usize,
    pub score_threshold: f32,
    /// Cap on documents taken from combined retrieval for chat.
    pub max_context_docs: usize,
    /// Language the answer must be written in.
    pub language: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub chat_max_tokens: u32,
}

impl Default for ContextorConfig {
    fn default() -> Self {
        Self {
            default_collection: DEFAULT_COLLECTION.to_string(),
            default_backend: LlmProvider::Ollama,
            top_k: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_context_docs: MAX_CONTEXT_DOCS,
            language: DEFAULT_LANGUAGE.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
            chat_max_tokens: DEFAULT_CHAT_MAX_TOKENS,
        }
    }
}

impl ContextorConfig {
    /// Reads `DEFAULT_COLLECTION`, `DEFAULT_BACKEND`, `RAG_TOP_K`,
    /// `RAG_SCORE_THRESHOLD`, `MAX_CONTEXT_DOCS`, `ANSWER_LANGUAGE`,
    /// `LLM_TEMPERATURE` and `LLM_MAX_TOKENS`.
    pub fn from_env() -> Result<Self, ContextorError> {
        let d = Self::default();
        let cfg = Self {
            default_collection: env("DEFAULT_COLLECTION", &d.default_collection),
            default_backend: parse("DEFAULT_BACKEND", d.default_backend)?,
            top_k: parse("RAG_TOP_K", d.top_k)?,
            score_threshold: parse("RAG_SCORE_THRESHOLD", d.score_threshold)?,
            max_context_docs: parse("MAX_CONTEXT_DOCS", d.max_context_docs)?,
            language: env("ANSWER_LANGUAGE", &d.language),
            temperature: parse("LLM_TEMPERATURE", d.temperature)?,
            max_output_tokens: parse("LLM_MAX_TOKENS", d.max_output_tokens)?,
            chat_max_tokens: d.chat_max_tokens,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ContextorError> {
        if self.top_k == 0 {
            return Err(ContextorError::Config("RAG_TOP_K must be > 0".into()));
        }
        if self.max_context_docs == 0 {
            return Err(ContextorError::Config("MAX_CONTEXT_DOCS must be > 0".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ContextorError::Config(format!(
                "LLM_TEMPERATURE must be within 0..=2, got {}",
                self.temperature
            )));
        }
        if self.language.trim().is_empty() {
            return Err(ContextorError::Config("ANSWER_LANGUAGE must not be empty".into()));
        }
        Ok(())
    }
}

fn env(k: &str, dflt: &str) -> String {
    std::env::var(k)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| dflt.to_string())
}

fn parse<T: FromStr>(k: &str, dflt: T) -> Result<T, ContextorError> {
    match std::env::var(k) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| ContextorError::Config(format!("{k} has an invalid value: {v}"))),
        _ => Ok(dflt),
    }
}

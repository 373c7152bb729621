//! Request and result types shared with the HTTP layer.

use ai_llm_service::LlmProvider;
use rag_store::RagHit;
use serde::{Deserialize, Serialize};

/// Options for a single document question. `None` falls back to config.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AskOptions {
    pub collection: Option<String>,
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
    pub backend: Option<LlmProvider>,
    pub model: Option<String>,
    /// Per-request Gemini key.
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
}

/// Answer plus the context it was generated from.
#[derive(Clone, Debug, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    /// Unique source basenames, in retrieval order.
    pub sources: Vec<String>,
    pub prompt_tokens: usize,
    pub prompt_over_soft_limit: bool,
    pub model: String,
    pub hits: Vec<RagHit>,
}

fn default_true() -> bool {
    true
}

/// Chat request. With `use_context`, the message is answered with combined
/// context from `context_sources` (collection names), or from the default
/// collections when that list is empty.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_backend")]
    pub backend: LlmProvider,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_true")]
    pub use_context: bool,
    #[serde(default)]
    pub context_sources: Vec<String>,
}

fn default_backend() -> LlmProvider {
    LlmProvider::Gemini
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, backend: LlmProvider) -> Self {
        Self {
            message: message.into(),
            backend,
            model: None,
            api_key: None,
            temperature: None,
            max_tokens: None,
            use_context: true,
            context_sources: Vec::new(),
        }
    }
}

/// Structured chat result. Failures are reported here, never as errors.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChatOutcome {
    pub success: bool,
    pub response: String,
    pub model_used: String,
    pub context_sources_used: Vec<String>,
    pub processing_time_ms: u64,
    /// RFC 3339.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Unique [`RagHit::source_name`]s in first-seen order.
pub fn unique_sources(hits: &[RagHit]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for h in hits {
        let name = h.source_name();
        if !out.iter().any(|s| s == name) {
            out.push(name.to_string());
        }
    }
    out
}

use crate::config::llm_provider::LlmProvider;

/// Configuration for an LLM model invocation.
///
/// General and provider-specific parameters live side by side; each service
/// validates the subset it needs at construction time.
///
/// # Fields
///
/// - `provider`: which backend to use (Ollama, Gemini, OpenAI).
/// - `model`: the model identifier (e.g., `"llama3"`, `"gemini-pro"`).
/// - `endpoint`: base URL of the local server or remote API.
/// - `api_key`: API key for providers that require authentication.
/// - `max_tokens`: maximum number of tokens to generate.
/// - `temperature`: sampling temperature.
/// - `top_p`: nucleus sampling cutoff.
/// - `timeout_secs`: per-request timeout in seconds.
///
/// # Examples
///
/// ```
/// use ai_llm_service::config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::Gemini,
///     model: "gemini-pro".to_string(),
///     endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
///     api_key: Some("key".to_string()),
///     max_tokens: Some(2048),
///     temperature: Some(0.7),
///     top_p: Some(0.95),
///     timeout_secs: Some(30),
/// };
/// assert!(cfg.provider.is_cloud());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// Inference endpoint (base URL).
    pub endpoint: String,

    /// Optional API key for authentication.
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Same config pointed at another model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Same config with another API key.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self.clone()
        }
    }

    /// Trimmed endpoint without a trailing slash.
    pub fn base_url(&self) -> String {
        self.endpoint.trim().trim_end_matches('/').to_string()
    }
}

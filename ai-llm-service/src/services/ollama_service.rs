//! Lightweight Ollama service for text generation, embeddings and model listing.
//!
//! Thin client for the local Ollama API:
//! - `POST {endpoint}/api/generate` (synchronous text generation, `stream=false`)
//! - `POST {endpoint}/api/embed`    (batch embeddings)
//! - `GET  {endpoint}/api/tags`     (installed models)
//!
//! Local calls are made once; there is no rate limiting or retry for Ollama.
//!
//! # Examples
//!
//! ```no_run
//! use ai_llm_service::config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
//! use ai_llm_service::backend::GenerateOptions;
//! use ai_llm_service::services::ollama_service::OllamaService;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = LlmModelConfig {
//!     provider: LlmProvider::Ollama,
//!     model: "llama3".into(),
//!     endpoint: "http://localhost:11434".into(),
//!     api_key: None,
//!     max_tokens: Some(256),
//!     temperature: Some(0.7),
//!     top_p: Some(0.9),
//!     timeout_secs: Some(30),
//! };
//!
//! let svc = OllamaService::new(cfg)?;
//! let text = svc.generate("Write a haiku about Rust.", &GenerateOptions::default()).await?;
//! println!("Generated:\n{}", text);
//! # Ok(()) }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    backend::{BoxFuture, GenerateOptions, LlmBackend},
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{
        AiLlmError, ConfigError, ProviderError, ProviderErrorKind, Result, classify_status,
        transport_error,
    },
};

const PROVIDER: LlmProvider = LlmProvider::Ollama;

/// Thin client for Ollama.
///
/// Initialized with a full [`LlmModelConfig`]. Reuses an HTTP client with
/// a configurable timeout.
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_embed: String,
    url_tags: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - [`ProviderErrorKind::InvalidProvider`] if `cfg.provider` is not `Ollama`
    /// - [`ConfigError::EmptyModel`] if no model name is set
    /// - [`ProviderErrorKind::InvalidEndpoint`] if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != PROVIDER {
            return Err(ProviderError::new(PROVIDER, ProviderErrorKind::InvalidProvider).into());
        }
        if cfg.model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ProviderError::new(
                PROVIDER,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        let base = cfg.base_url();
        Ok(Self {
            url_generate: format!("{base}/api/generate"),
            url_embed: format!("{base}/api/embed"),
            url_tags: format!("{base}/api/tags"),
            client,
            cfg,
        })
    }

    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    /// Performs a non-streaming generation request via `/api/generate`.
    ///
    /// Per-call options override the config: `num_predict` comes from
    /// `opts.max_tokens` or `cfg.max_tokens`, `temperature` likewise.
    #[instrument(skip_all, fields(model = %self.cfg.model, prompt_chars = prompt.len()))]
    pub async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String> {
        let body = GenerateRequest::new(&self.cfg, prompt, opts);

        debug!("POST {}", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &self.url_generate, &text, None).into());
        }

        let out: GenerateResponse = resp.json().await.map_err(|e| {
            ProviderError::new(
                PROVIDER,
                ProviderErrorKind::Decode(format!("{e}; ensure `stream=false` is used")),
            )
        })?;

        if out.response.trim().is_empty() {
            return Err(ProviderError::new(PROVIDER, ProviderErrorKind::EmptyResponse).into());
        }
        Ok(out.response)
    }

    /// Embeds a batch of texts via `/api/embed`, one vector per input.
    #[instrument(skip_all, fields(model = %self.cfg.model, n = inputs.len()))]
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest {
            model: &self.cfg.model,
            input: inputs,
        };

        debug!("POST {}", self.url_embed);
        let resp = self
            .client
            .post(&self.url_embed)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &self.url_embed, &text, None).into());
        }

        let out: EmbedResponse = resp.json().await.map_err(|e| {
            ProviderError::new(
                PROVIDER,
                ProviderErrorKind::Decode(format!("{e}; expected `{{ embeddings: number[][] }}`")),
            )
        })?;

        if out.embeddings.len() != inputs.len() {
            return Err(ProviderError::new(
                PROVIDER,
                ProviderErrorKind::Decode(format!(
                    "expected {} embeddings, got {}",
                    inputs.len(),
                    out.embeddings.len()
                )),
            )
            .into());
        }
        Ok(out.embeddings)
    }

    /// Names of the models installed on this Ollama instance.
    #[instrument(skip_all)]
    pub async fn list_models(&self) -> Result<Vec<String>> {
        debug!("GET {}", self.url_tags);
        let resp = self
            .client
            .get(&self.url_tags)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &self.url_tags, &text, None).into());
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, ProviderErrorKind::Decode(e.to_string())))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl LlmBackend for OllamaService {
    fn kind(&self) -> LlmProvider {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.cfg.model
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, std::result::Result<String, AiLlmError>> {
        Box::pin(OllamaService::generate(self, prompt, opts))
    }
}

/* ==========================
HTTP payloads & options
========================== */

/// Request body for `/api/generate` (non-streaming).
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: OllamaOptions,
}

impl<'a> GenerateRequest<'a> {
    fn new(cfg: &'a LlmModelConfig, prompt: &'a str, opts: &'a GenerateOptions) -> Self {
        Self {
            model: &cfg.model,
            prompt,
            stream: false,
            system: opts.system.as_deref(),
            options: OllamaOptions {
                temperature: opts.temperature.or(cfg.temperature),
                top_p: cfg.top_p,
                num_predict: opts.max_tokens.or(cfg.max_tokens),
            },
        }
    }
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

//! Process-scoped LLM gateway.
//!
//! - Constructed once at startup, wrapped in `Arc`, shared by the HTTP layer.
//! - Caches HTTP clients: Ollama and OpenAI by model, Gemini by model for the
//!   configured key only. A per-request Gemini key gets a client that is
//!   dropped with the backend.
//! - Owns the cloud [`RateLimiter`] so every Gemini call in the process shares
//!   one sliding window.
//! - Backends are chosen explicitly by [`LlmProvider`]; nothing is probed at
//!   construction time.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use ai_llm_service::{backend::GenerateOptions, config::llm_provider::LlmProvider};
//! use ai_llm_service::gateway::{GatewayConfig, LlmGateway};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gw = Arc::new(LlmGateway::new(GatewayConfig::from_env()?)?);
//! let backend = gw.backend(LlmProvider::Ollama, None, None).await?;
//! let text = backend.generate("Hello", &GenerateOptions::default()).await?;
//! println!("{text}");
//! # Ok(()) }
//! ```

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    backend::{CloudBackend, LlmBackend},
    config::{
        default_config::{config_embedding, config_gemini, config_ollama_chat, config_openai_chat},
        llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    error_handler::{AiLlmError, ConfigError, ProviderError, ProviderErrorKind, env_parse_or},
    health_service::{HealthService, HealthStatus},
    rate_limiter::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW, RateLimiter},
    retry::RetryPolicy,
    services::{
        gemini_service::GeminiService, ollama_service::OllamaService,
        open_ai_service::OpenAiService,
    },
};

/// Everything the gateway needs, usually read from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Local chat profile; its model is the fallback for unknown local models.
    pub local: LlmModelConfig,
    /// Gemini profile. The API key may be absent and supplied per request.
    pub cloud: LlmModelConfig,
    /// OpenAI profile, present only when an API key is configured.
    pub openai: Option<LlmModelConfig>,
    /// Embedding profile used for both ingestion and queries.
    pub embedding: LlmModelConfig,
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub retry: RetryPolicy,
    pub health_timeout_secs: Option<u64>,
}

impl GatewayConfig {
    /// Reads all profiles from the environment.
    ///
    /// `GEMINI_RATE_LIMIT` and `GEMINI_RATE_WINDOW_SECS` tune the limiter.
    pub fn from_env() -> Result<Self, AiLlmError> {
        let openai = config_openai_chat()?;
        Ok(Self {
            local: config_ollama_chat()?,
            cloud: config_gemini()?,
            openai: openai.api_key.is_some().then_some(openai),
            embedding: config_embedding()?,
            rate_limit_requests: env_parse_or("GEMINI_RATE_LIMIT", DEFAULT_MAX_REQUESTS)?,
            rate_limit_window: Duration::from_secs(env_parse_or(
                "GEMINI_RATE_WINDOW_SECS",
                DEFAULT_WINDOW.as_secs(),
            )?),
            retry: RetryPolicy::default(),
            health_timeout_secs: Some(10),
        })
    }
}

/// Shared gateway to every configured model backend.
pub struct LlmGateway {
    cfg: GatewayConfig,

    ollama: RwLock<HashMap<String, Arc<OllamaService>>>,
    gemini: RwLock<HashMap<String, Arc<GeminiService>>>,
    openai: RwLock<HashMap<String, Arc<OpenAiService>>>,

    limiter: Arc<RateLimiter>,
    health: HealthService,
}

impl LlmGateway {
    /// # Errors
    /// [`AiLlmError::HttpTransport`] if the health client cannot be built.
    pub fn new(cfg: GatewayConfig) -> Result<Self, AiLlmError> {
        let limiter = Arc::new(RateLimiter::new(cfg.rate_limit_requests, cfg.rate_limit_window));
        let health = HealthService::new(cfg.health_timeout_secs)?;

        info!(
            local_model = %cfg.local.model,
            cloud_model = %cfg.cloud.model,
            cloud_key = cfg.cloud.api_key.is_some(),
            openai = cfg.openai.is_some(),
            embedding_provider = %cfg.embedding.provider,
            embedding_model = %cfg.embedding.model,
            rate_limit = limiter.max_requests(),
            rate_window_secs = limiter.window().as_secs(),
            "LlmGateway initialized"
        );

        Ok(Self {
            cfg,
            ollama: RwLock::new(HashMap::new()),
            gemini: RwLock::new(HashMap::new()),
            openai: RwLock::new(HashMap::new()),
            limiter,
            health,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.cfg
    }

    /// Identifier of the embedding model, recorded in every collection manifest.
    pub fn embedding_model(&self) -> String {
        format!("{}:{}", self.cfg.embedding.provider, self.cfg.embedding.model)
    }

    pub fn default_local_model(&self) -> &str {
        &self.cfg.local.model
    }

    /// Returns a backend for `kind`.
    ///
    /// - `model` overrides the profile model (`None` keeps the default).
    /// - `api_key` overrides the configured Gemini key.
    ///
    /// # Errors
    /// - `MissingApiKey` for Gemini without any key
    /// - [`ConfigError::BackendNotConfigured`] for OpenAI without a key
    pub async fn backend(
        &self,
        kind: LlmProvider,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Arc<dyn LlmBackend>, AiLlmError> {
        let model = model.map(str::trim).filter(|m| !m.is_empty());
        match kind {
            LlmProvider::Ollama => {
                let svc = self.local_client(model.unwrap_or(&self.cfg.local.model)).await?;
                Ok(svc)
            }
            LlmProvider::Gemini => {
                let svc = self.gemini_client(model, api_key).await?;
                Ok(Arc::new(CloudBackend::new(
                    svc,
                    self.limiter.clone(),
                    self.cfg.retry,
                )))
            }
            LlmProvider::OpenAI => {
                let svc = self.openai_client(model).await?;
                Ok(svc)
            }
        }
    }

    /// Embeds a batch of texts with the embedding profile.
    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AiLlmError> {
        let emb = &self.cfg.embedding;
        match emb.provider {
            LlmProvider::Ollama => {
                let cli = self.cached_ollama(emb.clone()).await?;
                cli.embed_batch(inputs).await
            }
            LlmProvider::OpenAI => {
                let cli = self.cached_openai(emb.clone()).await?;
                cli.embed_batch(inputs).await
            }
            LlmProvider::Gemini => Err(ConfigError::UnsupportedProvider(
                "gemini embeddings".into(),
            )
            .into()),
        }
    }

    /// Models installed on the local Ollama instance.
    pub async fn list_local_models(&self) -> Result<Vec<String>, AiLlmError> {
        let cli = self.local_client(&self.cfg.local.model).await?;
        cli.list_models().await
    }

    /// Health snapshot for every distinct configured profile.
    pub async fn health_all(&self) -> Vec<HealthStatus> {
        let mut list = Vec::<LlmModelConfig>::with_capacity(4);
        list.push(self.cfg.local.clone());
        if self.cfg.cloud.api_key.is_some() {
            list.push(self.cfg.cloud.clone());
        }
        if let Some(openai) = &self.cfg.openai {
            list.push(openai.clone());
        }
        if !list.contains(&self.cfg.embedding) {
            list.push(self.cfg.embedding.clone());
        }
        self.health.check_many(&list).await
    }

    /// Shared limiter gating every Gemini attempt.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /* --------------------- Internals --------------------- */

    /// Local client for `model`, falling back to the default local model when
    /// a client for `model` cannot be built.
    async fn local_client(&self, model: &str) -> Result<Arc<OllamaService>, AiLlmError> {
        match self.cached_ollama(self.cfg.local.with_model(model)).await {
            Ok(cli) => Ok(cli),
            Err(e) if model != self.cfg.local.model => {
                warn!(
                    requested = model,
                    fallback = %self.cfg.local.model,
                    error = %e,
                    "local model unavailable, using default"
                );
                self.cached_ollama(self.cfg.local.clone()).await
            }
            Err(e) => Err(e),
        }
    }

    async fn cached_ollama(&self, cfg: LlmModelConfig) -> Result<Arc<OllamaService>, AiLlmError> {
        let key = format!("{}|{}", cfg.base_url(), cfg.model);
        if let Some(cli) = self.ollama.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.ollama.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OllamaService::new(cfg)?);
        w.insert(key, cli.clone());
        Ok(cli)
    }

    async fn gemini_client(
        &self,
        model: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Arc<GeminiService>, AiLlmError> {
        let mut cfg = match model {
            Some(m) => self.cfg.cloud.with_model(m),
            None => self.cfg.cloud.clone(),
        };
        let request_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .filter(|k| self.cfg.cloud.api_key.as_deref() != Some(*k));
        if let Some(k) = request_key {
            cfg.api_key = Some(k.to_string());
            return Ok(Arc::new(GeminiService::new(cfg)?));
        }
        if cfg.api_key.is_none() {
            return Err(ProviderError::new(LlmProvider::Gemini, ProviderErrorKind::MissingApiKey).into());
        }

        if let Some(cli) = self.gemini.read().await.get(&cfg.model).cloned() {
            return Ok(cli);
        }
        let mut w = self.gemini.write().await;
        if let Some(cli) = w.get(&cfg.model).cloned() {
            return Ok(cli);
        }
        let model = cfg.model.clone();
        let cli = Arc::new(GeminiService::new(cfg)?);
        w.insert(model, cli.clone());
        Ok(cli)
    }

    async fn openai_client(&self, model: Option<&str>) -> Result<Arc<OpenAiService>, AiLlmError> {
        let base = self
            .cfg
            .openai
            .as_ref()
            .ok_or(ConfigError::BackendNotConfigured(LlmProvider::OpenAI))?;
        let cfg = match model {
            Some(m) => base.with_model(m),
            None => base.clone(),
        };
        self.cached_openai(cfg).await
    }

    async fn cached_openai(&self, cfg: LlmModelConfig) -> Result<Arc<OpenAiService>, AiLlmError> {
        let key = format!("{}|{}", cfg.base_url(), cfg.model);
        if let Some(cli) = self.openai.read().await.get(&key).cloned() {
            return Ok(cli);
        }
        let mut w = self.openai.write().await;
        if let Some(cli) = w.get(&key).cloned() {
            return Ok(cli);
        }
        let cli = Arc::new(OpenAiService::new(cfg)?);
        w.insert(key, cli.clone());
        Ok(cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_cfg(provider: LlmProvider, model: &str, endpoint: &str) -> LlmModelConfig {
        LlmModelConfig {
            provider,
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: None,
            max_tokens: None,
            temperature: Some(0.7),
            top_p: None,
            timeout_secs: Some(5),
        }
    }

    fn gateway() -> LlmGateway {
        LlmGateway::new(GatewayConfig {
            local: model_cfg(LlmProvider::Ollama, "llama3", "http://localhost:11434"),
            cloud: model_cfg(
                LlmProvider::Gemini,
                "gemini-pro",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            openai: None,
            embedding: model_cfg(LlmProvider::Ollama, "all-minilm", "http://localhost:11434"),
            rate_limit_requests: 14,
            rate_limit_window: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            health_timeout_secs: Some(1),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn local_backend_uses_default_model_when_none_requested() {
        let gw = gateway();
        let b = gw.backend(LlmProvider::Ollama, None, None).await.unwrap();
        assert_eq!(b.kind(), LlmProvider::Ollama);
        assert_eq!(b.model(), "llama3");
    }

    #[tokio::test]
    async fn local_clients_are_cached_per_model() {
        let gw = gateway();
        gw.backend(LlmProvider::Ollama, Some("mistral"), None).await.unwrap();
        gw.backend(LlmProvider::Ollama, Some("mistral"), None).await.unwrap();
        gw.backend(LlmProvider::Ollama, None, None).await.unwrap();
        assert_eq!(gw.ollama.read().await.len(), 2);
    }

    #[tokio::test]
    async fn gemini_without_any_key_is_rejected() {
        let gw = gateway();
        let err = gw.backend(LlmProvider::Gemini, None, None).await.err().unwrap();
        assert!(matches!(
            err.provider_kind(),
            Some(ProviderErrorKind::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn gemini_with_request_key_is_built() {
        let gw = gateway();
        let b = gw.backend(LlmProvider::Gemini, None, Some("key-1")).await.unwrap();
        assert_eq!(b.kind(), LlmProvider::Gemini);
        assert_eq!(b.model(), "gemini-pro");

        gw.backend(LlmProvider::Gemini, None, Some("key-2")).await.unwrap();
        assert!(gw.gemini.read().await.is_empty());
    }

    #[tokio::test]
    async fn only_the_configured_gemini_key_is_cached() {
        let mut cfg = gateway().cfg;
        cfg.cloud.api_key = Some("server-key".into());
        let gw = LlmGateway::new(cfg).unwrap();

        gw.backend(LlmProvider::Gemini, None, None).await.unwrap();
        gw.backend(LlmProvider::Gemini, None, Some("server-key")).await.unwrap();
        gw.backend(LlmProvider::Gemini, None, Some("caller-key")).await.unwrap();

        let cache = gw.gemini.read().await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache["gemini-pro"].config().api_key.as_deref(), Some("server-key"));
    }

    #[tokio::test]
    async fn openai_without_config_is_not_configured() {
        let gw = gateway();
        let err = gw.backend(LlmProvider::OpenAI, None, None).await.err().unwrap();
        assert!(matches!(
            err,
            AiLlmError::Config(ConfigError::BackendNotConfigured(LlmProvider::OpenAI))
        ));
    }

    #[test]
    fn embedding_model_id_names_provider_and_model() {
        assert_eq!(gateway().embedding_model(), "ollama:all-minilm");
    }
}

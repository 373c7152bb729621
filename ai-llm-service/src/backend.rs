//! Backend abstraction: one `generate` capability over local and cloud models.
//!
//! Implementations:
//! - [`OllamaService`](crate::services::ollama_service::OllamaService): local, single attempt
//! - [`OpenAiService`](crate::services::open_ai_service::OpenAiService): single attempt
//! - [`CloudBackend`]: Gemini behind the shared [`RateLimiter`] and a [`RetryPolicy`]

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::debug;

use crate::{
    config::llm_provider::LlmProvider,
    error_handler::AiLlmError,
    rate_limiter::RateLimiter,
    retry::RetryPolicy,
    services::gemini_service::GeminiService,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-call overrides on top of the model config.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// System instruction for chat-style providers. Ignored by Gemini and
    /// prepended to the prompt by Ollama.
    pub system: Option<String>,
}

impl GenerateOptions {
    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }
}

/// A text-generation backend.
pub trait LlmBackend: Send + Sync {
    /// Which provider serves this backend.
    fn kind(&self) -> LlmProvider;

    /// Model identifier used for generation.
    fn model(&self) -> &str;

    /// Generates a completion for `prompt`.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<String, AiLlmError>>;
}

/// Gemini with rate limiting and retry.
///
/// Every attempt first waits on the shared limiter, so retries are counted
/// against the same sliding window as first attempts.
pub struct CloudBackend {
    service: Arc<GeminiService>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl CloudBackend {
    pub fn new(service: Arc<GeminiService>, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            service,
            limiter,
            policy,
        }
    }
}

impl LlmBackend for CloudBackend {
    fn kind(&self) -> LlmProvider {
        LlmProvider::Gemini
    }

    fn model(&self) -> &str {
        self.service.model()
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<String, AiLlmError>> {
        Box::pin(async move {
            self.policy
                .run("gemini.generate", |attempt| async move {
                    let waited = self.limiter.acquire().await;
                    if !waited.is_zero() {
                        debug!(attempt, waited_ms = waited.as_millis(), "rate limiter delayed call");
                    }
                    self.service.generate_once(prompt, opts).await
                })
                .await
        })
    }
}

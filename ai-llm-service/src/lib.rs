//! Model backends for the document QA service: local Ollama, Gemini behind a
//! rate limiter with retry, and OpenAI-compatible endpoints.

pub mod backend;
pub mod config;
pub mod error_handler;
pub mod gateway;
pub mod health_service;
pub mod rate_limiter;
pub mod retry;
pub mod services;
pub mod telemetry;

pub use backend::{GenerateOptions, LlmBackend};
pub use config::llm_provider::LlmProvider;
pub use error_handler::AiLlmError;
pub use gateway::{GatewayConfig, LlmGateway};

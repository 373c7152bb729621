use std::path::PathBuf;
use std::sync::Arc;

use ai_llm_service::{AiLlmError, GatewayConfig, LlmGateway};
use contextor::{Contextor, ContextorConfig, ContextorError};
use rag_store::{RagConfig, RagError, RagStore, ServiceEmbedder, TiktokenCounter};
use thiserror::Error;
use tracing::info;

use crate::core::category::Category;

pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8000";
/// 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
/// Body cap for a whole multipart upload.
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },

    #[error(transparent)]
    Llm(#[from] AiLlmError),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error(transparent)]
    Contextor(#[from] ContextorError),
}

/// HTTP-level settings.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    /// `host:port` to bind.
    pub address: String,
    /// Holds `{category}_docs/` and `{collection}_vectorstore/`.
    pub data_root: PathBuf,
    /// Per-file upload limit in bytes.
    pub max_file_size: usize,
    pub max_upload_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            data_root: PathBuf::from("."),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }
}

impl AppConfig {
    /// Reads `API_ADDRESS`, `DATA_ROOT`, `MAX_FILE_SIZE` and `MAX_UPLOAD_SIZE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let cfg = Self {
            address: env_or("API_ADDRESS", &d.address),
            data_root: PathBuf::from(env_or("DATA_ROOT", ".")),
            max_file_size: parse_usize("MAX_FILE_SIZE", d.max_file_size)?,
            max_upload_size: parse_usize("MAX_UPLOAD_SIZE", d.max_upload_size)?,
        };
        if cfg.max_file_size == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_FILE_SIZE",
                value: "0".into(),
            });
        }
        Ok(cfg)
    }

    pub fn docs_dir(&self, category: Category) -> PathBuf {
        self.data_root.join(category.docs_dir())
    }
}

/// Shared state for all HTTP handlers.
pub struct AppState {
    pub config: AppConfig,
    pub contextor: Arc<Contextor>,
}

impl AppState {
    pub fn new(config: AppConfig, contextor: Arc<Contextor>) -> Self {
        Self { config, contextor }
    }

    /// Builds the gateway, the store and the answering layer from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = AppConfig::from_env()?;

        let gateway = Arc::new(LlmGateway::new(GatewayConfig::from_env()?)?);
        let embedder = Arc::new(ServiceEmbedder::new(gateway.clone()));
        let counter = Arc::new(TiktokenCounter::cl100k()?);
        let store = Arc::new(RagStore::new(
            RagConfig::from_env(config.data_root.clone())?,
            embedder,
            counter,
        )?);
        let contextor = Contextor::new(ContextorConfig::from_env()?, store, gateway);

        info!(
            address = %config.address,
            data_root = %config.data_root.display(),
            max_file_size = config.max_file_size,
            "app state ready"
        );
        Ok(Self::new(config, Arc::new(contextor)))
    }

    pub fn store(&self) -> &Arc<RagStore> {
        self.contextor.store()
    }

    pub fn gateway(&self) -> &Arc<LlmGateway> {
        self.contextor.gateway()
    }
}

fn env_or(k: &str, dflt: &str) -> String {
    std::env::var(k)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| dflt.to_string())
}

fn parse_usize(var: &'static str, dflt: usize) -> Result<usize, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: v }),
        _ => Ok(dflt),
    }
}

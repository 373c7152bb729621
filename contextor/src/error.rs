//! Typed error for the contextor crate.

use ai_llm_service::AiLlmError;
use rag_store::RagError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextorError {
    /// Errors from the underlying rag-store crate.
    #[error("RAG error: {0}")]
    Rag(#[from] RagError),

    /// Model backend failures (after retries, for the cloud backend).
    #[error("LLM error: {0}")]
    Llm(#[from] AiLlmError),

    /// Rejected request input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),
}

impl ContextorError {
    /// Message shown to chat users instead of the raw error.
    pub fn user_message(&self) -> String {
        match self {
            ContextorError::Llm(e) => e.user_message(),
            ContextorError::Rag(RagError::CollectionLoad { name, .. }) => format!(
                "The knowledge base `{name}` could not be loaded. Please rebuild the vector database."
            ),
            ContextorError::Rag(RagError::EmbeddingMismatch { .. }) => {
                "The knowledge base was built with another embedding model. Please rebuild the vector database."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ai_llm_service::error_handler::{
        FORBIDDEN_MESSAGE, ProviderError, ProviderErrorKind, RATE_LIMIT_MESSAGE,
    };
    use ai_llm_service::LlmProvider;

    use super::*;

    fn provider(kind: ProviderErrorKind) -> ContextorError {
        ContextorError::Llm(ProviderError::new(LlmProvider::Gemini, kind).into())
    }

    #[test]
    fn user_messages() {
        assert_eq!(
            provider(ProviderErrorKind::RateLimited { retry_after_secs: Some(3) }).user_message(),
            RATE_LIMIT_MESSAGE
        );
        assert_eq!(provider(ProviderErrorKind::Forbidden).user_message(), FORBIDDEN_MESSAGE);

        let load = ContextorError::Rag(RagError::CollectionLoad {
            name: "rag_docs".into(),
            reason: "bad manifest".into(),
        });
        assert!(load.user_message().contains("rebuild the vector database"));
    }
}

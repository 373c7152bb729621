use ai_llm_service::AiLlmError;
use ai_llm_service::error_handler::ProviderErrorKind;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use contextor::ContextorError;
use rag_store::RagError;
use thiserror::Error;
use tracing::{error, warn};

use crate::core::{app_state::ConfigError, http::response_envelope::ApiResponse};

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- Boot / config ---
    #[error(transparent)]
    Config(#[from] ConfigError),

    // --- IO / server ---
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // --- Request ---
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    // --- Lower layers ---
    #[error(transparent)]
    Rag(#[from] RagError),

    #[error(transparent)]
    Llm(#[from] AiLlmError),

    #[error(transparent)]
    Contextor(#[from] ContextorError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Rag(e) => rag_status(e),
            AppError::Llm(e) => llm_status(e),
            AppError::Contextor(ContextorError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            AppError::Contextor(ContextorError::Rag(e)) => rag_status(e),
            AppError::Contextor(ContextorError::Llm(e)) => llm_status(e),
            AppError::Config(_)
            | AppError::Bind(_)
            | AppError::Server(_)
            | AppError::Io(_)
            | AppError::Contextor(ContextorError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Bind(_) => "BIND_ERROR",
            AppError::Server(_) => "SERVER_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Rag(e) => rag_code(e),
            AppError::Llm(e) => llm_code(e),
            AppError::Contextor(ContextorError::InvalidInput(_)) => "BAD_REQUEST",
            AppError::Contextor(ContextorError::Rag(e)) => rag_code(e),
            AppError::Contextor(ContextorError::Llm(e)) => llm_code(e),
            AppError::Contextor(ContextorError::Config(_)) => "CONFIG_ERROR",
        }
    }

    /// Text for the response body. Model failures use their user-facing wording.
    fn public_message(&self) -> String {
        match self {
            AppError::Llm(e) => e.user_message(),
            AppError::Contextor(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

fn rag_status(e: &RagError) -> StatusCode {
    match e {
        RagError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        RagError::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::EmbeddingMismatch { .. } => StatusCode::CONFLICT,
        RagError::Embedding(_) | RagError::BatchIngestion { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn rag_code(e: &RagError) -> &'static str {
    match e {
        RagError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
        RagError::Extraction { .. } => "EXTRACTION_FAILED",
        RagError::CollectionLoad { .. } => "COLLECTION_LOAD_FAILED",
        RagError::BatchIngestion { .. } => "BATCH_INGESTION_FAILED",
        RagError::EmbeddingMismatch { .. } => "EMBEDDING_MISMATCH",
        RagError::Embedding(_) => "EMBEDDING_FAILED",
        _ => "RAG_ERROR",
    }
}

fn llm_status(e: &AiLlmError) -> StatusCode {
    if e.is_rate_limited() {
        StatusCode::TOO_MANY_REQUESTS
    } else if e.is_forbidden() {
        StatusCode::FORBIDDEN
    } else if matches!(e.provider_kind(), Some(ProviderErrorKind::MissingApiKey)) {
        StatusCode::UNAUTHORIZED
    } else {
        match e {
            AiLlmError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            AiLlmError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

fn llm_code(e: &AiLlmError) -> &'static str {
    if e.is_rate_limited() {
        "RATE_LIMITED"
    } else if e.is_forbidden() {
        "FORBIDDEN"
    } else if matches!(e.provider_kind(), Some(ProviderErrorKind::MissingApiKey)) {
        "MISSING_API_KEY"
    } else {
        match e {
            AiLlmError::Config(_) => "LLM_NOT_CONFIGURED",
            AiLlmError::Timeout(_) => "LLM_TIMEOUT",
            _ => "LLM_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        } else {
            warn!(error = %self, %status, "request rejected");
        }
        ApiResponse::<()>::error(self.error_code(), self.public_message(), Vec::new())
            .into_response_with_status(status)
    }
}

/// Handy result alias used across handlers.
pub type AppResult<T> = Result<T, AppError>;

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ai_llm_service::LlmProvider;
    use ai_llm_service::error_handler::{ProviderError, RATE_LIMIT_MESSAGE};

    use super::*;

    #[test]
    fn rag_errors_keep_their_meaning() {
        let e = AppError::from(RagError::UnsupportedFormat(PathBuf::from("a.exe")));
        assert_eq!(e.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(e.error_code(), "UNSUPPORTED_FORMAT");

        let e = AppError::from(ContextorError::Rag(RagError::CollectionLoad {
            name: "rag_docs".into(),
            reason: "bad manifest".into(),
        }));
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.error_code(), "COLLECTION_LOAD_FAILED");
        assert!(e.public_message().contains("rebuild"));
    }

    #[test]
    fn rate_limit_is_429_with_user_message() {
        let llm: AiLlmError = ProviderError::new(
            LlmProvider::Gemini,
            ProviderErrorKind::RateLimited { retry_after_secs: None },
        )
        .into();
        let e = AppError::from(ContextorError::Llm(llm));
        assert_eq!(e.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(e.error_code(), "RATE_LIMITED");
        assert_eq!(e.public_message(), RATE_LIMIT_MESSAGE);
    }

    #[test]
    fn invalid_input_is_bad_request() {
        let e = AppError::from(ContextorError::InvalidInput("question must not be empty".into()));
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(e.error_code(), "BAD_REQUEST");
    }
}

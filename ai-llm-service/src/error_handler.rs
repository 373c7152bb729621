//! Unified error handling for `ai-llm-service`.
//!
//! This module exposes a single top-level error type [`AiLlmError`] for the whole
//! library, and groups domain-specific errors in nested enums ([`ConfigError`],
//! [`HealthError`], [`ProviderError`]). Small helpers for reading/validating
//! environment variables return the unified [`Result<T>`] alias.
//!
//! All messages carry the `[AI LLM Service]` prefix to simplify attribution in logs.

use std::{fmt, str::FromStr, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::llm_provider::LlmProvider;

/* ------------------------------------------------------------------------- */
/* Public result alias                                                       */
/* ------------------------------------------------------------------------- */

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, AiLlmError>;

/// Maximum number of characters kept from an upstream error body.
pub const SNIPPET_MAX_CHARS: usize = 240;

/// User-facing message for exhausted rate-limit retries.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please wait a moment and try again.";

/// User-facing message for rejected credentials.
pub const FORBIDDEN_MESSAGE: &str = "Invalid API key or insufficient permissions.";

/// User-facing message for an exhausted provider quota.
pub const QUOTA_MESSAGE: &str = "API quota exceeded. Please check your Gemini API usage.";

/* ------------------------------------------------------------------------- */
/* Top-level error                                                           */
/* ------------------------------------------------------------------------- */

/// Top-level error for the `ai-llm-service` crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AiLlmError {
    /// Configuration/validation errors (startup/readiness).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Health-check/connectivity/decoding errors.
    #[error(transparent)]
    Health(#[from] HealthError),

    /// A provider call failed with a classified reason.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Underlying HTTP transport error (e.g., `reqwest::Error`).
    #[error("[AI LLM Service] transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),

    /// Operation exceeded the configured timeout.
    #[error("[AI LLM Service] operation timed out after {0:?}")]
    Timeout(Duration),
}

impl AiLlmError {
    /// Returns the provider error kind, if this is a provider failure.
    pub fn provider_kind(&self) -> Option<&ProviderErrorKind> {
        match self {
            AiLlmError::Provider(p) => Some(&p.kind),
            _ => None,
        }
    }

    /// Whether the cloud retry policy may try again after this error.
    ///
    /// Rate limiting, timeouts and empty model responses are transient;
    /// permission errors and everything else are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiLlmError::Timeout(_) => true,
            AiLlmError::HttpTransport(e) => e.is_timeout(),
            AiLlmError::Provider(p) => matches!(
                p.kind,
                ProviderErrorKind::RateLimited { .. }
                    | ProviderErrorKind::Timeout
                    | ProviderErrorKind::EmptyResponse
            ),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self.provider_kind(),
            Some(ProviderErrorKind::RateLimited { .. })
        )
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self.provider_kind(), Some(ProviderErrorKind::Forbidden))
    }

    /// Short message suitable for end users of a chat surface.
    pub fn user_message(&self) -> String {
        match self.provider_kind() {
            Some(ProviderErrorKind::RateLimited { .. }) => RATE_LIMIT_MESSAGE.to_string(),
            Some(ProviderErrorKind::Forbidden) => FORBIDDEN_MESSAGE.to_string(),
            Some(ProviderErrorKind::Timeout) => "Request timeout - please try again".to_string(),
            Some(ProviderErrorKind::EmptyResponse) => {
                "The model returned an empty response. Please try again.".to_string()
            }
            Some(ProviderErrorKind::HttpStatus(http))
                if http.snippet.to_lowercase().contains("quota") =>
            {
                QUOTA_MESSAGE.to_string()
            }
            _ => self.to_string(),
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Provider errors                                                           */
/* ------------------------------------------------------------------------- */

/// HTTP failure details shared by provider and health errors.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// Numeric HTTP status code.
    pub status: StatusCode,
    /// Request URL.
    pub url: String,
    /// Short snippet of the response body (trimmed).
    pub snippet: String,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} from {}: {}", self.status, self.url, self.snippet)
    }
}

/// Classified failure of a single provider call.
#[derive(Debug, Error)]
#[error("[AI LLM Service] {provider}: {kind}")]
pub struct ProviderError {
    pub provider: LlmProvider,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: LlmProvider, kind: ProviderErrorKind) -> Self {
        Self { provider, kind }
    }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// The config targets a different provider than the service.
    #[error("invalid provider for this service")]
    InvalidProvider,

    /// Provider requires an API key and none was configured.
    #[error("missing API key")]
    MissingApiKey,

    /// Endpoint is empty or does not use http/https.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// HTTP 429.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 403.
    #[error("forbidden: invalid API key or insufficient permissions")]
    Forbidden,

    /// Per-request timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// A 2xx response without any generated text.
    #[error("empty response: no candidate with text")]
    EmptyResponse,

    /// Any other non-success status, body attached.
    #[error("{0}")]
    HttpStatus(HttpError),

    /// Response JSON did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Maps a non-success HTTP status to a [`ProviderError`].
///
/// 429 and 403 get their own kinds so the retry policy can tell them apart;
/// everything else keeps the body snippet for diagnostics.
pub fn classify_status(
    provider: LlmProvider,
    status: StatusCode,
    url: &str,
    body: &str,
    retry_after_secs: Option<u64>,
) -> ProviderError {
    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimited { retry_after_secs },
        StatusCode::FORBIDDEN => ProviderErrorKind::Forbidden,
        _ => ProviderErrorKind::HttpStatus(HttpError {
            status,
            url: url.to_string(),
            snippet: make_snippet(body),
        }),
    };
    ProviderError::new(provider, kind)
}

/// Converts a transport error into the timeout kind when applicable.
pub fn transport_error(provider: LlmProvider, err: reqwest::Error) -> AiLlmError {
    if err.is_timeout() {
        ProviderError::new(provider, ProviderErrorKind::Timeout).into()
    } else {
        AiLlmError::HttpTransport(err)
    }
}

/// Trims and shortens an upstream body for logs and error messages.
pub fn make_snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= SNIPPET_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
    out.push('…');
    out
}

/* ------------------------------------------------------------------------- */
/* Config errors                                                             */
/* ------------------------------------------------------------------------- */

/// Error enum for environment/config-driven setup.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[AI LLM Service] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (like ports, limits, timeouts).
    #[error("[AI LLM Service] invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    /// Unsupported provider name.
    #[error("[AI LLM Service] unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Value had the wrong format (e.g., invalid URL).
    #[error("[AI LLM Service] invalid format in {var}: {reason}")]
    InvalidFormat {
        var: &'static str,
        reason: &'static str,
    },

    /// A numeric field was outside of the allowed range.
    #[error("[AI LLM Service] {field} is out of range: {detail}")]
    OutOfRange {
        field: &'static str,
        detail: &'static str,
    },

    /// Model name was empty.
    #[error("[AI LLM Service] model name must not be empty")]
    EmptyModel,

    /// Backend is known but not configured in this process.
    #[error("[AI LLM Service] backend {0} is not configured")]
    BackendNotConfigured(LlmProvider),
}

/* ------------------------------------------------------------------------- */
/* Health errors                                                             */
/* ------------------------------------------------------------------------- */

/// Error enum for provider health checks.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HealthError {
    /// The endpoint is empty or does not start with http/https.
    #[error("[AI LLM Service] invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Upstream returned a non-successful HTTP status.
    #[error("[AI LLM Service] {0}")]
    HttpStatus(HttpError),

    /// Response payload could not be decoded as expected.
    #[error("[AI LLM Service] decode error: {0}")]
    Decode(String),
}

/* ------------------------------------------------------------------------- */
/* Env helpers (return unified `Result<T>`)                                  */
/* ------------------------------------------------------------------------- */

/// Fetches a required, non-empty environment variable.
///
/// # Errors
/// Returns [`ConfigError::MissingVar`] if the variable is absent or empty.
pub fn must_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name).into()),
    }
}

/// Optional non-empty environment variable.
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Environment variable with a default for unset/empty values.
pub fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

/// Parses an optional `u32` from env (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ConfigError::InvalidNumber`] if the variable is set but not a valid `u32`.
pub fn env_opt_u32(name: &'static str) -> Result<Option<u32>> {
    env_parse_opt(name, "expected u32")
}

/// Parses a numeric env var, falling back to `default` when unset.
///
/// # Errors
/// Returns [`ConfigError::InvalidNumber`] if the variable is set but does not parse.
pub fn env_parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T> {
    Ok(env_parse_opt(name, "expected a number")?.unwrap_or(default))
}

fn env_parse_opt<T: FromStr>(name: &'static str, reason: &'static str) -> Result<Option<T>> {
    match env_opt(name) {
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var: name, reason }.into()),
        None => Ok(None),
    }
}

/* ------------------------------------------------------------------------- */
/* Validation helpers                                                        */
/* ------------------------------------------------------------------------- */

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    let v = value.trim();
    if v.starts_with("http://") || v.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        }
        .into())
    }
}

/// Validates that a floating-point value lies within an inclusive range.
pub fn validate_range_f32(field: &'static str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            detail: "expected value in inclusive range",
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_rate_limit_and_forbidden() {
        let e = classify_status(
            LlmProvider::Gemini,
            StatusCode::TOO_MANY_REQUESTS,
            "u",
            "slow down",
            Some(7),
        );
        assert!(matches!(
            e.kind,
            ProviderErrorKind::RateLimited {
                retry_after_secs: Some(7)
            }
        ));

        let e = classify_status(LlmProvider::Gemini, StatusCode::FORBIDDEN, "u", "", None);
        assert!(matches!(e.kind, ProviderErrorKind::Forbidden));
    }

    #[test]
    fn other_statuses_keep_body_snippet() {
        let body = "x".repeat(1000);
        let e = classify_status(
            LlmProvider::Gemini,
            StatusCode::BAD_REQUEST,
            "http://h/models",
            &body,
            None,
        );
        match e.kind {
            ProviderErrorKind::HttpStatus(http) => {
                assert_eq!(http.status, StatusCode::BAD_REQUEST);
                assert_eq!(http.snippet.chars().count(), SNIPPET_MAX_CHARS + 1);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn retryable_kinds() {
        let rl: AiLlmError = ProviderError::new(
            LlmProvider::Gemini,
            ProviderErrorKind::RateLimited {
                retry_after_secs: None,
            },
        )
        .into();
        let empty: AiLlmError =
            ProviderError::new(LlmProvider::Gemini, ProviderErrorKind::EmptyResponse).into();
        let forbidden: AiLlmError =
            ProviderError::new(LlmProvider::Gemini, ProviderErrorKind::Forbidden).into();

        assert!(rl.is_retryable());
        assert!(empty.is_retryable());
        assert!(!forbidden.is_retryable());
        assert_eq!(rl.user_message(), RATE_LIMIT_MESSAGE);
        assert_eq!(forbidden.user_message(), FORBIDDEN_MESSAGE);

        let quota: AiLlmError = classify_status(
            LlmProvider::Gemini,
            StatusCode::BAD_REQUEST,
            "u",
            r#"{"error":{"message":"Quota exceeded for project"}}"#,
            None,
        )
        .into();
        assert_eq!(quota.user_message(), QUOTA_MESSAGE);
    }

    #[test]
    fn endpoint_validation() {
        assert!(validate_http_endpoint("X", "https://a").is_ok());
        assert!(validate_http_endpoint("X", "ftp://a").is_err());
    }
}

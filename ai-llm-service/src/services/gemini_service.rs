//! Google Gemini client (`generateContent`).
//!
//! One call is one attempt. Rate limiting and retry live in
//! [`CloudBackend`](crate::backend::CloudBackend).
//!
//! Request: `POST {base}/models/{model}:generateContent` with the
//! `x-goog-api-key` header and a camelCase JSON body.

use std::time::{Duration, Instant};

use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{
        default_config::CLOUD_TIMEOUT_SECS, llm_model_config::LlmModelConfig,
        llm_provider::LlmProvider,
    },
    backend::GenerateOptions,
    error_handler::{
        AiLlmError, ProviderError, ProviderErrorKind, Result, classify_status, make_snippet,
        transport_error,
    },
};

const PROVIDER: LlmProvider = LlmProvider::Gemini;

/// Harm categories blocked at medium probability and above.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";
const TOP_K: u32 = 40;

pub struct GeminiService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
}

impl GeminiService {
    /// # Errors
    /// - `InvalidProvider` if the config is not for Gemini
    /// - `MissingApiKey` if no key is configured
    /// - `InvalidEndpoint` for a non-http(s) base URL
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != PROVIDER {
            return Err(ProviderError::new(PROVIDER, ProviderErrorKind::InvalidProvider).into());
        }
        let api_key = cfg
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::new(PROVIDER, ProviderErrorKind::MissingApiKey))?;

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ProviderError::new(
                PROVIDER,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            header::HeaderValue::from_str(api_key).map_err(|e| {
                ProviderError::new(
                    PROVIDER,
                    ProviderErrorKind::Decode(format!("invalid API key header: {e}")),
                )
            })?,
        );

        let timeout = Duration::from_secs(cfg.timeout_secs.unwrap_or(CLOUD_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let url_generate = format!("{}/models/{}:generateContent", cfg.base_url(), cfg.model);
        info!(model = %cfg.model, timeout_secs = timeout.as_secs(), "GeminiService initialized");

        Ok(Self {
            client,
            cfg,
            url_generate,
        })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    /// Sends one `generateContent` request.
    ///
    /// # Errors
    /// `RateLimited` on 429, `Forbidden` on 403, `Timeout` when the per-request
    /// timeout elapses, `EmptyResponse` when no candidate carries text.
    #[instrument(skip_all, fields(model = %self.cfg.model, prompt_chars = prompt.len()))]
    pub async fn generate_once(&self, prompt: &str, opts: &GenerateOptions) -> Result<String> {
        let started = Instant::now();
        let body = GenerateContentRequest::new(&self.cfg, prompt, opts);

        debug!("POST {}", self.url_generate);
        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = resp.text().await.map_err(|e| transport_error(PROVIDER, e))?;

        let out = interpret_response(status, &self.url_generate, &text, retry_after);
        match &out {
            Ok(answer) => info!(
                latency_ms = started.elapsed().as_millis(),
                answer_chars = answer.len(),
                "gemini call completed"
            ),
            Err(e) => warn!(
                %status,
                latency_ms = started.elapsed().as_millis(),
                error = %e,
                "gemini call failed"
            ),
        }
        out
    }
}

/// Maps a raw Gemini HTTP response to the answer text or a classified error.
///
/// The answer is the text of the first part of the first candidate. A 2xx
/// body without usable candidates, malformed or not, is an empty response.
pub fn interpret_response(
    status: StatusCode,
    url: &str,
    body: &str,
    retry_after_secs: Option<u64>,
) -> Result<String> {
    if !status.is_success() {
        return Err(classify_status(PROVIDER, status, url, body, retry_after_secs).into());
    }

    let parsed: GenerateContentResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, body = %make_snippet(body), "unparseable gemini reply");
            return Err(ProviderError::new(PROVIDER, ProviderErrorKind::EmptyResponse).into());
        }
    };

    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AiLlmError::from(ProviderError::new(PROVIDER, ProviderErrorKind::EmptyResponse)))
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(cfg: &LlmModelConfig, prompt: &'a str, opts: &GenerateOptions) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: opts.temperature.or(cfg.temperature),
                top_k: TOP_K,
                top_p: cfg.top_p,
                max_output_tokens: opts.max_tokens.or(cfg.max_tokens),
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&c| SafetySetting {
                    category: c,
                    threshold: SAFETY_THRESHOLD,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://g/models/gemini-pro:generateContent";

    fn cfg() -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Gemini,
            model: "gemini-pro".into(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/".into(),
            api_key: Some("k".into()),
            max_tokens: Some(2048),
            temperature: Some(0.7),
            top_p: Some(0.95),
            timeout_secs: Some(30),
        }
    }

    #[test]
    fn url_includes_model_and_method() {
        let svc = GeminiService::new(cfg()).unwrap();
        assert_eq!(
            svc.url_generate,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut c = cfg();
        c.api_key = Some(" ".into());
        let err = GeminiService::new(c).err().unwrap();
        assert!(matches!(
            err.provider_kind(),
            Some(ProviderErrorKind::MissingApiKey)
        ));
    }

    #[test]
    fn request_body_is_camel_case_with_safety_settings() {
        let c = cfg();
        let opts = GenerateOptions::default().with_max_tokens(8000);
        let body = serde_json::to_value(GenerateContentRequest::new(&c, "hello", &opts)).unwrap();

        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8000);
        let safety = body["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert!(safety.iter().all(|s| s["threshold"] == SAFETY_THRESHOLD));
    }

    #[test]
    fn first_candidate_text_is_the_answer() {
        let body = r#"{"candidates":[
            {"content":{"parts":[{"text":"Antwort"},{"text":"ignored"}]}},
            {"content":{"parts":[{"text":"second"}]}}
        ]}"#;
        assert_eq!(interpret_response(StatusCode::OK, URL, body, None).unwrap(), "Antwort");
    }

    #[test]
    fn missing_candidates_is_empty_response() {
        for body in [
            r#"{}"#,
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"content":{"parts":[]}}]}"#,
            "<html>upstream proxy</html>",
        ] {
            let err = interpret_response(StatusCode::OK, URL, body, None).unwrap_err();
            assert!(matches!(
                err.provider_kind(),
                Some(ProviderErrorKind::EmptyResponse)
            ));
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn status_codes_are_classified() {
        let rl = interpret_response(StatusCode::TOO_MANY_REQUESTS, URL, "quota", Some(12)).unwrap_err();
        assert!(rl.is_rate_limited());

        let forbidden = interpret_response(StatusCode::FORBIDDEN, URL, "denied", None).unwrap_err();
        assert!(forbidden.is_forbidden());
        assert!(!forbidden.is_retryable());

        let bad = interpret_response(StatusCode::BAD_REQUEST, URL, "bad", None).unwrap_err();
        assert!(!bad.is_retryable());
    }
}

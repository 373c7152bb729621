//! Request id propagation and envelope mapping for extractor rejections.

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::debug;

use crate::core::http::response_envelope::{ApiErrorDetail, ApiResponse};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Rejection bodies are short plain text; anything larger is left alone.
const MAX_REJECTION_BODY: usize = 64 * 1024;

fn new_request_id() -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
    format!("req-{nanos}")
}

/// Tags the request with `X-Request-Id` (keeping a client-supplied one) and
/// echoes it on the response.
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let existing = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let id = existing.unwrap_or_else(new_request_id);
    let value = HeaderValue::from_str(&id).ok();
    if let Some(v) = &value {
        req.headers_mut().insert(REQUEST_ID_HEADER, v.clone());
    }
    debug!(request_id = %id, method = %req.method(), path = %req.uri().path(), "request");

    let mut res = next.run(req).await;
    if let Some(v) = value {
        res.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    res
}

/// Field named in a serde message such as "missing field `question`".
fn field_from_serde_msg(msg: &str) -> Option<String> {
    let start = msg.find('`')? + 1;
    let len = msg[start..].find('`')?;
    let field = &msg[start..start + len];
    (!field.is_empty() && !field.contains(' ')).then(|| field.to_string())
}

async fn take_body(res: Response) -> Option<(axum::http::response::Parts, Bytes)> {
    let (parts, body) = res.into_parts();
    axum::body::to_bytes(body, MAX_REJECTION_BODY)
        .await
        .ok()
        .map(|b| (parts, b))
}

/// Rewrites plain-text 400/415/422 rejections from axum extractors into the
/// JSON envelope. Responses that are already JSON pass through.
pub async fn json_error_mapper(req: Request<Body>, next: Next) -> Response {
    let res = next.run(req).await;
    let status = res.status();

    let code = match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNSUPPORTED_MEDIA_TYPE => "UNSUPPORTED_MEDIA_TYPE",
        StatusCode::UNPROCESSABLE_ENTITY => "UNPROCESSABLE_ENTITY",
        _ => return res,
    };
    let is_json = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return res;
    }

    let Some((mut parts, bytes)) = take_body(res).await else {
        return ApiResponse::<()>::error(code, "request rejected", Vec::new())
            .into_response_with_status(status);
    };
    let original = String::from_utf8_lossy(&bytes);

    let mut details = Vec::new();
    if let Some(path) = field_from_serde_msg(&original) {
        let hint = if original.contains("missing field") {
            "This field is required."
        } else if original.contains("expected a sequence") {
            "Expected an array for this field."
        } else {
            "Check the type of this field."
        };
        details.push(ApiErrorDetail::field(path, hint));
    }

    let envelope = ApiResponse::<()>::error(code, original.trim(), details);
    let body = match serde_json::to_vec(&envelope) {
        Ok(v) => v,
        Err(_) => bytes.to_vec(),
    };

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, body.into())
}

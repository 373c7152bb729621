//! POST /api/chat: one chat turn with optional document context.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Response,
};
use contextor::ChatRequest;
use tracing::instrument;

use crate::core::{app_state::AppState, http::response_envelope::ApiResponse};

/// Handler: POST /api/chat
///
/// Always 200. Model or retrieval failures come back as `success: false`
/// with a user-facing `error_message` inside the outcome.
#[instrument(name = "chat_route", skip_all, fields(backend = %req.backend, use_context = req.use_context))]
pub async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let outcome = state.contextor.chat(&req).await;
    ApiResponse {
        success: outcome.success,
        data: Some(outcome),
        error: None,
    }
    .into_response_with_status(StatusCode::OK)
}

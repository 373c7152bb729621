//! POST /api/ask: answers a question from one collection.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
    routes::ask::ask_request::{AskRequest, AskResponse},
};

/// Handler: POST /api/ask
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8000/api/ask \
///   -H 'content-type: application/json' \
///   -d '{"question":"Wie beantrage ich Urlaub?","collection":"rag_docs","backend":"gemini"}'
/// ```
#[instrument(name = "ask_route", skip_all, fields(collection = ?body.options.collection))]
pub async fn ask_question(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> AppResult<Response> {
    let answer = state
        .contextor
        .answer_with_context(&body.question, &body.options)
        .await?;

    let resp = match answer {
        Some(qa) => AskResponse::from(qa),
        None => {
            info!("no relevant documents");
            AskResponse::no_documents()
        }
    };
    Ok(ApiResponse::success(resp).into_response())
}

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::{
    core::{
        app_state::AppState,
        http::response_envelope::{ApiErrorDetail, ApiResponse},
    },
    error_handler::AppResult,
    routes::query::query_request::{QueryRequest, QueryResponse},
};

/// Handler: POST /api/query
///
/// Raw similarity search; a missing or empty collection yields no hits.
#[instrument(name = "query_route", skip_all, fields(collection = %p.collection))]
pub async fn query_collection(
    State(state): State<Arc<AppState>>,
    Json(p): Json<QueryRequest>,
) -> AppResult<Response> {
    let question = p.question.trim();
    if question.is_empty() {
        return Ok(ApiResponse::<()>::error(
            "BAD_REQUEST",
            "Field `question` must not be empty.",
            vec![ApiErrorDetail::field("question", "Provide a non-empty question.")],
        )
        .into_response_with_status(StatusCode::BAD_REQUEST));
    }

    let cfg = state.contextor.config();
    let k = p.k.unwrap_or(cfg.top_k);
    let threshold = p.score_threshold.unwrap_or(cfg.score_threshold);
    let hits = state
        .store()
        .retrieve(&p.collection, question, k, threshold)
        .await?;
    debug!(k, threshold, hits = hits.len(), "query served");

    Ok(ApiResponse::success(QueryResponse {
        question: question.to_string(),
        collection: p.collection,
        hits,
    })
    .into_response())
}

//! POST /api/documents/process/{category}: ingests files already on disk.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, category::Category, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
    routes::documents::documents_response::ProcessResponse,
};

/// Handler: POST /api/documents/process/{category}
///
/// Embeds every file of `{category}_docs/` not yet in collection `{category}_docs`.
#[instrument(name = "process_documents", skip(state))]
pub async fn process_documents(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> AppResult<Response> {
    let category: Category = category.parse().map_err(AppError::BadRequest)?;
    let collection = category.collection().ok_or_else(|| {
        AppError::BadRequest(format!("{category} documents are stored only, not embedded"))
    })?;

    let dir = state.config.docs_dir(category);
    let stats = state.store().process_documents(&dir, &collection).await?;
    info!(%collection, ?stats, "documents processed");

    let message = format!(
        "Processed {} new files ({} chunks), {} already present, {} failed",
        stats.files_processed, stats.chunks_added, stats.files_skipped, stats.files_failed
    );
    Ok(ApiResponse::success(ProcessResponse {
        category,
        collection,
        stats,
        message,
    })
    .into_response())
}

//! POST /api/vectorstores/rebuild: drops and re-ingests the rag and cag collections.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use rag_store::IngestStats;
use serde::Serialize;
use tracing::{info, instrument};

use crate::{
    core::{app_state::AppState, category::Category, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    /// Stats per collection name.
    pub collections: BTreeMap<String, IngestStats>,
    pub message: String,
}

/// Handler: POST /api/vectorstores/rebuild
///
/// Collections are rebuilt one after another; the first failure aborts.
#[instrument(name = "rebuild_vectorstores", skip(state))]
pub async fn rebuild_vectorstores(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let mut collections = BTreeMap::new();
    for category in [Category::Rag, Category::Cag] {
        let Some(name) = category.collection() else {
            continue;
        };
        let stats = state
            .store()
            .rebuild(&name, state.config.docs_dir(category))
            .await?;
        info!(collection = %name, chunks = stats.chunks_added, "collection rebuilt");
        collections.insert(name, stats);
    }

    let chunks: usize = collections.values().map(|s| s.chunks_added).sum();
    Ok(ApiResponse::success(RebuildResponse {
        message: format!("Rebuilt {} collections with {chunks} chunks", collections.len()),
        collections,
    })
    .into_response())
}

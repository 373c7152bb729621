use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::instrument;

use crate::{
    core::{app_state::AppState, http::response_envelope::ApiResponse},
    error_handler::AppResult,
};

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// Installed on the local Ollama instance.
    pub models: Vec<String>,
    pub default_local_model: String,
    pub cloud_model: String,
}

/// Handler: GET /api/models
#[instrument(name = "models_route", skip(state))]
pub async fn list_models(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let gateway = state.gateway();
    let models = gateway.list_local_models().await?;
    Ok(ApiResponse::success(ModelsResponse {
        models,
        default_local_model: gateway.default_local_model().to_string(),
        cloud_model: gateway.config().cloud.model.clone(),
    })
    .into_response())
}

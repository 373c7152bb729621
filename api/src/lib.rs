//! HTTP surface of the document QA backend.

pub mod core;
pub mod error_handler;
mod middleware_layer;
mod routes;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tokio::signal;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    core::app_state::AppState,
    error_handler::AppError,
    middleware_layer::json_extractor::{json_error_mapper, request_id},
    routes::{
        ask::ask_route::ask_question,
        chat::chat_route::chat,
        documents::{process_route::process_documents, upload_route::upload_documents},
        query::query_route::query_collection,
        system::{health_route::health, models_route::list_models},
        vectorstores::rebuild_route::rebuild_vectorstores,
    },
};

/// All routes with tracing, CORS, body limits and error mapping.
pub fn router(state: Arc<AppState>) -> Router {
    let max_upload = state.config.max_upload_size;
    Router::new()
        .route("/api/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/documents/upload/{category}", post(upload_documents))
        .route("/api/documents/process/{category}", post(process_documents))
        .route("/api/vectorstores/rebuild", post(rebuild_vectorstores))
        .route("/api/query", post(query_collection))
        .route("/api/ask", post(ask_question))
        .route("/api/chat", post(chat))
        .layer(middleware::from_fn(json_error_mapper))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

/// Builds the state from the environment and serves until Ctrl+C.
pub async fn start() -> Result<(), AppError> {
    let state = Arc::new(AppState::from_env()?);
    let address = state.config.address.clone();

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(AppError::Bind)?;
    info!(%address, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    info!("server stopped");
    Ok(())
}

/// Resolves when Ctrl+C is pressed.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

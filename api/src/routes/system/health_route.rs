//! GET /api/health: collections, document counts and backend probes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ai_llm_service::health_service::HealthStatus;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::{app_state::AppState, category::Category, http::response_envelope::ApiResponse};

#[derive(Debug, Serialize)]
pub struct CollectionHealth {
    pub exists: bool,
    /// `None` when missing or unreadable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `operational` when the local backend answers, else `degraded`.
    pub status: &'static str,
    /// Keyed by collection name.
    pub vector_stores: BTreeMap<String, CollectionHealth>,
    /// Files per category directory, keyed by category.
    pub document_counts: BTreeMap<String, usize>,
    pub backends: Vec<HealthStatus>,
    /// RFC 3339.
    pub last_update: String,
}

/// Handler: GET /api/health
///
/// Never fails; unreachable backends only degrade the status.
#[instrument(name = "health_route", skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let mut vector_stores = BTreeMap::new();
    let mut document_counts = BTreeMap::new();

    for category in [Category::Rag, Category::Cag, Category::Mapping] {
        let dir = state.config.docs_dir(category);
        document_counts.insert(category.to_string(), count_files(&dir).await);

        let Some(name) = category.collection() else {
            continue;
        };
        let entry = match state.store().record_count(&name).await {
            Ok(records) => CollectionHealth {
                exists: records.is_some(),
                records,
                error: None,
            },
            Err(e) => {
                warn!(collection = %name, error = %e, "collection unreadable");
                CollectionHealth {
                    exists: true,
                    records: None,
                    error: Some(e.to_string()),
                }
            }
        };
        vector_stores.insert(name, entry);
    }

    let backends = state.gateway().health_all().await;
    let local = &state.gateway().config().local;
    let local_ok = backends
        .iter()
        .any(|b| b.ok && b.provider == local.provider.as_str() && b.endpoint == local.endpoint);
    let status = if local_ok { "operational" } else { "degraded" };
    debug!(status, backends = backends.len(), "health collected");

    ApiResponse::success(HealthResponse {
        status,
        vector_stores,
        document_counts,
        backends,
        last_update: chrono::Utc::now().to_rfc3339(),
    })
    .into_response()
}

/// Regular files directly in `dir`; 0 when it does not exist.
async fn count_files(dir: &Path) -> usize {
    let Ok(mut rd) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut n = 0;
    while let Ok(Some(entry)) = rd.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_file()) {
            n += 1;
        }
    }
    n
}

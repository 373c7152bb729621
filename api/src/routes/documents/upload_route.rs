//! POST /api/documents/upload/{category}: stores files and embeds rag/cag uploads.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path as UrlPath, State},
    response::{IntoResponse, Response},
};
use rag_store::RagError;
use rag_store::loader::{extension, is_supported};
use tracing::{error, info, instrument, warn};

use crate::{
    core::{app_state::AppState, category::Category, http::response_envelope::ApiResponse},
    error_handler::{AppError, AppResult},
    routes::documents::documents_response::{FailedFile, UploadResponse, UploadedFile, size_mb},
};

/// Handler: POST /api/documents/upload/{category}
///
/// Every multipart field carrying a filename is treated as a document.
/// A file that fails to ingest is reported in `failed` and the upload goes
/// on with the next one; files that cannot be extracted are not kept.
///
/// # Example
/// ```bash
/// curl -X POST http://127.0.0.1:8000/api/documents/upload/rag \
///   -F 'files=@handbook.pdf' -F 'files=@faq.md'
/// ```
#[instrument(name = "upload_documents", skip(state, multipart))]
pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    UrlPath(category): UrlPath<String>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let category: Category = category.parse().map_err(AppError::BadRequest)?;
    let target_dir = state.config.docs_dir(category);
    tokio::fs::create_dir_all(&target_dir).await?;

    let mut processed = Vec::new();
    let mut skipped = Vec::new();
    let mut failed = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let Some(filename) = Path::new(&raw_name)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
        else {
            warn!(file = %raw_name, "unusable filename, skipping");
            skipped.push(raw_name);
            continue;
        };

        if !is_supported(Path::new(&filename)) {
            warn!(file = %filename, "unsupported file type, skipping");
            skipped.push(filename);
            continue;
        }

        let content = field.bytes().await?;
        if content.len() > state.config.max_file_size {
            return Err(AppError::PayloadTooLarge(format!(
                "File {filename} exceeds maximum size of {:.1}MB",
                state.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let path = target_dir.join(&filename);
        tokio::fs::write(&path, &content).await?;

        let chunks = match category.collection() {
            Some(collection) => match state.store().ingest_file(&path, &collection).await {
                Ok(res) => {
                    if res.already_present {
                        info!(file = %filename, %collection, "already in collection, not re-embedded");
                    }
                    res.chunks
                }
                Err(e) => {
                    error!(file = %filename, %collection, error = %e, "ingestion failed");
                    if matches!(e, RagError::Extraction { .. } | RagError::UnsupportedFormat(_)) {
                        if let Err(rm) = tokio::fs::remove_file(&path).await {
                            warn!(file = %filename, error = %rm, "cannot remove unreadable upload");
                        }
                    }
                    failed.push(FailedFile {
                        filename,
                        error: e.to_string(),
                    });
                    continue;
                }
            },
            None => 0,
        };
        info!(file = %filename, bytes = content.len(), chunks, "document stored");

        processed.push(UploadedFile {
            size: content.len(),
            size_mb: size_mb(content.len()),
            chunks,
            file_type: extension(&path)
                .map(|e| format!(".{e}"))
                .unwrap_or_default(),
            category,
            filename,
        });
    }

    let total_chunks = processed.iter().map(|f| f.chunks).sum();
    let total_size_mb = size_mb(processed.iter().map(|f| f.size).sum());
    let message = if failed.is_empty() {
        format!("Successfully processed {} files", processed.len())
    } else {
        format!(
            "Successfully processed {} files, {} failed",
            processed.len(),
            failed.len()
        )
    };
    info!(
        %category,
        files = processed.len(),
        skipped = skipped.len(),
        failed = failed.len(),
        total_chunks,
        "upload finished"
    );

    Ok(ApiResponse::success(UploadResponse {
        category,
        processed_files: processed,
        total_chunks,
        total_size_mb,
        skipped,
        failed,
        message,
    })
    .into_response())
}

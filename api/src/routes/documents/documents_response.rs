use rag_store::IngestStats;
use serde::Serialize;

use crate::core::category::Category;

/// One stored upload.
#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    /// Bytes.
    pub size: usize,
    pub size_mb: f64,
    /// Chunks embedded from this file; 0 for mapping files and repeats.
    pub chunks: usize,
    /// Extension with leading dot, e.g. `.pdf`.
    #[serde(rename = "type")]
    pub file_type: String,
    pub category: Category,
}

/// An upload that could not be ingested.
#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub category: Category,
    pub processed_files: Vec<UploadedFile>,
    pub total_chunks: usize,
    pub total_size_mb: f64,
    /// Filenames rejected for their extension.
    pub skipped: Vec<String>,
    /// Files that failed extraction or embedding; the rest of the upload
    /// still went through.
    pub failed: Vec<FailedFile>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub category: Category,
    pub collection: String,
    pub stats: IngestStats,
    pub message: String,
}

/// Megabytes rounded to two decimals.
pub fn size_mb(bytes: usize) -> f64 {
    (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

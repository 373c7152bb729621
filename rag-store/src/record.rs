//! Core data models used by the library.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text extracted from one file (or one CSV row).
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// Path the text came from; carried into every chunk for citation.
    pub source: String,
    pub text: String,
    /// Lower-case extension without the dot.
    pub file_type: String,
    pub byte_size: u64,
}

/// Bounded text segment, the unit of embedding and retrieval.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: String,
    /// Position within its source.
    pub index: usize,
    pub token_count: usize,
}

/// Record stored in a collection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RagRecord {
    pub id: String,
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// A single retrieval hit.
#[derive(Clone, Debug, Serialize)]
pub struct RagHit {
    pub score: f32,
    pub text: String,
    pub source: String,
    pub chunk_index: usize,
    pub collection: String,
}

impl RagHit {
    /// File name of the source, used as the citation label.
    pub fn source_name(&self) -> &str {
        std::path::Path::new(&self.source)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source)
    }
}

/// Query parameters for retrieval.
#[derive(Clone, Debug)]
pub struct RagQuery<'a> {
    pub text: &'a str,
    pub top_k: usize,
    pub score_threshold: f32,
}

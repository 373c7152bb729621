use rag_store::RagHit;
use serde::{Deserialize, Serialize};

/// Request payload for /api/query.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub collection: String,
    pub question: String,
    /// Defaults to `RAG_TOP_K`.
    #[serde(default)]
    pub k: Option<usize>,
    /// Defaults to `RAG_SCORE_THRESHOLD`.
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub collection: String,
    pub question: String,
    /// Best first.
    pub hits: Vec<RagHit>,
}

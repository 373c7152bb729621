use contextor::{AskOptions, QaAnswer};
use serde::{Deserialize, Serialize};

/// Request payload for /api/ask. Omitted options fall back to configuration.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(flatten)]
    pub options: AskOptions,
}

/// Response payload for /api/ask.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    /// `None` when no document passed the score threshold.
    pub answer: Option<String>,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt_tokens: usize,
    pub prompt_over_soft_limit: bool,
    pub context: Vec<CtxItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Chunk that was given to the model.
#[derive(Debug, Serialize)]
pub struct CtxItem {
    pub score: f32,
    pub source: String,
    pub collection: String,
    pub chunk_index: usize,
    pub preview: String,
}

pub const NO_DOCUMENTS_MESSAGE: &str = "No relevant documents found for this question.";

/// Characters of chunk text kept in [`CtxItem::preview`].
const PREVIEW_CHARS: usize = 300;

impl AskResponse {
    pub fn no_documents() -> Self {
        Self {
            answer: None,
            sources: Vec::new(),
            model: None,
            prompt_tokens: 0,
            prompt_over_soft_limit: false,
            context: Vec::new(),
            message: Some(NO_DOCUMENTS_MESSAGE.to_string()),
        }
    }
}

impl From<QaAnswer> for AskResponse {
    fn from(qa: QaAnswer) -> Self {
        let context = qa
            .hits
            .into_iter()
            .map(|h| CtxItem {
                score: h.score,
                preview: h.text.chars().take(PREVIEW_CHARS).collect(),
                source: h.source,
                collection: h.collection,
                chunk_index: h.chunk_index,
            })
            .collect();
        Self {
            answer: Some(qa.answer),
            sources: qa.sources,
            model: Some(qa.model),
            prompt_tokens: qa.prompt_tokens,
            prompt_over_soft_limit: qa.prompt_over_soft_limit,
            context,
            message: None,
        }
    }
}

//! Embedding providers.

use std::sync::Arc;

use ai_llm_service::{LlmGateway, backend::BoxFuture};

use crate::errors::RagError;

/// Provider interface for embedding generation.
///
/// The same provider must be used for ingestion and queries of a collection;
/// [`model_id`](Self::model_id) is recorded in the collection manifest and
/// checked on every open.
pub trait EmbeddingsProvider: Send + Sync {
    /// Identifier of the embedding space, e.g. `ollama:all-minilm`.
    fn model_id(&self) -> String;

    /// One vector per input, in input order.
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, RagError>>;

    /// Single-text convenience wrapper.
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, RagError>> {
        Box::pin(async move {
            let input = [text.to_string()];
            let mut out = self.embed_batch(&input).await?;
            out.pop()
                .ok_or_else(|| RagError::Embedding("provider returned no vector".into()))
        })
    }
}

/// Embeds through the gateway's embedding profile (Ollama or OpenAI).
#[derive(Clone)]
pub struct ServiceEmbedder {
    gateway: Arc<LlmGateway>,
}

impl ServiceEmbedder {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }
}

impl EmbeddingsProvider for ServiceEmbedder {
    fn model_id(&self) -> String {
        self.gateway.embedding_model()
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, RagError>> {
        Box::pin(async move { Ok(self.gateway.embed_batch(texts).await?) })
    }
}

/// Deterministic bag-of-words embedder for tests: words are hashed into a
/// fixed number of buckets and the vector is L2-normalized.
#[cfg(test)]
pub(crate) struct HashEmbedder {
    pub dim: usize,
    pub model: &'static str,
}

#[cfg(test)]
impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dim: 32,
            model: "test:hash",
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for w in text.split_whitespace() {
            let w = w.to_lowercase();
            let h = w
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
            v[(h % self.dim as u64) as usize] += 1.0;
        }
        let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if n > 0.0 {
            v.iter_mut().for_each(|x| *x /= n);
        }
        v
    }
}

#[cfg(test)]
impl EmbeddingsProvider for HashEmbedder {
    fn model_id(&self) -> String {
        self.model.to_string()
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, RagError>> {
        Box::pin(async move { Ok(texts.iter().map(|t| self.vector(t)).collect()) })
    }
}

//! Token counting shared by the chunker, the batcher and prompt checks.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::errors::RagError;

/// Counts tokens in a text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// `cl100k_base` BPE counter.
#[derive(Clone)]
pub struct TiktokenCounter {
    bpe: Arc<CoreBPE>,
}

impl TiktokenCounter {
    /// Loads the `cl100k_base` encoding.
    pub fn cl100k() -> Result<Self, RagError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RagError::Config(format!("failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TiktokenCounter(cl100k_base)")
    }
}

/// Deterministic counter for tests: one token per whitespace-separated word.
#[cfg(test)]
pub(crate) struct WordCounter;

#[cfg(test)]
impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

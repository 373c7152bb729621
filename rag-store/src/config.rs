//! Runtime configuration for ingestion and retrieval.

use std::{path::PathBuf, str::FromStr};

use crate::errors::RagError;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_MAX_TOKENS_PER_BATCH: usize = 200_000;
pub const DEFAULT_BULK_CREATE_THRESHOLD: usize = 100;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.1;

/// Configuration for ingestion and retrieval.
#[derive(Clone, Debug)]
pub struct RagConfig {
    /// Directory holding every `{name}_vectorstore/` collection.
    pub root: PathBuf,
    /// Chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Token budget of one embedding batch.
    pub max_tokens_per_batch: usize,
    /// A new collection with more chunks than this is created from the
    /// first batch and extended batch by batch.
    pub bulk_create_threshold: usize,
    pub default_top_k: usize,
    pub default_score_threshold: f32,
}

impl RagConfig {
    /// Defaults rooted at `root`.
    pub fn new_default(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_tokens_per_batch: DEFAULT_MAX_TOKENS_PER_BATCH,
            bulk_create_threshold: DEFAULT_BULK_CREATE_THRESHOLD,
            default_top_k: DEFAULT_TOP_K,
            default_score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    /// Reads `CHUNK_SIZE`, `CHUNK_OVERLAP`, `MAX_TOKENS_PER_BATCH`,
    /// `RAG_TOP_K` and `RAG_SCORE_THRESHOLD`, then validates.
    pub fn from_env(root: impl Into<PathBuf>) -> Result<Self, RagError> {
        let d = Self::new_default(root);
        let cfg = Self {
            chunk_size: env_parse("CHUNK_SIZE", d.chunk_size)?,
            chunk_overlap: env_parse("CHUNK_OVERLAP", d.chunk_overlap)?,
            max_tokens_per_batch: env_parse("MAX_TOKENS_PER_BATCH", d.max_tokens_per_batch)?,
            default_top_k: env_parse("RAG_TOP_K", d.default_top_k)?,
            default_score_threshold: env_parse("RAG_SCORE_THRESHOLD", d.default_score_threshold)?,
            ..d
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates config values.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be > 0".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_tokens_per_batch == 0 {
            return Err(RagError::Config("max_tokens_per_batch must be > 0".into()));
        }
        if self.default_top_k == 0 {
            return Err(RagError::Config("default_top_k must be > 0".into()));
        }
        if !self.default_score_threshold.is_finite() {
            return Err(RagError::Config("default_score_threshold must be finite".into()));
        }
        Ok(())
    }

    /// Directory of the collection `name`.
    pub fn collection_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}_vectorstore"))
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, RagError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| RagError::Config(format!("{name} is not a valid number: {v}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RagConfig::new_default("/tmp/x");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.collection_dir("rag_docs"), PathBuf::from("/tmp/x/rag_docs_vectorstore"));
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let mut cfg = RagConfig::new_default(".");
        cfg.chunk_overlap = cfg.chunk_size;
        assert!(matches!(cfg.validate(), Err(RagError::Config(_))));
    }
}

//! Document ingestion and similarity retrieval over file-backed collections.
//!
//! Pipeline: [`loader`] extracts text, [`chunker`] splits it, [`batcher`]
//! groups chunks under a token budget, the [`EmbeddingsProvider`] embeds each
//! batch and the [`VectorStoreManager`] appends the records to a named
//! collection under `{root}/{name}_vectorstore/`.
//!
//! [`RagStore`] wires these together and is the entry point for application code.

pub mod batcher;
pub mod chunker;
pub mod collection;
mod config;
mod embed;
mod errors;
pub mod ingest;
mod io_jsonl;
pub mod loader;
pub mod manager;
pub mod progress;
mod record;
pub mod retrieve;
pub mod tokens;

pub use config::{DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP_K, RagConfig};
pub use embed::{EmbeddingsProvider, ServiceEmbedder};
pub use errors::RagError;
pub use ingest::{FileIngest, IngestStats};
pub use manager::{IngestReport, VectorStoreManager};
pub use progress::{BarProgress, IngestProgress, NoopProgress};
pub use record::{Chunk, Document, RagHit, RagQuery, RagRecord};
pub use retrieve::{CombinedRetriever, DEFAULT_COMBINED, MAX_CONTEXT_DOCS, RetrieverPart};
pub use tokens::{TiktokenCounter, TokenCounter};

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::trace;

/// Facade over the manager, the token counter and the ingestion/retrieval
/// functions.
pub struct RagStore {
    manager: VectorStoreManager,
    counter: Arc<dyn TokenCounter>,
}

impl RagStore {
    /// # Errors
    /// `RagError::Config` when `cfg` does not validate.
    pub fn new(
        cfg: RagConfig,
        embedder: Arc<dyn EmbeddingsProvider>,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, RagError> {
        cfg.validate()?;
        trace!(root = %cfg.root.display(), "RagStore::new");
        Ok(Self {
            manager: VectorStoreManager::new(cfg, embedder),
            counter,
        })
    }

    pub fn config(&self) -> &RagConfig {
        self.manager.config()
    }

    pub fn manager(&self) -> &VectorStoreManager {
        &self.manager
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Ingests every new supported file of `source_dir` into `name`.
    pub async fn process_documents(
        &self,
        source_dir: impl AsRef<Path>,
        name: &str,
    ) -> Result<IngestStats, RagError> {
        self.process_documents_with(source_dir, name, &NoopProgress).await
    }

    pub async fn process_documents_with(
        &self,
        source_dir: impl AsRef<Path>,
        name: &str,
        progress: &dyn IngestProgress,
    ) -> Result<IngestStats, RagError> {
        ingest::process_documents(
            &self.manager,
            self.counter.as_ref(),
            source_dir.as_ref(),
            name,
            progress,
        )
        .await
    }

    pub async fn ingest_file(
        &self,
        path: impl AsRef<Path>,
        name: &str,
    ) -> Result<FileIngest, RagError> {
        ingest::ingest_file(&self.manager, self.counter.as_ref(), path.as_ref(), name).await
    }

    /// Deletes `name` and re-ingests `source_dir`.
    pub async fn rebuild(
        &self,
        name: &str,
        source_dir: impl AsRef<Path>,
    ) -> Result<IngestStats, RagError> {
        ingest::rebuild(
            &self.manager,
            self.counter.as_ref(),
            source_dir.as_ref(),
            name,
            &NoopProgress,
        )
        .await
    }

    pub async fn retrieve(
        &self,
        name: &str,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<RagHit>, RagError> {
        let q = RagQuery {
            text: query,
            top_k: k,
            score_threshold: threshold,
        };
        retrieve::retrieve(&self.manager, name, &q).await
    }

    pub async fn retrieve_combined(
        &self,
        retriever: &CombinedRetriever,
        query: &str,
    ) -> Result<Vec<RagHit>, RagError> {
        retriever.retrieve(&self.manager, query).await
    }

    pub fn exists(&self, name: &str) -> bool {
        self.manager.exists(name)
    }

    pub async fn existing_sources(&self, name: &str) -> BTreeSet<String> {
        self.manager.existing_sources(name).await
    }

    pub async fn record_count(&self, name: &str) -> Result<Option<usize>, RagError> {
        self.manager.record_count(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<bool, RagError> {
        self.manager.delete(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::tokens::WordCounter;

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = RagConfig::new_default("/tmp");
        cfg.chunk_overlap = cfg.chunk_size;
        assert!(matches!(
            RagStore::new(cfg, Arc::new(HashEmbedder::new()), Arc::new(WordCounter)),
            Err(RagError::Config(_))
        ));
    }

    #[tokio::test]
    async fn upload_then_ask_round() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("rag_docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("reise.txt"), "reisekosten abrechnung innerhalb von vier wochen").unwrap();
        std::fs::write(docs.join("it.md"), "drucker im zweiten stock").unwrap();

        let store = RagStore::new(
            RagConfig::new_default(tmp.path()),
            Arc::new(HashEmbedder::new()),
            Arc::new(WordCounter),
        )
        .unwrap();

        let stats = store.process_documents(&docs, "rag_docs").await.unwrap();
        assert_eq!(stats.files_processed, 2);

        let hits = store.retrieve("rag_docs", "reisekosten abrechnung", 5, 0.1).await.unwrap();
        assert_eq!(hits[0].source_name(), "reise.txt");

        let combined = CombinedRetriever::with_defaults(5, 0.1);
        let all = store.retrieve_combined(&combined, "reisekosten").await.unwrap();
        assert!(all.iter().all(|h| h.collection == "rag_docs"));
    }
}

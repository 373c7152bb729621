//! Vector store manager: creates, extends, opens and deletes collections.
//!
//! Every mutation of a collection runs under a per-name async mutex, so a
//! collection has at most one writer at a time. Opened collections are cached
//! and replaced after every successful mutation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::batcher::batch;
use crate::collection::{Collection, read_manifest};
use crate::config::RagConfig;
use crate::embed::EmbeddingsProvider;
use crate::errors::RagError;
use crate::record::{Chunk, RagRecord};

/// Outcome of [`VectorStoreManager::create_or_update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub chunks_added: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    /// Chunks dropped because their source was already stored.
    pub chunks_duplicate: usize,
    /// The collection did not exist before this call.
    pub created: bool,
}

pub struct VectorStoreManager {
    cfg: RagConfig,
    embedder: Arc<dyn EmbeddingsProvider>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cache: RwLock<HashMap<String, Arc<Collection>>>,
}

impl VectorStoreManager {
    pub fn new(cfg: RagConfig, embedder: Arc<dyn EmbeddingsProvider>) -> Self {
        Self {
            cfg,
            embedder,
            locks: Mutex::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.cfg
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingsProvider> {
        &self.embedder
    }

    /// Directory presence is the existence signal.
    pub fn exists(&self, name: &str) -> bool {
        self.cfg.collection_dir(name).is_dir()
    }

    /// Embeds `chunks` and stores them in `name`, creating the collection
    /// when needed.
    ///
    /// Chunks whose source is already stored are dropped before embedding;
    /// the check and the append share the per-name lock, so a source is
    /// never embedded twice even when callers race.
    ///
    /// A new collection with more than `bulk_create_threshold` chunks is
    /// created from the first batch and extended one batch at a time; a
    /// smaller one is created from a single embedding call. Every batch is
    /// persisted before the next starts. After creation, a failing batch is
    /// logged and skipped.
    ///
    /// # Errors
    /// - [`RagError::CollectionLoad`] / [`RagError::EmbeddingMismatch`] when the
    ///   existing collection cannot be opened with the current embedder
    /// - [`RagError::BatchIngestion`] when the creating batch fails
    #[instrument(skip_all, fields(collection = name, chunks = chunks.len()))]
    pub async fn create_or_update(
        &self,
        chunks: Vec<Chunk>,
        name: &str,
    ) -> Result<IngestReport, RagError> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        let mut report = IngestReport::default();
        if chunks.is_empty() {
            return Ok(report);
        }

        let existing = self.load(name).await?;
        let chunks = match &existing {
            Some(c) => {
                let known = c.sources();
                let before = chunks.len();
                let fresh: Vec<Chunk> = chunks
                    .into_iter()
                    .filter(|ch| !known.contains(&ch.source))
                    .collect();
                report.chunks_duplicate = before - fresh.len();
                if report.chunks_duplicate > 0 {
                    info!(dropped = report.chunks_duplicate, "sources already stored");
                }
                fresh
            }
            None => chunks,
        };
        if chunks.is_empty() {
            return Ok(report);
        }

        let total_chunks = chunks.len();
        let plan = batch(chunks, self.cfg.max_tokens_per_batch);
        report.batches_total = plan.len();
        let mut batches = plan.batches.into_iter().enumerate();

        let mut collection = match existing {
            Some(c) => c,
            None => {
                report.created = true;
                let first: Vec<Chunk> = if total_chunks > self.cfg.bulk_create_threshold {
                    info!(
                        total_chunks,
                        batches = report.batches_total,
                        "large collection, creating from first batch"
                    );
                    batches.next().map(|(_, b)| b).unwrap_or_default()
                } else {
                    report.batches_total = 1;
                    batches.by_ref().flat_map(|(_, b)| b).collect()
                };
                let c = self
                    .create_from(name, &first)
                    .await
                    .map_err(|e| RagError::BatchIngestion {
                        name: name.to_string(),
                        batch: 1,
                        reason: e.to_string(),
                    })?;
                report.chunks_added += first.len();
                info!(records = c.len(), "collection created");
                c
            }
        };

        for (i, chunks) in batches {
            let n = chunks.len();
            let (c, res) = self.append_batch(collection, &chunks).await?;
            collection = c;
            match res {
                Ok(()) => {
                    report.chunks_added += n;
                    debug!(batch = i + 1, chunks = n, "batch stored");
                }
                Err(e) => {
                    report.batches_failed += 1;
                    let err = RagError::BatchIngestion {
                        name: name.to_string(),
                        batch: i + 1,
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "skipping batch");
                }
            }
        }

        info!(
            added = report.chunks_added,
            failed = report.batches_failed,
            total = collection.len(),
            "ingestion finished"
        );
        self.cache
            .write()
            .await
            .insert(name.to_string(), Arc::new(collection));
        Ok(report)
    }

    /// Opened collection, `None` when it does not exist.
    pub async fn collection(&self, name: &str) -> Result<Option<Arc<Collection>>, RagError> {
        if let Some(c) = self.cache.read().await.get(name) {
            return Ok(Some(c.clone()));
        }
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;
        if let Some(c) = self.cache.read().await.get(name) {
            return Ok(Some(c.clone()));
        }
        let Some(c) = self.load(name).await? else {
            return Ok(None);
        };
        let c = Arc::new(c);
        self.cache.write().await.insert(name.to_string(), c.clone());
        Ok(Some(c))
    }

    /// Source paths already stored in `name`. Fail-soft: a collection that
    /// cannot be loaded yields an empty set and a warning.
    pub async fn existing_sources(&self, name: &str) -> BTreeSet<String> {
        match self.collection(name).await {
            Ok(Some(c)) => c.sources(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(collection = name, error = %e, "cannot read existing sources");
                BTreeSet::new()
            }
        }
    }

    /// Record count from the manifest; `None` when the collection is absent.
    pub async fn record_count(&self, name: &str) -> Result<Option<usize>, RagError> {
        if let Some(c) = self.cache.read().await.get(name) {
            return Ok(Some(c.len()));
        }
        let dir = self.cfg.collection_dir(name);
        if !dir.is_dir() {
            return Ok(None);
        }
        let manifest = read_manifest(&dir).map_err(|e| RagError::CollectionLoad {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(manifest.record_count))
    }

    /// Removes the collection directory. Returns whether it existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<bool, RagError> {
        let lock = self.lock_for(name).await;
        let _guard = lock.lock().await;

        self.cache.write().await.remove(name);
        let dir = self.cfg.collection_dir(name);
        if !dir.is_dir() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir).await?;
        info!(dir = %dir.display(), "collection deleted");
        Ok(true)
    }

    async fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reads the collection from disk and checks the embedding model.
    async fn load(&self, name: &str) -> Result<Option<Collection>, RagError> {
        let dir = self.cfg.collection_dir(name);
        if !dir.is_dir() {
            return Ok(None);
        }
        let owned = name.to_string();
        let c = tokio::task::spawn_blocking(move || Collection::open(&owned, dir)).await??;
        c.ensure_model(&self.embedder.model_id())?;
        debug!(collection = name, records = c.len(), "collection loaded");
        Ok(Some(c))
    }

    async fn create_from(&self, name: &str, chunks: &[Chunk]) -> Result<Collection, RagError> {
        let records = self.embed_records(chunks).await?;
        let dim = records
            .first()
            .map(|r| r.embedding.len())
            .ok_or_else(|| RagError::Embedding("no vectors to create a collection from".into()))?;
        let dir = self.cfg.collection_dir(name);
        let model = self.embedder.model_id();
        let owned = name.to_string();

        tokio::task::spawn_blocking(move || {
            let mut c = Collection::create(&owned, &dir, &model, dim)?;
            if let Err(e) = c.append(records) {
                // Do not leave an empty collection behind.
                let _ = std::fs::remove_dir_all(&dir);
                return Err(e);
            }
            Ok(c)
        })
        .await?
    }

    /// Embeds and appends one batch. The collection is handed back in every
    /// case; the inner result carries the batch outcome.
    async fn append_batch(
        &self,
        mut collection: Collection,
        chunks: &[Chunk],
    ) -> Result<(Collection, Result<(), RagError>), RagError> {
        let records = match self.embed_records(chunks).await {
            Ok(r) => r,
            Err(e) => return Ok((collection, Err(e))),
        };
        Ok(tokio::task::spawn_blocking(move || {
            let res = collection.append(records);
            (collection, res)
        })
        .await?)
    }

    async fn embed_records(&self, chunks: &[Chunk]) -> Result<Vec<RagRecord>, RagError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }
        Ok(chunks
            .iter()
            .zip(vectors)
            .map(|(c, embedding)| RagRecord {
                id: c.id.clone(),
                text: c.text.clone(),
                source: c.source.clone(),
                chunk_index: c.index,
                embedding,
                extra: BTreeMap::from([("token_count".to_string(), c.token_count.into())]),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ai_llm_service::backend::BoxFuture;

    use super::*;
    use crate::embed::HashEmbedder;

    fn chunk(source: &str, i: usize, text: &str, tokens: usize) -> Chunk {
        Chunk {
            id: format!("{source}-{i}"),
            text: text.into(),
            source: source.into(),
            index: i,
            token_count: tokens,
        }
    }

    fn manager(root: &std::path::Path, embedder: Arc<dyn EmbeddingsProvider>) -> VectorStoreManager {
        let mut cfg = RagConfig::new_default(root);
        cfg.max_tokens_per_batch = 10;
        cfg.bulk_create_threshold = 3;
        VectorStoreManager::new(cfg, embedder)
    }

    /// Fails every call whose 1-based number is in `fail_on`.
    struct FlakyEmbedder {
        inner: HashEmbedder,
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    impl EmbeddingsProvider for FlakyEmbedder {
        fn model_id(&self) -> String {
            self.inner.model_id()
        }

        fn embed_batch<'a>(
            &'a self,
            texts: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<Vec<f32>>, RagError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&n) {
                return Box::pin(async move { Err(RagError::Embedding(format!("call {n} failed"))) });
            }
            self.inner.embed_batch(texts)
        }
    }

    #[tokio::test]
    async fn small_new_collection_is_created_in_one_call() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));

        let chunks = vec![chunk("a.txt", 0, "alpha", 6), chunk("a.txt", 1, "beta", 6)];
        let report = m.create_or_update(chunks, "rag_docs").await.unwrap();

        assert_eq!(
            report,
            IngestReport {
                chunks_added: 2,
                batches_total: 1,
                batches_failed: 0,
                chunks_duplicate: 0,
                created: true,
            }
        );
        assert!(m.exists("rag_docs"));
        assert_eq!(m.record_count("rag_docs").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn large_new_collection_is_built_batch_by_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));

        let chunks: Vec<_> = (0..5).map(|i| chunk("big.md", i, &format!("word{i}"), 6)).collect();
        let report = m.create_or_update(chunks, "cag_docs").await.unwrap();

        assert_eq!(report.batches_total, 5);
        assert_eq!(report.chunks_added, 5);
        assert!(report.created);

        let c = m.collection("cag_docs").await.unwrap().unwrap();
        assert_eq!(c.len(), 5);
    }

    #[tokio::test]
    async fn failing_batch_is_skipped_and_the_rest_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(),
            calls: AtomicUsize::new(0),
            fail_on: vec![2],
        });
        let m = manager(tmp.path(), embedder);

        let chunks: Vec<_> = (0..4).map(|i| chunk("k.txt", i, &format!("w{i}"), 6)).collect();
        let report = m.create_or_update(chunks, "rag_docs").await.unwrap();

        assert_eq!(report.batches_total, 4);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.chunks_added, 3);

        let fresh = manager(tmp.path(), Arc::new(HashEmbedder::new()));
        assert_eq!(fresh.collection("rag_docs").await.unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failing_first_batch_leaves_no_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(),
            calls: AtomicUsize::new(0),
            fail_on: vec![1],
        });
        let m = manager(tmp.path(), embedder);

        let err = m
            .create_or_update(vec![chunk("a", 0, "x", 1)], "rag_docs")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::BatchIngestion { batch: 1, .. }));
        assert!(!m.exists("rag_docs"));
    }

    #[tokio::test]
    async fn updates_append_to_existing_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));

        m.create_or_update(vec![chunk("a.txt", 0, "alpha", 1)], "rag_docs").await.unwrap();
        let report = m
            .create_or_update(vec![chunk("b.txt", 0, "beta", 1)], "rag_docs")
            .await
            .unwrap();

        assert!(!report.created);
        assert_eq!(
            m.existing_sources("rag_docs").await.into_iter().collect::<Vec<_>>(),
            vec!["a.txt", "b.txt"]
        );
    }

    #[tokio::test]
    async fn stored_sources_are_not_embedded_again() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));
        m.create_or_update(vec![chunk("a.txt", 0, "alpha", 1)], "rag_docs").await.unwrap();

        let report = m
            .create_or_update(
                vec![chunk("a.txt", 0, "alpha", 1), chunk("b.txt", 0, "beta", 1)],
                "rag_docs",
            )
            .await
            .unwrap();
        assert_eq!(report.chunks_duplicate, 1);
        assert_eq!(report.chunks_added, 1);
        assert_eq!(m.record_count("rag_docs").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn other_embedding_model_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));
        m.create_or_update(vec![chunk("a", 0, "x", 1)], "rag_docs").await.unwrap();

        let other = HashEmbedder { dim: 32, model: "test:other" };
        let m2 = manager(tmp.path(), Arc::new(other));
        assert!(matches!(
            m2.collection("rag_docs").await,
            Err(RagError::EmbeddingMismatch { .. })
        ));
        assert!(m2.existing_sources("rag_docs").await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_collection_gives_empty_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));
        std::fs::create_dir_all(tmp.path().join("rag_docs_vectorstore")).unwrap();

        assert!(m.exists("rag_docs"));
        assert!(m.existing_sources("rag_docs").await.is_empty());
        assert!(matches!(
            m.create_or_update(vec![chunk("a", 0, "x", 1)], "rag_docs").await,
            Err(RagError::CollectionLoad { .. })
        ));
    }

    #[tokio::test]
    async fn delete_removes_directory_and_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));
        m.create_or_update(vec![chunk("a", 0, "x", 1)], "rag_docs").await.unwrap();

        assert!(m.delete("rag_docs").await.unwrap());
        assert!(!m.exists("rag_docs"));
        assert!(m.collection("rag_docs").await.unwrap().is_none());
        assert_eq!(m.record_count("rag_docs").await.unwrap(), None);
        assert!(!m.delete("rag_docs").await.unwrap());
    }

    #[tokio::test]
    async fn empty_input_changes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path(), Arc::new(HashEmbedder::new()));
        let report = m.create_or_update(Vec::new(), "rag_docs").await.unwrap();
        assert_eq!(report, IngestReport::default());
        assert!(!m.exists("rag_docs"));
    }
}

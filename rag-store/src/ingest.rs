//! Directory and single-file ingestion: scan, dedup, load, chunk, store.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::chunker::split;
use crate::errors::RagError;
use crate::loader::{is_supported, load_async};
use crate::manager::{IngestReport, VectorStoreManager};
use crate::progress::IngestProgress;
use crate::record::Chunk;
use crate::tokens::TokenCounter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub files_found: usize,
    /// Already present in the collection.
    pub files_skipped: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_added: usize,
    pub batches_used: usize,
    pub batches_failed: usize,
}

/// Result of [`ingest_file`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FileIngest {
    /// Chunks produced from the file.
    pub chunks: usize,
    /// The source was already stored; nothing was embedded.
    pub already_present: bool,
    pub report: IngestReport,
}

/// Supported files directly inside `dir` (no recursion), sorted by path.
pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, RagError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| RagError::Io(e.into()))?;
        if entry.file_type().is_file() && is_supported(entry.path()) {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// Ingests every new supported file in `source_dir` into `name`.
///
/// Files whose path is already a source in the collection are skipped.
/// A file that fails to load is logged and counted, never fatal.
#[instrument(skip(manager, counter, progress), fields(dir = %source_dir.display()))]
pub async fn process_documents(
    manager: &VectorStoreManager,
    counter: &dyn TokenCounter,
    source_dir: &Path,
    name: &str,
    progress: &dyn IngestProgress,
) -> Result<IngestStats, RagError> {
    let mut stats = IngestStats::default();
    if !source_dir.is_dir() {
        warn!("source directory does not exist");
        return Ok(stats);
    }

    let files = scan_dir(source_dir)?;
    stats.files_found = files.len();

    let existing = manager.existing_sources(name).await;
    let (known, new): (Vec<PathBuf>, Vec<PathBuf>) = files
        .into_iter()
        .partition(|p| existing.contains(&*p.to_string_lossy()));
    stats.files_skipped = known.len();
    for p in &known {
        debug!(file = %p.display(), "already ingested, skipping");
    }
    if new.is_empty() {
        info!(found = stats.files_found, "no new documents");
        return Ok(stats);
    }

    progress.start(new.len() as u64);
    let mut chunks: Vec<Chunk> = Vec::new();
    for path in &new {
        match load_and_split(manager, counter, path).await {
            Ok(mut c) => {
                stats.files_processed += 1;
                progress.file_done(path, c.len());
                chunks.append(&mut c);
            }
            Err(e) => {
                stats.files_failed += 1;
                progress.file_done(path, 0);
                warn!(file = %path.display(), error = %e, "failed to load document");
            }
        }
    }

    if !chunks.is_empty() {
        progress.storing(chunks.len());
        let report = manager.create_or_update(chunks, name).await?;
        stats.chunks_added = report.chunks_added;
        stats.batches_used = report.batches_total;
        stats.batches_failed = report.batches_failed;
    }

    progress.finish("done");
    info!(
        processed = stats.files_processed,
        skipped = stats.files_skipped,
        failed = stats.files_failed,
        chunks = stats.chunks_added,
        "directory ingested"
    );
    Ok(stats)
}

/// Ingests one file into `name` unless its path is already stored.
///
/// # Errors
/// Load and chunking errors propagate, unlike in [`process_documents`].
#[instrument(skip(manager, counter), fields(file = %path.display()))]
pub async fn ingest_file(
    manager: &VectorStoreManager,
    counter: &dyn TokenCounter,
    path: &Path,
    name: &str,
) -> Result<FileIngest, RagError> {
    if manager
        .existing_sources(name)
        .await
        .contains(&*path.to_string_lossy())
    {
        info!("already ingested");
        return Ok(FileIngest {
            already_present: true,
            ..FileIngest::default()
        });
    }

    let chunks = load_and_split(manager, counter, path).await?;
    let n = chunks.len();
    let report = manager.create_or_update(chunks, name).await?;
    // Another writer may have stored the same file since the check above.
    let already_present = n > 0 && report.chunks_duplicate == n;
    if already_present {
        info!("ingested concurrently by another request");
    }
    Ok(FileIngest {
        chunks: n,
        already_present,
        report,
    })
}

/// Deletes `name` and ingests `source_dir` from scratch.
#[instrument(skip(manager, counter, progress), fields(dir = %source_dir.display()))]
pub async fn rebuild(
    manager: &VectorStoreManager,
    counter: &dyn TokenCounter,
    source_dir: &Path,
    name: &str,
    progress: &dyn IngestProgress,
) -> Result<IngestStats, RagError> {
    if manager.delete(name).await? {
        info!("old collection removed");
    }
    process_documents(manager, counter, source_dir, name, progress).await
}

async fn load_and_split(
    manager: &VectorStoreManager,
    counter: &dyn TokenCounter,
    path: &Path,
) -> Result<Vec<Chunk>, RagError> {
    let docs = load_async(path).await?;
    let cfg = manager.config();
    split(&docs, cfg.chunk_size, cfg.chunk_overlap, counter)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RagConfig;
    use crate::embed::HashEmbedder;
    use crate::progress::NoopProgress;
    use crate::tokens::WordCounter;

    fn manager(root: &Path) -> VectorStoreManager {
        VectorStoreManager::new(RagConfig::new_default(root), Arc::new(HashEmbedder::new()))
    }

    #[test]
    fn scan_is_flat_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.md"), "b").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("logo.png"), "x").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/c.txt"), "c").unwrap();

        let names: Vec<_> = scan_dir(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }

    #[tokio::test]
    async fn second_run_skips_known_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("rag_docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "erster text").unwrap();
        std::fs::write(docs.join("b.md"), "zweiter text").unwrap();
        let m = manager(tmp.path());

        let first = process_documents(&m, &WordCounter, &docs, "rag_docs", &NoopProgress)
            .await
            .unwrap();
        assert_eq!(first.files_found, 2);
        assert_eq!(first.files_processed, 2);
        assert_eq!(first.chunks_added, 2);

        let second = process_documents(&m, &WordCounter, &docs, "rag_docs", &NoopProgress)
            .await
            .unwrap();
        assert_eq!(second.files_skipped, 2);
        assert_eq!(second.files_processed, 0);
        assert_eq!(second.chunks_added, 0);
        assert_eq!(m.record_count("rag_docs").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn broken_file_is_counted_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("cag_docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("ok.txt"), "inhalt").unwrap();
        std::fs::write(docs.join("broken.docx"), "not a zip").unwrap();
        let m = manager(tmp.path());

        let stats = process_documents(&m, &WordCounter, &docs, "cag_docs", &NoopProgress)
            .await
            .unwrap();
        assert_eq!(stats.files_failed, 1);
        assert_eq!(stats.files_processed, 1);
        assert_eq!(stats.chunks_added, 1);
    }

    #[tokio::test]
    async fn missing_directory_is_empty_run() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manager(tmp.path());
        let stats = process_documents(&m, &WordCounter, &tmp.path().join("nope"), "x", &NoopProgress)
            .await
            .unwrap();
        assert_eq!(stats, IngestStats::default());
    }

    #[tokio::test]
    async fn single_file_is_not_ingested_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("memo.txt");
        std::fs::write(&p, "kurzer text").unwrap();
        let m = manager(tmp.path());

        let first = ingest_file(&m, &WordCounter, &p, "rag_docs").await.unwrap();
        assert_eq!(first.chunks, 1);
        assert!(first.report.created);

        let again = ingest_file(&m, &WordCounter, &p, "rag_docs").await.unwrap();
        assert!(again.already_present);
        assert_eq!(m.record_count("rag_docs").await.unwrap(), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingests_of_one_file_store_it_once() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("memo.txt");
        std::fs::write(&p, "kurzer text").unwrap();
        let m = Arc::new(manager(tmp.path()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                let p = p.clone();
                tokio::spawn(async move { ingest_file(&m, &WordCounter, &p, "rag_docs").await })
            })
            .collect();
        let mut fresh = 0;
        for t in tasks {
            if !t.await.unwrap().unwrap().already_present {
                fresh += 1;
            }
        }

        assert_eq!(fresh, 1);
        assert_eq!(m.record_count("rag_docs").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn rebuild_starts_from_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("rag_docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "eins").unwrap();
        let m = manager(tmp.path());
        std::fs::create_dir_all(tmp.path().join("rag_docs_vectorstore")).unwrap();

        let stats = rebuild(&m, &WordCounter, &docs, "rag_docs", &NoopProgress).await.unwrap();
        assert_eq!(stats.chunks_added, 1);
        assert_eq!(m.record_count("rag_docs").await.unwrap(), Some(1));
    }
}

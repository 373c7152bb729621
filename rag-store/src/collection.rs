//! File-backed vector collection.
//!
//! Layout of `{root}/{name}_vectorstore/`:
//! - `manifest.json`: embedding model, dimension, timestamps, record count
//! - `records.jsonl`: one [`RagRecord`] per line, append-only

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::RagError;
use crate::io_jsonl::{append_records, read_all_records, write_json_atomic};
use crate::record::RagRecord;

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const RECORDS_FILE: &str = "records.jsonl";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dim: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub record_count: usize,
}

/// An opened collection held in memory.
#[derive(Debug)]
pub struct Collection {
    name: String,
    dir: PathBuf,
    manifest: Manifest,
    records: Vec<RagRecord>,
}

impl Collection {
    /// Creates the directory, an empty record file and the manifest.
    pub fn create(
        name: &str,
        dir: impl Into<PathBuf>,
        embedding_model: &str,
        dim: usize,
    ) -> Result<Self, RagError> {
        if dim == 0 {
            return Err(RagError::Config("embedding dimension must be > 0".into()));
        }
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        std::fs::File::create(dir.join(RECORDS_FILE))?;

        let now = Utc::now();
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dim,
            created_at: now,
            updated_at: now,
            record_count: 0,
        };
        write_json_atomic(dir.join(MANIFEST_FILE), &manifest)?;
        debug!(collection = name, dim, model = embedding_model, "collection created");

        Ok(Self {
            name: name.to_string(),
            dir,
            manifest,
            records: Vec::new(),
        })
    }

    /// Loads manifest and records. Any failure is a [`RagError::CollectionLoad`].
    pub fn open(name: &str, dir: impl Into<PathBuf>) -> Result<Self, RagError> {
        let dir = dir.into();
        let load_err = |reason: String| RagError::CollectionLoad {
            name: name.to_string(),
            reason,
        };

        let manifest = read_manifest(&dir).map_err(|e| load_err(e.to_string()))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(load_err(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }
        let records =
            read_all_records(dir.join(RECORDS_FILE)).map_err(|e| load_err(e.to_string()))?;
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != manifest.dim) {
            return Err(load_err(format!(
                "record {} has dimension {}, manifest says {}",
                bad.id,
                bad.embedding.len(),
                manifest.dim
            )));
        }
        if records.len() != manifest.record_count {
            warn!(
                collection = name,
                manifest = manifest.record_count,
                actual = records.len(),
                "record count differs from manifest, using records file"
            );
        }

        Ok(Self {
            name: name.to_string(),
            dir,
            manifest,
            records,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fails with [`RagError::EmbeddingMismatch`] when `model` is not the
    /// model the collection was built with.
    pub fn ensure_model(&self, model: &str) -> Result<(), RagError> {
        if self.manifest.embedding_model != model {
            return Err(RagError::EmbeddingMismatch {
                stored: self.manifest.embedding_model.clone(),
                current: model.to_string(),
            });
        }
        Ok(())
    }

    /// Appends and persists `records`. Nothing is written if any vector has
    /// the wrong dimension.
    pub fn append(&mut self, records: Vec<RagRecord>) -> Result<(), RagError> {
        if let Some(bad) = records.iter().find(|r| r.embedding.len() != self.manifest.dim) {
            return Err(RagError::VectorSizeMismatch {
                got: bad.embedding.len(),
                want: self.manifest.dim,
            });
        }
        if records.is_empty() {
            return Ok(());
        }

        append_records(self.dir.join(RECORDS_FILE), &records)?;
        self.records.extend(records);

        self.manifest.record_count = self.records.len();
        self.manifest.updated_at = Utc::now();
        write_json_atomic(self.dir.join(MANIFEST_FILE), &self.manifest)?;
        Ok(())
    }

    /// Top `k` records by cosine similarity with `score >= threshold`,
    /// best first.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<(f32, &RagRecord)>, RagError> {
        if query.len() != self.manifest.dim {
            return Err(RagError::VectorSizeMismatch {
                got: query.len(),
                want: self.manifest.dim,
            });
        }
        Ok(rank(&self.records, query, k, threshold)
            .into_iter()
            .map(|(score, i)| (score, &self.records[i]))
            .collect())
    }

    /// Distinct source paths of all records.
    pub fn sources(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.source.clone()).collect()
    }
}

/// Reads only the manifest, without loading records.
pub fn read_manifest(dir: &Path) -> Result<Manifest, RagError> {
    let bytes = std::fs::read(dir.join(MANIFEST_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Scores every record, keeps `score >= threshold`, sorts descending and
/// truncates to `k`. Returns `(score, index)` pairs.
pub(crate) fn rank(records: &[RagRecord], query: &[f32], k: usize, threshold: f32) -> Vec<(f32, usize)> {
    let mut scored: Vec<(f32, usize)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (cosine_similarity(&r.embedding, query), i))
        .filter(|(s, _)| *s >= threshold)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;

    fn rec(id: &str, source: &str, v: Vec<f32>) -> RagRecord {
        RagRecord {
            id: id.into(),
            text: format!("text {id}"),
            source: source.into(),
            chunk_index: 0,
            embedding: v,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn create_append_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("rag_docs_vectorstore");

        let mut c = Collection::create("rag_docs", &dir, "test:hash", 2).unwrap();
        c.append(vec![rec("a", "x.txt", vec![1.0, 0.0])]).unwrap();
        c.append(vec![rec("b", "y.txt", vec![0.0, 1.0])]).unwrap();

        let reopened = Collection::open("rag_docs", &dir).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.manifest().record_count, 2);
        assert_eq!(reopened.manifest().embedding_model, "test:hash");
        assert_eq!(
            reopened.sources().into_iter().collect::<Vec<_>>(),
            vec!["x.txt", "y.txt"]
        );
        assert!(!dir.join("manifest.json.tmp").exists());
    }

    #[test]
    fn wrong_dimension_is_rejected_and_nothing_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("c");
        let mut c = Collection::create("c", &dir, "m", 2).unwrap();

        let err = c
            .append(vec![rec("a", "x", vec![1.0, 0.0]), rec("b", "x", vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::VectorSizeMismatch { got: 1, want: 2 }));
        assert!(c.is_empty());
        assert_eq!(Collection::open("c", &dir).unwrap().len(), 0);
    }

    #[test]
    fn model_guard() {
        let tmp = tempfile::tempdir().unwrap();
        let c = Collection::create("c", tmp.path().join("c"), "ollama:a", 3).unwrap();
        assert!(c.ensure_model("ollama:a").is_ok());
        assert!(matches!(
            c.ensure_model("ollama:b"),
            Err(RagError::EmbeddingMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_records_fail_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("c");
        Collection::create("c", &dir, "m", 2).unwrap();
        std::fs::write(dir.join(RECORDS_FILE), "{not json\n").unwrap();

        let err = Collection::open("c", &dir).unwrap_err();
        assert!(matches!(err, RagError::CollectionLoad { ref name, .. } if name == "c"));
    }

    #[test]
    fn missing_manifest_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("c")).unwrap();
        assert!(matches!(
            Collection::open("c", tmp.path().join("c")),
            Err(RagError::CollectionLoad { .. })
        ));
    }

    #[test]
    fn search_orders_and_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = Collection::create("c", tmp.path().join("c"), "m", 2).unwrap();
        c.append(vec![
            rec("far", "s", vec![-1.0, 0.0]),
            rec("mid", "s", vec![1.0, 1.0]),
            rec("near", "s", vec![1.0, 0.05]),
        ])
        .unwrap();

        let hits = c.search(&[1.0, 0.0], 5, 0.1).unwrap();
        let ids: Vec<_> = hits.iter().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);

        assert_eq!(c.search(&[1.0, 0.0], 1, 0.1).unwrap().len(), 1);
        assert!(c.search(&[1.0, 0.0], 0, 0.1).unwrap().is_empty());
        assert!(matches!(
            c.search(&[1.0], 5, 0.1),
            Err(RagError::VectorSizeMismatch { .. })
        ));
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[3.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn ranking_respects_k_threshold_and_order(
            vectors in prop::collection::vec(prop::collection::vec(-1.0f32..1.0, 4), 0..40),
            query in prop::collection::vec(-1.0f32..1.0, 4),
            k in 0usize..10,
            threshold in -1.0f32..1.0,
        ) {
            let records: Vec<_> = vectors
                .into_iter()
                .enumerate()
                .map(|(i, v)| rec(&i.to_string(), "s", v))
                .collect();
            let ranked = rank(&records, &query, k, threshold);
            prop_assert!(ranked.len() <= k);
            prop_assert!(ranked.iter().all(|(s, _)| *s >= threshold));
            prop_assert!(ranked.windows(2).all(|w| w[0].0 >= w[1].0));
        }
    }
}

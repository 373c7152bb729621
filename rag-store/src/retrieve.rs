//! Similarity retrieval over one or several collections.

use tracing::{debug, instrument};

use crate::collection::Collection;
use crate::errors::RagError;
use crate::manager::VectorStoreManager;
use crate::record::{RagHit, RagQuery};

/// Collections searched by the combined chat retriever, in order.
pub const DEFAULT_COMBINED: [&str; 2] = ["rag_docs", "cag_docs"];

/// Upper bound on documents handed to the prompt from combined retrieval.
pub const MAX_CONTEXT_DOCS: usize = 6;

/// Top-K hits from `name` with `score >= threshold`, best first.
/// A collection that does not exist yields no hits.
#[instrument(skip(manager, query), fields(k = query.top_k, threshold = query.score_threshold))]
pub async fn retrieve(
    manager: &VectorStoreManager,
    name: &str,
    query: &RagQuery<'_>,
) -> Result<Vec<RagHit>, RagError> {
    let Some(collection) = manager.collection(name).await? else {
        debug!("collection missing, no hits");
        return Ok(Vec::new());
    };
    if collection.is_empty() || query.top_k == 0 {
        return Ok(Vec::new());
    }
    let vector = manager.embedder().embed(query.text).await?;
    let hits = to_hits(&collection, &vector, query.top_k, query.score_threshold)?;
    debug!(hits = hits.len(), "retrieved");
    Ok(hits)
}

fn to_hits(c: &Collection, vector: &[f32], k: usize, threshold: f32) -> Result<Vec<RagHit>, RagError> {
    Ok(c.search(vector, k, threshold)?
        .into_iter()
        .map(|(score, r)| RagHit {
            score,
            text: r.text.clone(),
            source: r.source.clone(),
            chunk_index: r.chunk_index,
            collection: c.name().to_string(),
        })
        .collect())
}

/// One collection inside a [`CombinedRetriever`].
#[derive(Clone, Debug, PartialEq)]
pub struct RetrieverPart {
    pub collection: String,
    pub k: usize,
    pub threshold: f32,
}

/// Runs each part independently and concatenates the results in part order.
/// No re-ranking across parts.
#[derive(Clone, Debug)]
pub struct CombinedRetriever {
    pub parts: Vec<RetrieverPart>,
}

impl CombinedRetriever {
    pub fn new(parts: Vec<RetrieverPart>) -> Self {
        Self { parts }
    }

    /// [`DEFAULT_COMBINED`] with the same `k` and `threshold` for each.
    pub fn with_defaults(k: usize, threshold: f32) -> Self {
        Self::new(
            DEFAULT_COMBINED
                .iter()
                .map(|c| RetrieverPart {
                    collection: (*c).to_string(),
                    k,
                    threshold,
                })
                .collect(),
        )
    }

    /// The query is embedded once, and only if some part has records.
    #[instrument(skip_all, fields(parts = self.parts.len()))]
    pub async fn retrieve(
        &self,
        manager: &VectorStoreManager,
        query: &str,
    ) -> Result<Vec<RagHit>, RagError> {
        let mut vector: Option<Vec<f32>> = None;
        let mut out = Vec::new();
        for part in &self.parts {
            let Some(c) = manager.collection(&part.collection).await? else {
                debug!(collection = %part.collection, "collection missing, skipped");
                continue;
            };
            if c.is_empty() || part.k == 0 {
                continue;
            }
            let v = match vector.take() {
                Some(v) => v,
                None => manager.embedder().embed(query).await?,
            };
            out.extend(to_hits(&c, &v, part.k, part.threshold)?);
            vector = Some(v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RagConfig;
    use crate::embed::HashEmbedder;
    use crate::record::Chunk;

    fn chunk(source: &str, i: usize, text: &str) -> Chunk {
        Chunk {
            id: format!("{source}-{i}"),
            text: text.into(),
            source: source.into(),
            index: i,
            token_count: 1,
        }
    }

    async fn seeded(root: &std::path::Path) -> VectorStoreManager {
        let m = VectorStoreManager::new(RagConfig::new_default(root), Arc::new(HashEmbedder::new()));
        m.create_or_update(
            vec![
                chunk("rag_docs/urlaub.txt", 0, "urlaub antrag formular personalabteilung"),
                chunk("rag_docs/it.txt", 0, "passwort zuruecksetzen helpdesk ticket"),
                chunk("rag_docs/kantine.txt", 0, "kantine speiseplan montag"),
            ],
            "rag_docs",
        )
        .await
        .unwrap();
        m.create_or_update(
            vec![chunk("cag_docs/faq.md", 0, "urlaub resturlaub uebertrag januar")],
            "cag_docs",
        )
        .await
        .unwrap();
        m
    }

    fn q(text: &str, top_k: usize, score_threshold: f32) -> RagQuery<'_> {
        RagQuery { text, top_k, score_threshold }
    }

    #[tokio::test]
    async fn missing_collection_yields_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let m = VectorStoreManager::new(RagConfig::new_default(tmp.path()), Arc::new(HashEmbedder::new()));
        let hits = retrieve(&m, "nope", &q("anything", 5, 0.1)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn best_match_comes_first() {
        let tmp = tempfile::tempdir().unwrap();
        let m = seeded(tmp.path()).await;

        let hits = retrieve(&m, "rag_docs", &q("urlaub antrag", 5, 0.1)).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].source, "rag_docs/urlaub.txt");
        assert_eq!(hits[0].collection, "rag_docs");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| h.score >= 0.1));
    }

    #[tokio::test]
    async fn k_and_threshold_bound_the_result() {
        let tmp = tempfile::tempdir().unwrap();
        let m = seeded(tmp.path()).await;

        assert!(retrieve(&m, "rag_docs", &q("urlaub", 1, -1.0)).await.unwrap().len() <= 1);
        assert_eq!(retrieve(&m, "rag_docs", &q("urlaub", 10, -1.0)).await.unwrap().len(), 3);
        assert!(retrieve(&m, "rag_docs", &q("urlaub", 10, 1.01)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn combined_concatenates_in_part_order() {
        let tmp = tempfile::tempdir().unwrap();
        let m = seeded(tmp.path()).await;

        let combined = CombinedRetriever::new(vec![
            RetrieverPart { collection: "cag_docs".into(), k: 5, threshold: -1.0 },
            RetrieverPart { collection: "missing".into(), k: 5, threshold: -1.0 },
            RetrieverPart { collection: "rag_docs".into(), k: 2, threshold: -1.0 },
        ]);
        let hits = combined.retrieve(&m, "urlaub").await.unwrap();
        let collections: Vec<_> = hits.iter().map(|h| h.collection.as_str()).collect();
        assert_eq!(collections, vec!["cag_docs", "rag_docs", "rag_docs"]);
    }

    #[test]
    fn default_parts() {
        let c = CombinedRetriever::with_defaults(5, 0.1);
        let names: Vec<_> = c.parts.iter().map(|p| p.collection.as_str()).collect();
        assert_eq!(names, DEFAULT_COMBINED);
    }
}

//! In-memory vector index.
//!
//! Brute-force cosine similarity over every stored vector. Vectors live in
//! immutable, reference-counted segments: [`VectorIndex::build`] produces
//! a single segment, and [`VectorIndex::merge`] returns a new index that
//! shares the segments of both inputs without copying or touching them.
//! There is no removal primitive; deleting a document means building a
//! fresh index from the documents that remain.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{RagError, Result};
use crate::models::{Passage, ScoredPassage};

/// Number of texts sent to the embedder per call when no size is given.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

#[derive(Debug)]
struct IndexedPassage {
    passage: Passage,
    vector: Vec<f32>,
}

#[derive(Debug)]
struct Segment {
    entries: Vec<IndexedPassage>,
}

/// Searchable set of embedded passages.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    segments: Vec<Arc<Segment>>,
    dims: Option<usize>,
    len: usize,
}

impl VectorIndex {
    /// Embed every passage and assemble a fresh index.
    ///
    /// Passages with identical text (same hash) are embedded once. Any
    /// embedder failure, a short response, or vectors of inconsistent
    /// dimensionality abort the whole build with [`RagError::IndexBuild`].
    pub async fn build(
        passages: Vec<Passage>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        if passages.is_empty() {
            return Ok(Self::default());
        }

        let mut unique: Vec<&Passage> = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for p in &passages {
            if !seen.contains_key(p.hash.as_str()) {
                seen.insert(p.hash.as_str(), unique.len());
                unique.push(p);
            }
        }

        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(unique.len());
        for batch in unique.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            tracing::debug!(
                model = embedder.model_name(),
                batch = texts.len(),
                "embedding passage batch"
            );
            let embedded = embedder
                .embed(&texts)
                .await
                .map_err(|e| RagError::index_build(format!("{:#}", e)))?;
            if embedded.len() != texts.len() {
                return Err(RagError::index_build(format!(
                    "embedder returned {} vectors for {} passages",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if dims == 0 {
            return Err(RagError::index_build("embedder returned empty vectors"));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::index_build(format!(
                "inconsistent embedding dimensions: expected {}, got {}",
                dims,
                bad.len()
            )));
        }

        let hash_to_slot: HashMap<String, usize> = seen
            .into_iter()
            .map(|(hash, slot)| (hash.to_string(), slot))
            .collect();
        let entries: Vec<IndexedPassage> = passages
            .into_iter()
            .map(|passage| {
                let slot = hash_to_slot[passage.hash.as_str()];
                IndexedPassage {
                    vector: vectors[slot].clone(),
                    passage,
                }
            })
            .collect();

        let len = entries.len();
        Ok(Self {
            segments: vec![Arc::new(Segment { entries })],
            dims: Some(dims),
            len,
        })
    }

    /// Combine two indexes. Entries of `existing` are shared, not copied.
    pub fn merge(existing: &VectorIndex, addition: &VectorIndex) -> Result<Self> {
        let dims = match (existing.dims, addition.dims) {
            (Some(a), Some(b)) if a != b => {
                return Err(RagError::index_build(format!(
                    "cannot merge indexes of dimension {} and {}",
                    a, b
                )))
            }
            (a, b) => a.or(b),
        };
        let mut segments = existing.segments.clone();
        segments.extend(addition.segments.iter().cloned());
        Ok(Self {
            segments,
            dims,
            len: existing.len + addition.len,
        })
    }

    /// Embed `query` and return the `k` most similar passages, best first.
    pub async fn search(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        if self.is_empty() {
            return Err(RagError::NotReady);
        }
        let query_vec = embedder
            .embed_query(query)
            .await
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
        self.search_vector(&query_vec, k)
    }

    /// Return the `k` passages closest to `query_vec`. Ties keep insertion order.
    pub fn search_vector(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        if self.is_empty() {
            return Err(RagError::NotReady);
        }
        if let Some(dims) = self.dims {
            if query_vec.len() != dims {
                return Err(RagError::Embedding(format!(
                    "query vector has {} dimensions, index has {}",
                    query_vec.len(),
                    dims
                )));
            }
        }

        let mut scored: Vec<(f32, &IndexedPassage)> = self
            .entries()
            .map(|e| (cosine_similarity(query_vec, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| ScoredPassage {
                passage: e.passage.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// All passages in insertion order.
    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.entries().map(|e| &e.passage)
    }

    /// Ids of every document with at least one passage in the index.
    pub fn document_ids(&self) -> BTreeSet<u64> {
        self.passages().map(|p| p.source_document_id).collect()
    }

    fn entries(&self) -> impl Iterator<Item = &IndexedPassage> {
        self.segments.iter().flat_map(|s| s.entries.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunker;
    use crate::embedding::HashingEmbedder;
    use crate::models::SourceText;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding service unavailable")
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    fn passages(id: u64, name: &str, text: &str) -> Vec<Passage> {
        Chunker::new(40, 10, "\n").unwrap().passages(&SourceText {
            document_id: id,
            name: name.to_string(),
            text: text.to_string(),
        })
    }

    #[tokio::test]
    async fn test_build_and_search() {
        let embedder = HashingEmbedder::default();
        let index = VectorIndex::build(
            passages(1, "fruit.pdf", "Apples are red.\nBananas are yellow."),
            &embedder,
            8,
        )
        .await
        .unwrap();
        assert!(!index.is_empty());
        let hits = index.search(&embedder, "What color are bananas?", 5).await.unwrap();
        assert_eq!(hits[0].passage.source_name, "fruit.pdf");
        assert!(hits[0].passage.text.contains("Bananas"));
    }

    #[tokio::test]
    async fn test_results_sorted_and_truncated() {
        let embedder = HashingEmbedder::default();
        let text = (0..30)
            .map(|i| format!("topic{} filler words here", i))
            .collect::<Vec<_>>()
            .join("\n");
        let index = VectorIndex::build(passages(1, "a", &text), &embedder, 4)
            .await
            .unwrap();
        let hits = index.search(&embedder, "topic7 filler", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_build_failure_is_index_build_error() {
        let err = VectorIndex::build(passages(1, "a", "some text"), &FailingEmbedder, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
    }

    #[tokio::test]
    async fn test_short_embedder_response_rejected() {
        let text = (0..20)
            .map(|i| format!("line number {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let many = passages(1, "a", &text);
        assert!(many.len() > 1);
        let err = VectorIndex::build(many, &ShortEmbedder, 64).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
    }

    #[tokio::test]
    async fn test_empty_index_not_ready() {
        let index = VectorIndex::default();
        let err = index
            .search(&HashingEmbedder::default(), "anything", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotReady));
    }

    #[tokio::test]
    async fn test_merge_keeps_both_and_leaves_existing_alone() {
        let embedder = HashingEmbedder::default();
        let a = VectorIndex::build(passages(1, "A", "Apples are red."), &embedder, 8)
            .await
            .unwrap();
        let b = VectorIndex::build(passages(2, "B", "Zeppelins float slowly."), &embedder, 8)
            .await
            .unwrap();
        let merged = VectorIndex::merge(&a, &b).unwrap();
        assert_eq!(merged.len(), a.len() + b.len());
        assert_eq!(merged.segment_count(), 2);
        assert_eq!(a.segment_count(), 1);
        assert_eq!(merged.document_ids(), BTreeSet::from([1, 2]));

        let hits = merged.search(&embedder, "zeppelins", 1).await.unwrap();
        assert_eq!(hits[0].passage.source_name, "B");
    }

    #[tokio::test]
    async fn test_merge_dimension_mismatch() {
        let a = VectorIndex::build(passages(1, "A", "alpha"), &HashingEmbedder::new(8), 8)
            .await
            .unwrap();
        let b = VectorIndex::build(passages(2, "B", "beta"), &HashingEmbedder::new(16), 8)
            .await
            .unwrap();
        assert!(matches!(
            VectorIndex::merge(&a, &b),
            Err(RagError::IndexBuild(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_passages_share_embedding() {
        let embedder = HashingEmbedder::default();
        let mut ps = passages(1, "A", "same words");
        ps.extend(passages(2, "B", "same words"));
        let index = VectorIndex::build(ps, &embedder, 8).await.unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.document_ids().len(), 2);
    }
}

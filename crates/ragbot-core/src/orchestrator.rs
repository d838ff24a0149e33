//! Retrieval orchestrator.
//!
//! Owns one session's vector index and answers questions against it.
//! The live index sits behind a short-held [`RwLock`] as an
//! `Arc<VectorIndex>`; builds run without the lock and the finished index
//! is swapped in, so a concurrent query sees either the old or the new
//! index and never a partial one. Callers that must publish other state
//! in the same step split the work into `prepare_*` and [`commit`].
//!
//! [`commit`]: RetrievalOrchestrator::commit
//!
//! ```text
//!            add_documents / rebuild
//!   Empty ──────────────────────────▶ Building ──▶ Ready
//!     ▲                                   │          │
//!     │            build failed (unchanged)          │
//!     └──────────────── reset ◀──────────────────────┘
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::chunk::Chunker;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generation::{build_context, Generator};
use crate::index::{VectorIndex, DEFAULT_EMBED_BATCH_SIZE};
use crate::models::{
    IndexPhase, IndexStatus, Passage, QueryResult, ScoredPassage, SourceDetail, SourceText,
};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Tunables for retrieval and index builds.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub preview_chars: usize,
    pub embed_batch_size: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

/// An index built off-lock and waiting to be published.
#[derive(Debug)]
pub struct PendingIndex {
    index: VectorIndex,
    documents: usize,
    replace: bool,
}

impl PendingIndex {
    pub fn passage_count(&self) -> usize {
        self.index.len()
    }
}

#[derive(Debug, Default)]
struct IndexState {
    index: Option<Arc<VectorIndex>>,
    document_count: usize,
}

pub struct RetrievalOrchestrator {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    chunker: Chunker,
    settings: RetrievalSettings,
    state: RwLock<IndexState>,
    builds_in_flight: AtomicUsize,
}

struct BuildGuard<'a>(&'a AtomicUsize);

impl<'a> BuildGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RetrievalOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        chunker: Chunker,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            chunker,
            settings,
            state: RwLock::new(IndexState::default()),
            builds_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Index new documents on top of whatever is already searchable.
    ///
    /// Returns the number of passages added. On error the previous index
    /// and document count are left exactly as they were.
    pub async fn add_documents(&self, sources: &[SourceText]) -> Result<usize> {
        let pending = self.prepare_addition(sources).await?;
        let added = pending.passage_count();
        self.commit(pending)?;
        Ok(added)
    }

    /// Replace the index with one built from `sources` alone.
    ///
    /// An empty `sources` slice moves the orchestrator back to `Empty`.
    pub async fn rebuild(&self, sources: &[SourceText]) -> Result<()> {
        let pending = self.prepare_rebuild(sources).await?;
        self.commit(pending)
    }

    /// Embed `sources` into an index that [`commit`](Self::commit) will
    /// merge into the live one. Nothing visible changes until then.
    pub async fn prepare_addition(&self, sources: &[SourceText]) -> Result<PendingIndex> {
        let index = self.build(sources).await?;
        Ok(PendingIndex {
            index,
            documents: sources.len(),
            replace: false,
        })
    }

    /// Embed `sources` into an index that [`commit`](Self::commit) will
    /// swap in place of the live one.
    pub async fn prepare_rebuild(&self, sources: &[SourceText]) -> Result<PendingIndex> {
        let index = self.build(sources).await?;
        Ok(PendingIndex {
            index,
            documents: sources.len(),
            replace: true,
        })
    }

    /// Publish a prepared index. Only fails when a merge finds vectors of
    /// a different dimension, in which case nothing changes.
    pub fn commit(&self, pending: PendingIndex) -> Result<()> {
        let PendingIndex {
            index,
            documents,
            replace,
        } = pending;
        let passages = index.len();

        let mut state = self.state.write();
        if replace {
            if index.is_empty() {
                state.index = None;
                state.document_count = 0;
            } else {
                state.index = Some(Arc::new(index));
                state.document_count = documents;
            }
            tracing::info!(documents, passages, "index rebuilt");
            return Ok(());
        }

        if index.is_empty() {
            return Ok(());
        }
        let next = match state.index.as_deref() {
            Some(existing) => VectorIndex::merge(existing, &index)?,
            None => index,
        };
        state.index = Some(Arc::new(next));
        state.document_count += documents;
        tracing::info!(
            documents,
            passages,
            total_documents = state.document_count,
            "documents indexed"
        );
        Ok(())
    }

    /// Answer `question` from the current index.
    pub async fn query(&self, question: &str) -> Result<QueryResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::validation("Question cannot be empty"));
        }

        let (index, document_count) = {
            let state = self.state.read();
            match &state.index {
                Some(index) => (Arc::clone(index), state.document_count),
                None => return Err(RagError::NotReady),
            }
        };

        let hits = index
            .search(self.embedder.as_ref(), question, self.settings.top_k)
            .await?;
        tracing::debug!(hits = hits.len(), "retrieved passages");

        let context = build_context(hits.iter().map(|h| h.passage.text.as_str()));
        let answer = self
            .generator
            .generate(question, &context)
            .await
            .map_err(|e| RagError::Generation(format!("{:#}", e)))?;

        Ok(self.shape_result(answer, &hits, document_count))
    }

    /// Drop the index. Safe to call in any state.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.index = None;
        state.document_count = 0;
    }

    pub fn phase(&self) -> IndexPhase {
        if self.builds_in_flight.load(Ordering::SeqCst) > 0 {
            IndexPhase::Building
        } else if self.state.read().index.is_some() {
            IndexPhase::Ready
        } else {
            IndexPhase::Empty
        }
    }

    pub fn status(&self) -> IndexStatus {
        let phase = self.phase();
        let state = self.state.read();
        IndexStatus {
            has_index: state.index.is_some(),
            document_count: state.document_count,
            ready_for_queries: state.index.is_some(),
            phase,
        }
    }

    /// Snapshot of the live index, if any.
    pub fn current_index(&self) -> Option<Arc<VectorIndex>> {
        self.state.read().index.clone()
    }

    async fn build(&self, sources: &[SourceText]) -> Result<VectorIndex> {
        let passages = self.chunk_all(sources);
        if passages.is_empty() {
            return Ok(VectorIndex::default());
        }
        let _guard = BuildGuard::enter(&self.builds_in_flight);
        VectorIndex::build(passages, self.embedder.as_ref(), self.settings.embed_batch_size).await
    }

    fn chunk_all(&self, sources: &[SourceText]) -> Vec<Passage> {
        let passages: Vec<Passage> = sources
            .iter()
            .flat_map(|s| self.chunker.passages(s))
            .collect();
        tracing::debug!(
            documents = sources.len(),
            passages = passages.len(),
            "chunked documents"
        );
        passages
    }

    fn shape_result(
        &self,
        answer: String,
        hits: &[ScoredPassage],
        document_count: usize,
    ) -> QueryResult {
        let mut sources: Vec<String> = Vec::new();
        let mut source_details = Vec::with_capacity(hits.len());
        for hit in hits {
            let p = &hit.passage;
            if !sources.contains(&p.source_name) {
                sources.push(p.source_name.clone());
            }
            source_details.push(SourceDetail {
                source: p.source_name.clone(),
                chunk_info: p.chunk_label(),
                preview: preview(&p.text, self.settings.preview_chars),
            });
        }
        QueryResult {
            answer,
            sources,
            source_details,
            total_documents_searched: document_count,
        }
    }
}

/// First `max_chars` characters of `text`, with `"..."` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

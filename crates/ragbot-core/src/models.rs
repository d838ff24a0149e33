//! Core data models.
//!
//! Records, passages and query results that flow between the registry,
//! the index and the orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered document.
///
/// `full_text` is kept for the whole lifetime of the record: it is the
/// only input for an index rebuild after a delete. It is never sent to
/// clients.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: u64,
    pub filename: String,
    pub page_count: usize,
    /// Length of `full_text` in characters.
    pub text_length: usize,
    pub upload_time: DateTime<Utc>,
    /// Size of the uploaded file in bytes.
    pub size: usize,
    #[serde(skip_serializing)]
    pub full_text: String,
}

/// Text of one document handed to the orchestrator for indexing.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub document_id: u64,
    pub name: String,
    pub text: String,
}

impl SourceText {
    pub fn from_record(record: &DocumentRecord) -> Self {
        Self {
            document_id: record.id,
            name: record.filename.clone(),
            text: record.full_text.clone(),
        }
    }
}

/// A bounded slice of a document, the unit of retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub text: String,
    pub source_document_id: u64,
    pub source_name: String,
    /// Zero-based position of this passage within its document.
    pub chunk_index: usize,
    pub chunk_count: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Passage {
    /// Human-readable position label, e.g. `"Chunk 2/7"`.
    pub fn chunk_label(&self) -> String {
        format!("Chunk {}/{}", self.chunk_index + 1, self.chunk_count)
    }
}

/// A retrieved passage and its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

/// One cited passage in a [`QueryResult`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceDetail {
    pub source: String,
    pub chunk_info: String,
    pub preview: String,
}

/// Answer plus provenance for one question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    /// Distinct document names in first-seen retrieval order.
    pub sources: Vec<String>,
    pub source_details: Vec<SourceDetail>,
    pub total_documents_searched: usize,
}

/// Aggregate statistics over a registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_documents: usize,
    pub total_pages: usize,
    pub total_text_length: usize,
    pub documents: Vec<DocumentRecord>,
}

/// Lifecycle phase of a session's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Empty,
    Building,
    Ready,
}

/// Snapshot of the orchestrator state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IndexStatus {
    pub has_index: bool,
    pub document_count: usize,
    pub ready_for_queries: bool,
    pub phase: IndexPhase,
}

impl IndexStatus {
    /// Status of a session that has never indexed anything.
    pub fn empty() -> Self {
        Self {
            has_index: false,
            document_count: 0,
            ready_for_queries: false,
            phase: IndexPhase::Empty,
        }
    }
}

//! Transport-facing service.
//!
//! [`RagService`] maps each client operation onto one session's registry
//! and orchestrator and shapes the JSON summaries the HTTP layer returns.
//! Mutating operations (upload, delete, reset) hold the session's write
//! gate for their whole duration; questions never wait on it. Read-only
//! operations on an unknown session report an empty one without creating
//! it.

use std::sync::Arc;

use serde::Serialize;

use ragbot_core::extract::TextExtractor;
use ragbot_core::models::{DocumentRecord, IndexStatus, QueryResult, RegistryStats, SourceText};
use ragbot_core::registry::DocumentRegistry;
use ragbot_core::session::SessionManager;
use ragbot_core::{RagError, Result};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::extract::PdfExtractor;
use crate::generation::create_generator;

/// One file of an upload batch.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub message: String,
    /// Filenames of the documents added by this upload.
    pub documents: Vec<String>,
    pub total_documents: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub documents_uploaded: usize,
    pub documents: Vec<String>,
    pub ready_for_chat: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetSummary {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteSummary {
    pub message: String,
    pub remaining_documents: Vec<String>,
    pub total_remaining: usize,
}

/// Registry statistics and index status side by side.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatsSummary {
    #[serde(flatten)]
    pub registry: RegistryStats,
    #[serde(flatten)]
    pub index: IndexStatus,
}

pub struct RagService {
    sessions: SessionManager,
    extractor: Arc<dyn TextExtractor>,
    max_file_bytes: usize,
}

struct Extracted {
    filename: String,
    text: String,
    page_count: usize,
    size: usize,
}

impl RagService {
    pub fn new(
        sessions: SessionManager,
        extractor: Arc<dyn TextExtractor>,
        max_file_bytes: usize,
    ) -> Self {
        Self {
            sessions,
            extractor,
            max_file_bytes,
        }
    }

    /// Wire up providers, chunker and the PDF extractor from config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let chunker = config.chunking.chunker()?;
        tracing::info!(
            embedder = embedder.model_name(),
            generator = generator.model_name(),
            chunk_size = chunker.chunk_size(),
            chunk_overlap = chunker.chunk_overlap(),
            "service configured"
        );
        Ok(Self::new(
            SessionManager::new(embedder, generator, chunker, config.retrieval_settings()),
            Arc::new(PdfExtractor),
            config.upload.max_file_bytes,
        ))
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Extract, register and index a batch of files.
    ///
    /// All-or-nothing: every file is validated and extracted before any
    /// id is reserved, and the records become visible only once the index
    /// holding them is committed. A failed build publishes nothing.
    pub async fn upload(&self, session_id: &str, files: Vec<UploadFile>) -> Result<UploadSummary> {
        if files.is_empty() {
            return Err(RagError::validation("No files uploaded"));
        }
        for file in &files {
            self.validate_file(file)?;
        }

        let mut extracted = Vec::with_capacity(files.len());
        for file in files {
            extracted.push(self.extract(file).await?);
        }

        let session = self.sessions.get_or_create(session_id);
        let _gate = session.write_gate().await;

        let records: Vec<DocumentRecord> = {
            let mut registry = session.registry();
            extracted
                .into_iter()
                .map(|e| registry.reserve(e.filename, e.page_count, e.text, e.size))
                .collect()
        };
        let sources: Vec<SourceText> = records.iter().map(SourceText::from_record).collect();

        let pending = match session.orchestrator().prepare_addition(&sources).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(
                    session = session_id,
                    error = %e,
                    "indexing failed, upload discarded"
                );
                return Err(e);
            }
        };

        // Index and registry change under one registry lock so readers
        // never see one without the other.
        let stats = {
            let mut registry = session.registry();
            session.orchestrator().commit(pending)?;
            for record in &records {
                registry.insert(record.clone());
            }
            registry.stats()
        };

        let documents: Vec<String> = records.into_iter().map(|r| r.filename).collect();
        tracing::info!(
            session = session_id,
            added = documents.len(),
            total = stats.total_documents,
            "upload processed"
        );
        Ok(UploadSummary {
            message: format!(
                "Successfully uploaded and processed {} document(s). Total: {} documents, {} pages.",
                documents.len(),
                stats.total_documents,
                stats.total_pages
            ),
            documents,
            total_documents: stats.total_documents,
        })
    }

    pub async fn ask(&self, session_id: &str, question: &str) -> Result<QueryResult> {
        match self.sessions.get(session_id) {
            Some(session) => session.orchestrator().query(question).await,
            None if question.trim().is_empty() => {
                Err(RagError::validation("Question cannot be empty"))
            }
            None => Err(RagError::NotReady),
        }
    }

    pub fn status(&self, session_id: &str) -> StatusSummary {
        let Some(session) = self.sessions.get(session_id) else {
            return StatusSummary {
                documents_uploaded: 0,
                documents: Vec::new(),
                ready_for_chat: false,
            };
        };
        let registry = session.registry();
        StatusSummary {
            documents_uploaded: registry.len(),
            documents: registry.document_names(),
            ready_for_chat: session.orchestrator().status().ready_for_queries,
        }
    }

    pub async fn reset(&self, session_id: &str) -> ResetSummary {
        if let Some(session) = self.sessions.get(session_id) {
            let _gate = session.write_gate().await;
            let mut registry = session.registry();
            session.orchestrator().reset();
            registry.clear();
            tracing::info!(session = session_id, "session reset");
        }
        ResetSummary {
            message: "Bot reset successfully. All documents cleared.".to_string(),
        }
    }

    pub fn list_documents(&self, session_id: &str) -> Vec<DocumentRecord> {
        self.sessions
            .get(session_id)
            .map(|session| session.registry().list())
            .unwrap_or_default()
    }

    /// Remove one document and rebuild the index from what remains.
    ///
    /// The record stays listed until the rebuilt index is committed, so
    /// a failed rebuild leaves both registry and index untouched.
    pub async fn delete_document(&self, session_id: &str, id: u64) -> Result<DeleteSummary> {
        let session = self.sessions.get(session_id).ok_or(RagError::NotFound(id))?;
        let _gate = session.write_gate().await;

        let (filename, remaining) = {
            let registry = session.registry();
            let record = registry.get(id).ok_or(RagError::NotFound(id))?;
            (record.filename.clone(), registry.texts_without(id))
        };

        let pending = match session.orchestrator().prepare_rebuild(&remaining).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(
                    session = session_id,
                    document = id,
                    error = %e,
                    "rebuild failed, document kept"
                );
                return Err(e);
            }
        };

        {
            let mut registry = session.registry();
            session.orchestrator().commit(pending)?;
            registry.delete(id);
        }

        let remaining_documents: Vec<String> = remaining.into_iter().map(|s| s.name).collect();
        tracing::info!(
            session = session_id,
            document = id,
            remaining = remaining_documents.len(),
            "document deleted"
        );
        Ok(DeleteSummary {
            message: format!("Document '{}' deleted successfully", filename),
            total_remaining: remaining_documents.len(),
            remaining_documents,
        })
    }

    pub fn document_stats(&self, session_id: &str) -> DocumentStatsSummary {
        match self.sessions.get(session_id) {
            Some(session) => {
                let registry = session.registry();
                DocumentStatsSummary {
                    registry: registry.stats(),
                    index: session.orchestrator().status(),
                }
            }
            None => DocumentStatsSummary {
                registry: DocumentRegistry::new().stats(),
                index: IndexStatus::empty(),
            },
        }
    }

    fn validate_file(&self, file: &UploadFile) -> Result<()> {
        if !self.extractor.accepts(&file.filename) {
            return Err(RagError::validation(format!(
                "File {} is not a PDF. Only PDF files are supported",
                file.filename
            )));
        }
        if file.bytes.is_empty() {
            return Err(RagError::validation(format!("File {} is empty", file.filename)));
        }
        if file.bytes.len() > self.max_file_bytes {
            return Err(RagError::validation(format!(
                "File {} exceeds the upload limit of {} bytes",
                file.filename, self.max_file_bytes
            )));
        }
        Ok(())
    }

    async fn extract(&self, file: UploadFile) -> Result<Extracted> {
        let extractor = Arc::clone(&self.extractor);
        let UploadFile { filename, bytes } = file;
        let size = bytes.len();

        let outcome = tokio::task::spawn_blocking(move || extractor.extract(&bytes)).await;
        let extracted = match outcome {
            Ok(Ok(extracted)) => extracted,
            Ok(Err(e)) => return Err(RagError::extraction(filename, format!("{:#}", e))),
            Err(join) => return Err(RagError::extraction(filename, join)),
        };

        if extracted.text.trim().is_empty() {
            return Err(RagError::validation(format!(
                "No text could be extracted from {}",
                filename
            )));
        }
        tracing::debug!(
            file = %filename,
            pages = extracted.page_count,
            chars = extracted.text.chars().count(),
            "extracted text"
        );
        Ok(Extracted {
            filename,
            text: extracted.text,
            page_count: extracted.page_count,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragbot_core::chunk::Chunker;
    use ragbot_core::embedding::{Embedder, HashingEmbedder};
    use ragbot_core::extract::ExtractedText;
    use ragbot_core::models::IndexPhase;
    use ragbot_core::orchestrator::RetrievalSettings;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    use crate::generation::ExtractiveGenerator;

    /// Reads `.pdf` uploads as UTF-8 text.
    struct PlainTextPdf;

    impl TextExtractor for PlainTextPdf {
        fn extension(&self) -> &str {
            "pdf"
        }
        fn extract(&self, bytes: &[u8]) -> anyhow::Result<ExtractedText> {
            let text = std::str::from_utf8(bytes)?.to_string();
            if text.starts_with("%corrupt") {
                anyhow::bail!("bad xref table");
            }
            Ok(ExtractedText {
                text,
                page_count: 1,
            })
        }
    }

    struct SwitchableEmbedder {
        inner: HashingEmbedder,
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Embedder for SwitchableEmbedder {
        fn model_name(&self) -> &str {
            "switchable"
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("provider down");
            }
            self.inner.embed(texts).await
        }
    }

    /// Parks inside `embed` until released, then succeeds or fails.
    struct PausingEmbedder {
        inner: HashingEmbedder,
        pausing: AtomicBool,
        failing: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Embedder for PausingEmbedder {
        fn model_name(&self) -> &str {
            "pausing"
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.pausing.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("provider down");
            }
            self.inner.embed(texts).await
        }
    }

    fn pausing_service() -> (Arc<RagService>, Arc<PausingEmbedder>) {
        let embedder = Arc::new(PausingEmbedder {
            inner: HashingEmbedder::default(),
            pausing: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let sessions = SessionManager::new(
            embedder.clone(),
            Arc::new(ExtractiveGenerator::default()),
            Chunker::default(),
            RetrievalSettings::default(),
        );
        (
            Arc::new(RagService::new(sessions, Arc::new(PlainTextPdf), 1024)),
            embedder,
        )
    }

    fn service() -> (RagService, Arc<AtomicBool>) {
        let failing = Arc::new(AtomicBool::new(false));
        let embedder = Arc::new(SwitchableEmbedder {
            inner: HashingEmbedder::default(),
            failing: Arc::clone(&failing),
        });
        let sessions = SessionManager::new(
            embedder,
            Arc::new(ExtractiveGenerator::default()),
            Chunker::default(),
            RetrievalSettings::default(),
        );
        (RagService::new(sessions, Arc::new(PlainTextPdf), 1024), failing)
    }

    #[tokio::test]
    async fn test_upload_then_ask() {
        let (svc, _) = service();
        let summary = svc
            .upload("s", vec![UploadFile::new("A.pdf", "Bananas are yellow.")])
            .await
            .unwrap();
        assert_eq!(summary.documents, vec!["A.pdf".to_string()]);
        assert_eq!(summary.total_documents, 1);
        assert_eq!(
            summary.message,
            "Successfully uploaded and processed 1 document(s). Total: 1 documents, 1 pages."
        );

        let status = svc.status("s");
        assert_eq!(status.documents_uploaded, 1);
        assert!(status.ready_for_chat);

        let result = svc.ask("s", "What color are bananas?").await.unwrap();
        assert_eq!(result.sources, vec!["A.pdf".to_string()]);
        assert_eq!(result.answer, "Bananas are yellow.");
    }

    #[tokio::test]
    async fn test_non_pdf_rejects_whole_batch() {
        let (svc, _) = service();
        let err = svc
            .upload(
                "s",
                vec![
                    UploadFile::new("ok.pdf", "fine"),
                    UploadFile::new("notes.txt", "nope"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
        assert!(svc.list_documents("s").is_empty());
    }

    #[tokio::test]
    async fn test_empty_upload_and_oversized_file() {
        let (svc, _) = service();
        assert!(matches!(
            svc.upload("s", vec![]).await,
            Err(RagError::Validation(_))
        ));
        let big = UploadFile::new("big.pdf", vec![b'a'; 2048]);
        assert!(matches!(
            svc.upload("s", vec![big]).await,
            Err(RagError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_extraction_failure_registers_nothing() {
        let (svc, _) = service();
        let err = svc
            .upload(
                "s",
                vec![
                    UploadFile::new("good.pdf", "Cherries are red."),
                    UploadFile::new("bad.pdf", "%corrupt"),
                ],
            )
            .await
            .unwrap_err();
        match err {
            RagError::Extraction { filename, .. } => assert_eq!(filename, "bad.pdf"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(svc.status("s").documents_uploaded, 0);
    }

    #[tokio::test]
    async fn test_blank_text_is_validation_error() {
        let (svc, _) = service();
        let err = svc
            .upload("s", vec![UploadFile::new("blank.pdf", "   \n  ")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn test_failed_index_build_rolls_back_upload() {
        let (svc, failing) = service();
        svc.upload("s", vec![UploadFile::new("A.pdf", "Bananas are yellow.")])
            .await
            .unwrap();

        failing.store(true, Ordering::SeqCst);
        let err = svc
            .upload("s", vec![UploadFile::new("B.pdf", "Cherries are red.")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));

        let docs = svc.list_documents("s");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "A.pdf");

        failing.store(false, Ordering::SeqCst);
        let summary = svc
            .upload("s", vec![UploadFile::new("C.pdf", "Plums are purple.")])
            .await
            .unwrap();
        assert_eq!(summary.total_documents, 2);
        // id 2 was consumed by the failed upload
        assert_eq!(svc.list_documents("s")[1].id, 3);
    }

    #[tokio::test]
    async fn test_delete_rebuilds_without_document() {
        let (svc, _) = service();
        svc.upload(
            "s",
            vec![
                UploadFile::new("A.pdf", "Bananas are yellow."),
                UploadFile::new("B.pdf", "Cherries are red."),
            ],
        )
        .await
        .unwrap();

        let summary = svc.delete_document("s", 1).await.unwrap();
        assert_eq!(summary.message, "Document 'A.pdf' deleted successfully");
        assert_eq!(summary.remaining_documents, vec!["B.pdf".to_string()]);
        assert_eq!(summary.total_remaining, 1);

        let result = svc.ask("s", "What color are bananas?").await.unwrap();
        assert!(!result.sources.contains(&"A.pdf".to_string()));
    }

    #[tokio::test]
    async fn test_delete_last_document_empties_index() {
        let (svc, _) = service();
        svc.upload("s", vec![UploadFile::new("A.pdf", "Bananas are yellow.")])
            .await
            .unwrap();
        svc.delete_document("s", 1).await.unwrap();
        let stats = svc.document_stats("s");
        assert_eq!(stats.index.phase, IndexPhase::Empty);
        assert!(matches!(
            svc.ask("s", "bananas?").await,
            Err(RagError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.delete_document("s", 9).await,
            Err(RagError::NotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_record() {
        let (svc, failing) = service();
        svc.upload(
            "s",
            vec![
                UploadFile::new("A.pdf", "Bananas are yellow."),
                UploadFile::new("B.pdf", "Cherries are red."),
            ],
        )
        .await
        .unwrap();

        failing.store(true, Ordering::SeqCst);
        let err = svc.delete_document("s", 1).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
        let names: Vec<String> = svc.list_documents("s").into_iter().map(|d| d.filename).collect();
        assert_eq!(names, vec!["A.pdf".to_string(), "B.pdf".to_string()]);
    }

    #[tokio::test]
    async fn test_reset_clears_and_keeps_counter() {
        let (svc, _) = service();
        svc.upload("s", vec![UploadFile::new("A.pdf", "Bananas are yellow.")])
            .await
            .unwrap();
        let reset = svc.reset("s").await;
        assert_eq!(reset.message, "Bot reset successfully. All documents cleared.");
        svc.reset("s").await;

        let status = svc.status("s");
        assert_eq!(status.documents_uploaded, 0);
        assert!(!status.ready_for_chat);

        svc.upload("s", vec![UploadFile::new("B.pdf", "Cherries are red.")])
            .await
            .unwrap();
        assert_eq!(svc.list_documents("s")[0].id, 2);
    }

    #[tokio::test]
    async fn test_document_stats_serialize_flat() {
        let (svc, _) = service();
        svc.upload("s", vec![UploadFile::new("A.pdf", "Bananas are yellow.")])
            .await
            .unwrap();
        let json = serde_json::to_value(svc.document_stats("s")).unwrap();
        assert_eq!(json["total_documents"], 1);
        assert_eq!(json["total_pages"], 1);
        assert_eq!(json["ready_for_queries"], true);
        assert_eq!(json["phase"], "ready");
        assert_eq!(json["documents"][0]["filename"], "A.pdf");
    }

    #[tokio::test]
    async fn test_upload_invisible_while_indexing() {
        let (svc, embedder) = pausing_service();
        embedder.pausing.store(true, Ordering::SeqCst);
        embedder.failing.store(true, Ordering::SeqCst);

        let upload = tokio::spawn({
            let svc = Arc::clone(&svc);
            async move {
                svc.upload("s", vec![UploadFile::new("A.pdf", "Bananas are yellow.")])
                    .await
            }
        });
        embedder.entered.notified().await;

        assert!(svc.list_documents("s").is_empty());
        let status = svc.status("s");
        assert_eq!(status.documents_uploaded, 0);
        assert!(!status.ready_for_chat);
        assert_eq!(svc.document_stats("s").registry.total_documents, 0);

        embedder.release.notify_one();
        let err = upload.await.unwrap().unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
        assert!(svc.list_documents("s").is_empty());
    }

    #[tokio::test]
    async fn test_upload_visible_once_committed() {
        let (svc, embedder) = pausing_service();
        embedder.pausing.store(true, Ordering::SeqCst);

        let upload = tokio::spawn({
            let svc = Arc::clone(&svc);
            async move {
                svc.upload("s", vec![UploadFile::new("A.pdf", "Bananas are yellow.")])
                    .await
            }
        });
        embedder.entered.notified().await;
        assert!(svc.list_documents("s").is_empty());

        embedder.release.notify_one();
        upload.await.unwrap().unwrap();
        let status = svc.status("s");
        assert_eq!(status.documents, vec!["A.pdf".to_string()]);
        assert!(status.ready_for_chat);
    }

    #[tokio::test]
    async fn test_deleted_document_listed_until_rebuild_commits() {
        let (svc, embedder) = pausing_service();
        svc.upload(
            "s",
            vec![
                UploadFile::new("A.pdf", "Bananas are yellow."),
                UploadFile::new("B.pdf", "Cherries are red."),
            ],
        )
        .await
        .unwrap();

        embedder.pausing.store(true, Ordering::SeqCst);
        embedder.failing.store(true, Ordering::SeqCst);
        let delete = tokio::spawn({
            let svc = Arc::clone(&svc);
            async move { svc.delete_document("s", 1).await }
        });
        embedder.entered.notified().await;
        assert_eq!(svc.list_documents("s").len(), 2);
        assert_eq!(svc.document_stats("s").index.document_count, 2);

        embedder.release.notify_one();
        assert!(delete.await.unwrap().is_err());
        assert_eq!(svc.list_documents("s").len(), 2);
        assert_eq!(svc.document_stats("s").index.document_count, 2);
    }

    #[tokio::test]
    async fn test_read_paths_do_not_create_sessions() {
        let (svc, _) = service();
        let status = svc.status("ghost");
        assert_eq!(status.documents_uploaded, 0);
        assert!(!status.ready_for_chat);
        assert!(svc.list_documents("ghost").is_empty());

        let stats = svc.document_stats("ghost");
        assert_eq!(stats.registry.total_documents, 0);
        assert_eq!(stats.index.phase, IndexPhase::Empty);

        assert!(matches!(
            svc.ask("ghost", "bananas?").await,
            Err(RagError::NotReady)
        ));
        assert!(matches!(
            svc.ask("ghost", "  ").await,
            Err(RagError::Validation(_))
        ));
        svc.reset("ghost").await;
        assert!(matches!(
            svc.delete_document("ghost", 1).await,
            Err(RagError::NotFound(1))
        ));
        assert!(svc.sessions().is_empty());
    }
}

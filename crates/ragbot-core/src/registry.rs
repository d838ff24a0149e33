//! Per-session document registry.
//!
//! Holds one [`DocumentRecord`] per uploaded file, keyed by a numeric id
//! that is never reused. Ids are handed out in increasing order, so the
//! map's key order is also upload order.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::models::{DocumentRecord, RegistryStats, SourceText};

#[derive(Debug, Default)]
pub struct DocumentRegistry {
    records: BTreeMap<u64, DocumentRecord>,
    last_id: u64,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new record under the next id.
    pub fn register(
        &mut self,
        filename: impl Into<String>,
        page_count: usize,
        text: impl Into<String>,
        byte_size: usize,
    ) -> DocumentRecord {
        let record = self.reserve(filename, page_count, text, byte_size);
        self.insert(record.clone());
        record
    }

    /// Build a record under the next id without storing it.
    ///
    /// The id is consumed even if the record is never inserted, so a
    /// batch whose indexing fails leaves a gap instead of reusing ids.
    pub fn reserve(
        &mut self,
        filename: impl Into<String>,
        page_count: usize,
        text: impl Into<String>,
        byte_size: usize,
    ) -> DocumentRecord {
        self.last_id += 1;
        let full_text = text.into();
        DocumentRecord {
            id: self.last_id,
            filename: filename.into(),
            page_count,
            text_length: full_text.chars().count(),
            upload_time: Utc::now(),
            size: byte_size,
            full_text,
        }
    }

    /// Store a record previously handed out by [`reserve`](Self::reserve).
    pub fn insert(&mut self, record: DocumentRecord) {
        debug_assert!(record.id <= self.last_id);
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: u64) -> Option<&DocumentRecord> {
        self.records.get(&id)
    }

    /// Remove a record. Returns false when the id is unknown.
    pub fn delete(&mut self, id: u64) -> bool {
        self.records.remove(&id).is_some()
    }

    /// Drop every record. The id counter keeps counting.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_documents: self.records.len(),
            total_pages: self.records.values().map(|r| r.page_count).sum(),
            total_text_length: self.records.values().map(|r| r.text_length).sum(),
            documents: self.list(),
        }
    }

    /// Texts of every remaining document in upload order, for a rebuild.
    pub fn remaining_texts_and_names(&self) -> Vec<SourceText> {
        self.records.values().map(SourceText::from_record).collect()
    }

    /// Texts of every document except `excluded`, for a rebuild that
    /// has to finish before the record is actually removed.
    pub fn texts_without(&self, excluded: u64) -> Vec<SourceText> {
        self.records
            .values()
            .filter(|r| r.id != excluded)
            .map(SourceText::from_record)
            .collect()
    }

    /// All records in upload order.
    pub fn list(&self) -> Vec<DocumentRecord> {
        self.records.values().cloned().collect()
    }

    pub fn document_names(&self) -> Vec<String> {
        self.records.values().map(|r| r.filename.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }
}

//! Text extractor capability.
//!
//! Upload handling calls a [`TextExtractor`] to turn file bytes into text
//! before anything is registered. The PDF implementation lives in the app
//! crate.

use anyhow::Result;

/// Plain text pulled out of one uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Converts raw file bytes into text.
pub trait TextExtractor: Send + Sync {
    /// File extension this extractor accepts, lowercase without the dot.
    fn extension(&self) -> &str;

    /// Whether `filename` looks like something this extractor handles.
    fn accepts(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.eq_ignore_ascii_case(self.extension()))
            .unwrap_or(false)
    }

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText>;
}

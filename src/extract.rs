//! PDF text extraction.
//!
//! Each page's text is prefixed with a `--- Page N ---` marker so answers
//! and previews can be traced back to a page.

use anyhow::Result;

pub use ragbot_core::extract::{ExtractedText, TextExtractor};

/// Extracts per-page text from PDF bytes with `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extension(&self) -> &str {
        "pdf"
    }

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?;
        Ok(ExtractedText {
            page_count: pages.len(),
            text: join_pages(&pages),
        })
    }
}

/// Concatenate page texts as `\n--- Page N ---\n{text}\n` blocks.
///
/// Returns an empty string when no page has any visible text, so callers
/// can tell an image-only PDF from one with content.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    if pages.iter().all(|p| p.as_ref().trim().is_empty()) {
        return String::new();
    }
    let mut text = String::new();
    for (i, page) in pages.iter().enumerate() {
        text.push_str(&format!("\n--- Page {} ---\n", i + 1));
        text.push_str(page.as_ref());
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_pages_adds_markers() {
        let text = join_pages(&["first", "second"]);
        assert_eq!(text, "\n--- Page 1 ---\nfirst\n\n--- Page 2 ---\nsecond\n");
    }

    #[test]
    fn test_join_pages_blank_document() {
        assert_eq!(join_pages(&["", "  \n"]), "");
        assert_eq!(join_pages::<&str>(&[]), "");
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        let err = PdfExtractor.extract(b"not a pdf").unwrap_err();
        assert!(err.to_string().contains("PDF extraction failed"));
    }

    #[test]
    fn test_accepts_pdf_extension_only() {
        assert!(PdfExtractor.accepts("report.PDF"));
        assert!(!PdfExtractor.accepts("report.docx"));
    }
}

//! PDF text extraction, page-by-page, capped at the first 100 pages.

use std::path::Path;

use crate::types::FailReason;

use super::Extractor;

const MAX_PAGES: usize = 100;
/// `pdf_extract` separates consecutive pages with a form-feed character in
/// its plain-text output; that is the only page boundary this crate's
/// extraction surface exposes, so the page cap is applied by splitting on
/// it rather than walking the document's page tree directly.
const PAGE_BREAK: char = '\u{c}';

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, temp_path: &Path) -> Result<String, FailReason> {
        let bytes = std::fs::read(temp_path).map_err(|_| FailReason::TransientIO)?;
        let full_text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
            classify_pdf_error(&e.to_string())
        })?;
        Ok(cap_pages(&full_text, MAX_PAGES))
    }
}

fn classify_pdf_error(message: &str) -> FailReason {
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        FailReason::PasswordProtected
    } else {
        FailReason::Corrupted
    }
}

fn cap_pages(text: &str, max_pages: usize) -> String {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    if pages.len() > max_pages {
        pages.truncate(max_pages);
    }
    pages.join(&PAGE_BREAK.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_pages_truncates_beyond_limit() {
        let pages: Vec<String> = (0..150).map(|i| format!("page {i}")).collect();
        let text = pages.join(&PAGE_BREAK.to_string());
        let capped = cap_pages(&text, 100);
        assert_eq!(capped.split(PAGE_BREAK).count(), 100);
    }

    #[test]
    fn cap_pages_leaves_short_documents_untouched() {
        let text = format!("one{PAGE_BREAK}two{PAGE_BREAK}three");
        assert_eq!(cap_pages(&text, 100), text);
    }

    #[test]
    fn classify_pdf_error_detects_password_protection() {
        assert_eq!(
            classify_pdf_error("document is encrypted"),
            FailReason::PasswordProtected
        );
        assert_eq!(classify_pdf_error("bad xref table"), FailReason::Corrupted);
    }
}

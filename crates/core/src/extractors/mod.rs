//! Per-format text extraction, dispatched by file extension, each wrapped in
//! the shared safe-copy + timeout + truncation combinator.

mod csv_extract;
mod legacy;
mod office_zip;
mod pdf_extract_format;
mod text;
mod wrapper;

pub use wrapper::{run_with_deadline, safe_copy, ExtractError};

use std::path::Path;
use std::time::Duration;

use crate::types::{system_time_to_secs, FailReason, MAX_CONTENT_CHARS};

/// One extractor registered for a set of lowercase extensions.
pub trait Extractor: Send + Sync {
    /// Extract text from the *already safe-copied* temporary file. Backends
    /// that are unavailable on this host should return
    /// `FailReason::UnsupportedFormat` unconditionally.
    fn extract(&self, temp_path: &Path) -> Result<String, FailReason>;
}

/// The successful result of running an extractor under the full wrapper:
/// truncated text plus the filesystem mtime observed at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOutcome {
    pub text: String,
    pub mtime: f64,
}

/// Maps a lowercase extension to its extractor implementation. Built once at
/// startup; unavailable legacy backends register a stub (§9 "COM-style
/// external automation" redesign) rather than being probed per file.
pub struct ExtractorRegistry {
    text: text::TextExtractor,
    office: office_zip::OfficeZipExtractor,
    legacy: legacy::LegacyOfficeExtractor,
    csv: csv_extract::CsvExtractor,
    pdf: pdf_extract_format::PdfExtractor,
    extraction_timeout: Duration,
    hwp_timeout: Duration,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new("CP949", 60, 30)
    }
}

impl ExtractorRegistry {
    /// `extraction_timeout_secs`/`hwp_timeout_secs` are the configured
    /// wall-clock budgets (§6 `extractionTimeoutSeconds`/`hwpTimeoutSeconds`);
    /// HWP gets its own, shorter budget since the legacy backend that handles
    /// it tends to hang rather than fail fast on malformed input.
    pub fn new(legacy_codepage: &str, extraction_timeout_secs: u64, hwp_timeout_secs: u64) -> Self {
        Self {
            text: text::TextExtractor::new(legacy_codepage),
            office: office_zip::OfficeZipExtractor,
            legacy: legacy::LegacyOfficeExtractor::probe(),
            csv: csv_extract::CsvExtractor::new(legacy_codepage),
            pdf: pdf_extract_format::PdfExtractor,
            extraction_timeout: Duration::from_secs(extraction_timeout_secs),
            hwp_timeout: Duration::from_secs(hwp_timeout_secs),
        }
    }

    fn dispatch(&self, ext: &str) -> Option<(&dyn Extractor, bool)> {
        match ext {
            "txt" | "log" | "md" | "py" | "js" | "ts" | "jsx" | "tsx" | "java" | "cpp" | "c"
            | "h" | "cs" | "json" | "xml" | "html" | "css" | "sql" | "sh" | "bat" | "ps1"
            | "yaml" | "yml" => Some((&self.text, false)),
            "docx" | "pptx" | "xlsx" => Some((&self.office, false)),
            "doc" | "ppt" | "xls" => Some((&self.legacy, false)),
            "hwp" => Some((&self.legacy, true)),
            "csv" => Some((&self.csv, false)),
            "pdf" => Some((&self.pdf, false)),
            _ => None,
        }
    }
}

/// Dispatch, safe-copy, deadline, and truncate — the full extractor
/// contract of §4.3, used by both IndexWorker and the RetryQueue/Watcher
/// single-file paths.
pub fn extract_with_wrapper(
    registry: &ExtractorRegistry,
    path: &Path,
) -> Result<ExtractOutcome, FailReason> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let (extractor, is_hwp) = registry
        .dispatch(&ext)
        .ok_or(FailReason::UnsupportedFormat)?;

    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(system_time_to_secs)
        .map_err(|_| FailReason::TransientIO)?;

    let temp = wrapper::safe_copy(path).map_err(|_| FailReason::FileLocked)?;

    let deadline = if is_hwp {
        registry.hwp_timeout
    } else {
        registry.extraction_timeout
    };

    let temp_path = temp.path().to_path_buf();
    let result = wrapper::run_with_deadline(deadline, move || extractor.extract(&temp_path));

    // `temp` (the TempDir guard) is dropped here regardless of outcome,
    // deleting the private copy and its directory on every exit path.
    drop(temp);

    let text = result?;
    let truncated = truncate_scalars(&text, MAX_CONTENT_CHARS);
    Ok(ExtractOutcome {
        text: truncated,
        mtime,
    })
}

fn truncate_scalars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn truncate_scalars_respects_char_boundary_not_byte_count() {
        let s = "héllo"; // 'é' is multi-byte
        let truncated = truncate_scalars(s, 3);
        assert_eq!(truncated.chars().count(), 3);
    }

    #[test]
    fn extract_with_wrapper_reads_plain_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("note.txt");
        let mut f = std::fs::File::create(&file_path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);

        let registry = ExtractorRegistry::default();
        let outcome = extract_with_wrapper(&registry, &file_path).unwrap();
        assert_eq!(outcome.text, "hello world");
    }

    #[test]
    fn extract_with_wrapper_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("mystery.xyz");
        std::fs::write(&file_path, b"data").unwrap();

        let registry = ExtractorRegistry::default();
        let err = extract_with_wrapper(&registry, &file_path).unwrap_err();
        assert_eq!(err, FailReason::UnsupportedFormat);
    }
}

//! Plain-text extraction with a layered decoding strategy: UTF-8, then a
//! configured legacy codepage, then byte-level heuristic detection, then
//! lossy UTF-8 as the final fallback.

use std::path::Path;

use crate::types::FailReason;
use encoding_rs::Encoding;

use super::Extractor;

const HEURISTIC_PREFIX_BYTES: usize = 1024 * 1024;

pub struct TextExtractor {
    legacy_codepage: &'static Encoding,
}

impl TextExtractor {
    pub fn new(legacy_codepage_label: &str) -> Self {
        let legacy_codepage = codepage_label_to_encoding(legacy_codepage_label);
        Self { legacy_codepage }
    }
}

impl Extractor for TextExtractor {
    fn extract(&self, temp_path: &Path) -> Result<String, FailReason> {
        let bytes = std::fs::read(temp_path).map_err(|_| FailReason::TransientIO)?;
        Ok(decode_text(&bytes, self.legacy_codepage))
    }
}

/// Resolve a codepage label (e.g. `"CP949"`) to an `encoding_rs` encoding,
/// falling back to windows-1252 if the label is unrecognized. `encoding_rs`
/// only recognizes the WHATWG label set, which spells the Korean legacy
/// codepage `"windows-949"` rather than the Windows `"CP949"` name users
/// actually configure, so that alias is resolved here first.
pub(super) fn codepage_label_to_encoding(label: &str) -> &'static Encoding {
    let normalized = label.trim();
    let whatwg_label = if normalized.eq_ignore_ascii_case("cp949") {
        "windows-949"
    } else {
        normalized
    };
    Encoding::for_label(whatwg_label.as_bytes()).unwrap_or(encoding_rs::WINDOWS_1252)
}

pub(super) fn decode_text(bytes: &[u8], legacy_codepage: &'static Encoding) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let (legacy_decoded, _, had_errors) = legacy_codepage.decode(bytes);
    if !had_errors {
        return legacy_decoded.into_owned();
    }

    let prefix = &bytes[..bytes.len().min(HEURISTIC_PREFIX_BYTES)];
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(prefix, true);
    let guessed = detector.guess(None, true);
    let (guessed_decoded, _, guessed_had_errors) = guessed.decode(bytes);
    if !guessed_had_errors {
        return guessed_decoded.into_owned();
    }

    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_valid_utf8_directly() {
        let text = decode_text("hello 안녕".as_bytes(), encoding_rs::WINDOWS_1252);
        assert_eq!(text, "hello 안녕");
    }

    #[test]
    fn falls_back_to_lossy_utf8_for_garbage_bytes() {
        let bytes = vec![0xFF, 0xFE, 0xFD, 0xFC];
        let text = decode_text(&bytes, encoding_rs::WINDOWS_1252);
        assert!(!text.is_empty());
    }

    #[test]
    fn unrecognized_codepage_label_falls_back_to_windows_1252() {
        let enc = codepage_label_to_encoding("NOT-A-REAL-CODEPAGE");
        assert_eq!(enc, encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn cp949_label_resolves_to_euc_kr_compatible_encoding() {
        let enc = codepage_label_to_encoding("CP949");
        assert_eq!(enc, encoding_rs::EUC_KR);
    }
}

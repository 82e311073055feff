//! CSV extraction: tab-join cells per row, decoding bytes with the same
//! layered strategy as plain text.

use std::path::Path;

use encoding_rs::Encoding;

use crate::types::FailReason;

use super::text::{codepage_label_to_encoding, decode_text};
use super::Extractor;

pub struct CsvExtractor {
    legacy_codepage: &'static Encoding,
}

impl CsvExtractor {
    pub fn new(legacy_codepage_label: &str) -> Self {
        Self {
            legacy_codepage: codepage_label_to_encoding(legacy_codepage_label),
        }
    }
}

impl Extractor for CsvExtractor {
    fn extract(&self, temp_path: &Path) -> Result<String, FailReason> {
        let bytes = std::fs::read(temp_path).map_err(|_| FailReason::TransientIO)?;
        let decoded = decode_text(&bytes, self.legacy_codepage);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(decoded.as_bytes());

        let mut out = String::new();
        for record in reader.records() {
            let record = record.map_err(|e| FailReason::ParseError(e.to_string()))?;
            let row: Vec<&str> = record.iter().collect();
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extract_tab_joins_csv_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "name,age\nalice,30\nbob,40").unwrap();
        drop(f);

        let extractor = CsvExtractor::new("CP949");
        let text = extractor.extract(&path).unwrap();
        assert!(text.contains("name\tage"));
        assert!(text.contains("alice\t30"));
    }
}

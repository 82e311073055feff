//! Plain-text audit trail under the configured `log_dir`, kept alongside
//! (not instead of) `tracing` output: `indexing_log.txt` is the canonical
//! line-per-event record, `skipcheck.txt` and `error.txt` are filtered
//! views for retryable skips and hard errors, and `Indexed.txt` carries a
//! human-readable content preview for successful extractions.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

use crate::types::FailReason;

const PREVIEW_CHARS: usize = 500;

pub struct AuditLog {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, lock: Mutex::new(()) })
    }

    pub fn indexed(&self, path: &str, content: &str) {
        let _guard = self.lock.lock().expect("audit log mutex poisoned");
        self.append_line("indexing_log.txt", &format!("[{}] indexed\t{path}\t", timestamp()));
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        self.append_line(
            "Indexed.txt",
            &format!("[{}] {path}\n{preview}\n", timestamp()),
        );
    }

    pub fn skipped(&self, path: &str, reason: &FailReason) {
        let _guard = self.lock.lock().expect("audit log mutex poisoned");
        self.append_line(
            "indexing_log.txt",
            &format!("[{}] skipped\t{path}\t{reason}", timestamp()),
        );
        if reason.is_retryable() {
            self.append_line(
                "skipcheck.txt",
                &format!("[{}] {path}\t{reason}", timestamp()),
            );
        }
    }

    pub fn errored(&self, path: &str, detail: &str) {
        let _guard = self.lock.lock().expect("audit log mutex poisoned");
        self.append_line(
            "indexing_log.txt",
            &format!("[{}] error\t{path}\t{detail}", timestamp()),
        );
        self.append_line("error.txt", &format!("[{}] {path}\n{detail}\n", timestamp()));
    }

    fn append_line(&self, file_name: &str, line: &str) {
        let path = self.log_path(file_name);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            tracing::warn!(file = %path.display(), error = %e, "audit log write failed");
        }
    }

    fn log_path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_writes_both_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("logs")).unwrap();
        log.indexed("/a/b.txt", "hello world");

        let indexing = std::fs::read_to_string(dir.path().join("logs/indexing_log.txt")).unwrap();
        assert!(indexing.contains("indexed"));
        assert!(indexing.contains("/a/b.txt"));

        let indexed = std::fs::read_to_string(dir.path().join("logs/Indexed.txt")).unwrap();
        assert!(indexed.contains("hello world"));
    }

    #[test]
    fn skipped_retryable_reason_also_hits_skipcheck() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("logs")).unwrap();
        log.skipped("/a/locked.txt", &FailReason::FileLocked);

        let skipcheck = std::fs::read_to_string(dir.path().join("logs/skipcheck.txt")).unwrap();
        assert!(skipcheck.contains("/a/locked.txt"));
    }

    #[test]
    fn skipped_terminal_reason_does_not_hit_skipcheck() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("logs")).unwrap();
        log.skipped("/a/bad.doc", &FailReason::UnsupportedFormat);

        assert!(!dir.path().join("logs/skipcheck.txt").exists());
    }

    #[test]
    fn preview_is_truncated_to_500_chars() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("logs")).unwrap();
        let long_content = "x".repeat(1000);
        log.indexed("/a/big.txt", &long_content);

        let indexed = std::fs::read_to_string(dir.path().join("logs/Indexed.txt")).unwrap();
        let preview_line = indexed.lines().nth(1).unwrap();
        assert_eq!(preview_line.len(), PREVIEW_CHARS);
    }
}

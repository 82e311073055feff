//! Core data model shared across the indexing pipeline: index entries, retry
//! records, search-history entries, run statistics, and path canonicalization
//! helpers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of Unicode scalar values retained for an extracted body.
/// The extractor wrapper enforces this; the store never truncates on its own.
pub const MAX_CONTENT_CHARS: usize = 100_000;

/// Files larger than this are skipped before any extraction is attempted.
pub const MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Tolerance for mtime comparisons during change detection, absorbing
/// filesystem timestamp granularity differences across platforms.
pub const MTIME_TOLERANCE_SECS: f64 = 1.0;

/// One row of the persistent index: a single known file path and its
/// extracted content, live or tombstoned.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub path: String,
    pub content: String,
    pub mtime: f64,
    pub deleted: bool,
    pub deleted_at: Option<f64>,
}

impl IndexEntry {
    pub fn live(path: impl Into<String>, content: impl Into<String>, mtime: f64) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            mtime,
            deleted: false,
            deleted_at: None,
        }
    }
}

/// Reasons an extraction can fail. Retryable reasons go into the RetryQueue;
/// terminal ones are recorded as a permanent skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    FileLocked,
    Timeout,
    PasswordProtected,
    Corrupted,
    UnsupportedFormat,
    ParseError(String),
    TransientIO,
    SizeExceeded,
    ExcludedByPolicy,
}

impl FailReason {
    /// Retryable reasons are offered to the RetryQueue; all others are
    /// terminal and counted as a permanent skip.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailReason::FileLocked
                | FailReason::Timeout
                | FailReason::PasswordProtected
                | FailReason::TransientIO
        )
    }
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::FileLocked => write!(f, "FileLocked"),
            FailReason::Timeout => write!(f, "Timeout"),
            FailReason::PasswordProtected => write!(f, "PasswordProtected"),
            FailReason::Corrupted => write!(f, "Corrupted"),
            FailReason::UnsupportedFormat => write!(f, "UnsupportedFormat"),
            FailReason::ParseError(detail) => write!(f, "ParseError({detail})"),
            FailReason::TransientIO => write!(f, "TransientIO"),
            FailReason::SizeExceeded => write!(f, "SizeExceeded"),
            FailReason::ExcludedByPolicy => write!(f, "ExcludedByPolicy"),
        }
    }
}

/// One path currently awaiting a retry attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryRecord {
    pub path: String,
    pub reason: FailReason,
    pub first_failed_at: f64,
    pub attempt_count: u32,
}

impl RetryRecord {
    pub fn new(path: impl Into<String>, reason: FailReason, now: f64) -> Self {
        Self {
            path: path.into(),
            reason,
            first_failed_at: now,
            attempt_count: 1,
        }
    }
}

/// A recorded search keyword, most-recently-used first when listed.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHistoryEntry {
    pub keyword: String,
    pub last_used: f64,
}

/// The tagged outcome of processing a single file, per the "dynamic status
/// objects" design note: a fixed variant set rather than an open map.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Indexed { chars: usize },
    Skipped(FailReason),
    Errored(String),
}

/// Counters reset at the start of every IndexWorker pass.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub total_discovered: u64,
    pub indexed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub new: u64,
    pub modified: u64,
    pub tombstoned: u64,
    pub paused_count: u64,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

impl IndexStats {
    pub fn record(&mut self, outcome: &FileOutcome, was_new: bool) {
        match outcome {
            FileOutcome::Indexed { .. } => {
                self.indexed += 1;
                if was_new {
                    self.new += 1;
                } else {
                    self.modified += 1;
                }
            }
            FileOutcome::Skipped(_) => self.skipped += 1,
            FileOutcome::Errored(_) => self.errored += 1,
        }
    }
}

/// Seconds since the Unix epoch, as a float so mtimes and timestamps can
/// carry sub-second precision consistently across the crate.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub fn system_time_to_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Canonicalize a path once, at ingest, to the form the store keys on.
/// Case-sensitive on POSIX (the filesystem already is); case-preserving
/// (not case-folded) on Windows, where `get_detail`'s case-insensitive
/// fallback branch (see `resolve_path_variants`) covers the mismatch.
pub fn canonical_path_string(path: &Path) -> std::io::Result<String> {
    let canonical = path.canonicalize()?;
    Ok(canonical.to_string_lossy().into_owned())
}

/// Same identity rule as `canonical_path_string`, tolerant of the path
/// already being gone (a Remove event fires after the file no longer
/// exists, so `Path::canonicalize` can't resolve it directly). Falls back
/// to canonicalizing the parent directory and rejoining the file name, and
/// finally to the raw lossy path if even the parent is unreachable — so a
/// tombstone always targets the same key `upsert` used at ingest, as long
/// as the containing directory is still in place.
pub fn canonical_path_best_effort(path: &Path) -> String {
    if let Ok(s) = canonical_path_string(path) {
        return s;
    }
    if let Some(parent) = path.parent() {
        if let (Ok(canonical_parent), Some(file_name)) = (parent.canonicalize(), path.file_name())
        {
            return canonical_parent.join(file_name).to_string_lossy().into_owned();
        }
    }
    path.to_string_lossy().into_owned()
}

/// Produce the lookup candidates tried in order by `Store::get_detail`:
/// exact, case-insensitive, separator-swapped, and separator-swapped
/// case-insensitive. Returns them as owned strings, most-specific first.
pub fn resolve_path_variants(query: &str) -> Vec<String> {
    let trimmed = trim_trailing_separator(query);
    let swapped = swap_separators(&trimmed);
    let mut variants = vec![trimmed.clone()];
    if swapped != trimmed {
        variants.push(swapped.clone());
    }
    let lower = trimmed.to_lowercase();
    if lower != trimmed {
        variants.push(lower.clone());
    }
    let swapped_lower = swapped.to_lowercase();
    if swapped_lower != swapped && swapped_lower != lower {
        variants.push(swapped_lower);
    }
    variants
}

fn trim_trailing_separator(p: &str) -> String {
    let mut s = p.to_string();
    while s.ends_with('/') || s.ends_with('\\') {
        s.pop();
    }
    s
}

fn swap_separators(p: &str) -> String {
    if p.contains('\\') {
        p.replace('\\', "/")
    } else {
        p.replace('/', "\\")
    }
}

pub fn to_path_buf(path: &str) -> PathBuf {
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_reason_retryable_classification() {
        assert!(FailReason::FileLocked.is_retryable());
        assert!(FailReason::Timeout.is_retryable());
        assert!(FailReason::PasswordProtected.is_retryable());
        assert!(FailReason::TransientIO.is_retryable());
        assert!(!FailReason::Corrupted.is_retryable());
        assert!(!FailReason::UnsupportedFormat.is_retryable());
        assert!(!FailReason::ParseError("x".into()).is_retryable());
        assert!(!FailReason::SizeExceeded.is_retryable());
        assert!(!FailReason::ExcludedByPolicy.is_retryable());
    }

    #[test]
    fn index_stats_records_new_vs_modified() {
        let mut stats = IndexStats::default();
        stats.record(&FileOutcome::Indexed { chars: 10 }, true);
        stats.record(&FileOutcome::Indexed { chars: 20 }, false);
        stats.record(&FileOutcome::Skipped(FailReason::SizeExceeded), false);
        stats.record(&FileOutcome::Errored("boom".into()), false);
        assert_eq!(stats.new, 1);
        assert_eq!(stats.modified, 1);
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.errored, 1);
    }

    #[test]
    fn resolve_path_variants_covers_case_and_separator() {
        let variants = resolve_path_variants("/Root/Sub/File.TXT");
        assert!(variants.contains(&"/Root/Sub/File.TXT".to_string()));
        assert!(variants.iter().any(|v| v == "/root/sub/file.txt"));
    }

    #[test]
    fn canonical_path_best_effort_falls_back_to_parent_when_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, "x").unwrap();
        let canonical_while_present = canonical_path_string(&path).unwrap();

        std::fs::remove_file(&path).unwrap();
        let resolved_after_delete = canonical_path_best_effort(&path);

        assert_eq!(resolved_after_delete, canonical_while_present);
    }
}

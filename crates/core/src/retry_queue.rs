//! In-memory tracking of paths awaiting re-extraction after a transient
//! failure. A periodic worker drains it and retries each path, observing the
//! ActivityMonitor gate between attempts.

use dashmap::DashMap;
use std::path::Path;
use std::time::Duration;

use crate::activity::ActivityMonitor;
use crate::extractors::{self, ExtractorRegistry};
use crate::store::Store;
use crate::types::{now_secs, FailReason, RetryRecord};

const MAX_RETRY_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Concurrent map of path → pending retry record.
#[derive(Default)]
pub struct RetryQueue {
    records: DashMap<String, RetryRecord>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// No-op if `reason` is not retryable. Inserts a new record on first
    /// offer; leaves `attempt_count` unchanged on re-offer of an
    /// already-tracked path.
    pub fn offer(&self, path: &str, reason: FailReason) {
        if !reason.is_retryable() {
            return;
        }
        self.records
            .entry(path.to_string())
            .or_insert_with(|| RetryRecord::new(path, reason, now_secs()));
    }

    pub fn remove(&self, path: &str) {
        self.records.remove(path);
    }

    pub fn bump_attempt(&self, path: &str) {
        if let Some(mut record) = self.records.get_mut(path) {
            record.attempt_count += 1;
        }
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Snapshot of every pending record, for the periodic drain.
    pub fn drain(&self) -> Vec<RetryRecord> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }

    /// Run one drain-and-retry pass, observing the activity gate between
    /// individual retries. Intended to be called on a fixed period
    /// (`retry_interval_seconds` in Config) for the lifetime of the process.
    pub fn run_retry_pass(
        &self,
        store: &Store,
        registry: &ExtractorRegistry,
        activity: &ActivityMonitor,
        cancel: &std::sync::atomic::AtomicBool,
    ) {
        for record in self.drain() {
            if cancel.load(std::sync::atomic::Ordering::Relaxed) {
                return;
            }
            activity.wait_until_idle(
                activity.idle_threshold(),
                Duration::from_millis(100),
                cancel,
            );

            let path = Path::new(&record.path);
            if !path.exists() {
                self.remove(&record.path);
                continue;
            }
            let size = match path.metadata() {
                Ok(meta) => meta.len(),
                Err(_) => {
                    self.remove(&record.path);
                    continue;
                }
            };
            if size > MAX_RETRY_FILE_SIZE_BYTES {
                self.remove(&record.path);
                continue;
            }

            match extractors::extract_with_wrapper(registry, path) {
                Ok(outcome) => {
                    if let Err(e) = store.upsert(&record.path, &outcome.text, outcome.mtime) {
                        tracing::error!(path = %record.path, error = %e, "retry upsert failed");
                    } else {
                        self.remove(&record.path);
                    }
                }
                Err(_reason) => {
                    self.bump_attempt(&record.path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_ignores_non_retryable_reasons() {
        let q = RetryQueue::new();
        q.offer("/a", FailReason::Corrupted);
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn offer_inserts_retryable_reason() {
        let q = RetryQueue::new();
        q.offer("/a", FailReason::FileLocked);
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn re_offer_leaves_attempt_count_unchanged() {
        let q = RetryQueue::new();
        q.offer("/a", FailReason::Timeout);
        q.bump_attempt("/a");
        q.offer("/a", FailReason::Timeout);
        let record = q.drain().into_iter().next().unwrap();
        assert_eq!(record.attempt_count, 2);
    }

    #[test]
    fn remove_clears_record() {
        let q = RetryQueue::new();
        q.offer("/a", FailReason::TransientIO);
        q.remove("/a");
        assert_eq!(q.size(), 0);
    }
}

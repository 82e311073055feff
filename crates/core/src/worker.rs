//! IndexWorker: the scheduler. Collects candidates via the Crawler,
//! consults the Store for change detection, invokes Extractors under
//! activity gating, writes batches to the Store, and feeds the RetryQueue.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::activity::ActivityMonitor;
use crate::audit_log::AuditLog;
use crate::crawler::Crawler;
use crate::exclusion::ExclusionFilter;
use crate::extractors::{self, ExtractorRegistry};
use crate::retry_queue::RetryQueue;
use crate::store::Store;
use crate::types::{
    canonical_path_best_effort, now_secs, system_time_to_secs, FailReason, FileOutcome,
    IndexEntry, IndexStats, MAX_FILE_SIZE_BYTES, MTIME_TOLERANCE_SECS,
};

/// Upserts accumulate into a batch of this size before being flushed
/// atomically. Intentionally small: favours durability and low peak memory
/// over raw throughput.
const NEW_FILE_BATCH_SIZE: usize = 2;

/// Small inter-file pause to reduce steady-state CPU/IO.
const INTER_FILE_PAUSE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Collecting,
    Processing,
    Reconciling,
    Maintaining,
}

pub struct IndexWorker<'a> {
    store: &'a Store,
    registry: &'a ExtractorRegistry,
    retry_queue: &'a RetryQueue,
    activity: &'a ActivityMonitor,
    filter: &'a ExclusionFilter,
    audit: Option<&'a AuditLog>,
    max_file_size_bytes: u64,
    running: AtomicBool,
    state: std::sync::Mutex<WorkerState>,
}

impl<'a> IndexWorker<'a> {
    pub fn new(
        store: &'a Store,
        registry: &'a ExtractorRegistry,
        retry_queue: &'a RetryQueue,
        activity: &'a ActivityMonitor,
        filter: &'a ExclusionFilter,
    ) -> Self {
        Self {
            store,
            registry,
            retry_queue,
            activity,
            filter,
            audit: None,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
            running: AtomicBool::new(false),
            state: std::sync::Mutex::new(WorkerState::Idle),
        }
    }

    pub fn with_audit_log(mut self, audit: &'a AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_max_file_size_bytes(mut self, max_file_size_bytes: u64) -> Self {
        self.max_file_size_bytes = max_file_size_bytes;
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().expect("state mutex poisoned")
    }

    fn set_state(&self, s: WorkerState) {
        *self.state.lock().expect("state mutex poisoned") = s;
    }

    /// Run one full pass over `roots`. Only one instance may run at a time;
    /// a second call while running is rejected rather than queued.
    pub fn run(&self, roots: &[std::path::PathBuf], cancel: &AtomicBool) -> Result<IndexStats, WorkerBusy> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WorkerBusy);
        }

        let result = self.run_locked(roots, cancel);
        self.running.store(false, Ordering::SeqCst);
        self.set_state(WorkerState::Idle);
        Ok(result)
    }

    fn run_locked(&self, roots: &[std::path::PathBuf], cancel: &AtomicBool) -> IndexStats {
        let mut stats = IndexStats {
            start_time: Some(now_secs()),
            ..Default::default()
        };

        // Collect phase.
        self.set_state(WorkerState::Collecting);
        let crawler = Crawler::new(self.filter);
        let mut discovered: Vec<std::path::PathBuf> = Vec::new();
        for root in roots {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            discovered.extend(crawler.walk(root, cancel));
        }
        stats.total_discovered = discovered.len() as u64;

        // Process phase.
        self.set_state(WorkerState::Processing);
        let mut batch: Vec<IndexEntry> = Vec::with_capacity(NEW_FILE_BATCH_SIZE);
        let mut discovered_path_strings: Vec<String> = Vec::with_capacity(discovered.len());

        for path in &discovered {
            if cancel.load(Ordering::Relaxed) {
                break;
            }

            let path_str = canonical_path_best_effort(path);
            discovered_path_strings.push(path_str.clone());

            if self.activity.is_active() {
                self.activity.wait_until_idle(
                    self.activity.idle_threshold(),
                    Duration::from_millis(100),
                    cancel,
                );
                stats.paused_count += 1;
            }

            let outcome = self.process_one(path, &path_str, &mut batch);
            match outcome {
                ProcessResult::Unchanged => {}
                ProcessResult::New(content) => {
                    if let Some(audit) = self.audit {
                        audit.indexed(&path_str, &content);
                    }
                    stats.record(&FileOutcome::Indexed { chars: content.chars().count() }, true);
                }
                ProcessResult::Modified(content) => {
                    if let Some(audit) = self.audit {
                        audit.indexed(&path_str, &content);
                    }
                    stats.record(&FileOutcome::Indexed { chars: content.chars().count() }, false);
                }
                ProcessResult::Skipped(was_new, reason) => {
                    if let Some(audit) = self.audit {
                        audit.skipped(&path_str, &reason);
                    }
                    stats.record(&FileOutcome::Skipped(reason), was_new);
                }
                ProcessResult::Errored(was_new, msg) => {
                    if let Some(audit) = self.audit {
                        audit.errored(&path_str, &msg);
                    }
                    stats.record(&FileOutcome::Errored(msg), was_new);
                }
            }

            std::thread::sleep(INTER_FILE_PAUSE);
        }

        // Flush any remaining partial batch before reconciling, whether or
        // not the pass was cancelled — a cancellation commits what has
        // been committed and abandons the rest.
        if !batch.is_empty() {
            if let Err(e) = self.store.upsert_batch(&batch) {
                tracing::error!(error = %e, "batch flush failed mid-pass");
            }
            batch.clear();
        }

        // Reconcile phase — only for full-root passes, skipped on cancel.
        if !cancel.load(Ordering::Relaxed) {
            self.set_state(WorkerState::Reconciling);
            if let Ok(live_paths) = self.store.list_live_paths() {
                let discovered_set: std::collections::HashSet<&String> =
                    discovered_path_strings.iter().collect();
                for live_path in live_paths {
                    if !discovered_set.contains(&live_path) {
                        if let Err(e) = self.store.tombstone(&live_path) {
                            tracing::error!(path = %live_path, error = %e, "tombstone failed");
                        } else {
                            stats.tombstoned += 1;
                        }
                    }
                }
            }
        }

        // Maintenance phase.
        self.set_state(WorkerState::Maintaining);
        if let Err(e) = self.store.optimize() {
            tracing::warn!(error = %e, "optimize failed");
        }
        if let Err(e) = self.store.vacuum() {
            tracing::warn!(error = %e, "vacuum failed");
        }

        stats.end_time = Some(now_secs());
        stats
    }

    fn process_one(&self, path: &Path, path_str: &str, batch: &mut Vec<IndexEntry>) -> ProcessResult {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => return ProcessResult::Skipped(false, FailReason::TransientIO),
        };

        if metadata.len() > self.max_file_size_bytes {
            return ProcessResult::Skipped(false, FailReason::SizeExceeded);
        }

        let current_mtime = match metadata.modified() {
            Ok(t) => system_time_to_secs(t),
            Err(_) => return ProcessResult::Skipped(false, FailReason::TransientIO),
        };

        let stored_mtime = match self.store.get_mtime(path_str) {
            Ok(m) => m,
            Err(_) => return ProcessResult::Errored(false, "store.get_mtime failed".to_string()),
        };

        if let Some(stored) = stored_mtime {
            if (current_mtime - stored).abs() < MTIME_TOLERANCE_SECS {
                return ProcessResult::Unchanged;
            }
        }

        let is_new = stored_mtime.is_none();

        match extractors::extract_with_wrapper(self.registry, path) {
            Ok(extracted) => {
                if is_new {
                    batch.push(IndexEntry::live(path_str, &extracted.text, extracted.mtime));
                    if batch.len() >= NEW_FILE_BATCH_SIZE {
                        if let Err(e) = self.store.upsert_batch(batch) {
                            tracing::error!(error = %e, "batch upsert failed");
                            batch.clear();
                            return ProcessResult::Errored(true, "batch upsert failed".to_string());
                        }
                        batch.clear();
                    }
                    ProcessResult::New(extracted.text)
                } else {
                    if let Err(e) = self.store.upsert(path_str, &extracted.text, extracted.mtime) {
                        tracing::error!(error = %e, "point upsert failed");
                        return ProcessResult::Errored(false, "point upsert failed".to_string());
                    }
                    ProcessResult::Modified(extracted.text)
                }
            }
            Err(reason) => {
                if reason.is_retryable() {
                    self.retry_queue.offer(path_str, reason.clone());
                }
                ProcessResult::Skipped(is_new, reason)
            }
        }
    }
}

enum ProcessResult {
    Unchanged,
    New(String),
    Modified(String),
    Skipped(bool, FailReason),
    Errored(bool, String),
}

#[derive(Debug)]
pub struct WorkerBusy;

impl std::fmt::Display for WorkerBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "an index pass is already running")
    }
}

impl std::error::Error for WorkerBusy {}

//! Supervisor: process lifecycle. Owns startup ordering, the background
//! index-then-watch loop, and bounded-timeout shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::activity::ActivityMonitor;
use crate::audit_log::AuditLog;
use crate::config::{Config, ConfigError};
use crate::exclusion::ExclusionFilter;
use crate::extractors::ExtractorRegistry;
use crate::retry_queue::RetryQueue;
use crate::store::{Store, StoreError};
use crate::watcher::Watcher;
use crate::worker::IndexWorker;

const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const COMPONENT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub enum SupervisorError {
    Config(ConfigError),
    Store(StoreError),
    AuditLog(std::io::Error),
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::Config(e) => write!(f, "config error: {e}"),
            SupervisorError::Store(e) => write!(f, "store error: {e}"),
            SupervisorError::AuditLog(e) => write!(f, "audit log error: {e}"),
        }
    }
}

impl std::error::Error for SupervisorError {}

impl From<ConfigError> for SupervisorError {
    fn from(e: ConfigError) -> Self {
        SupervisorError::Config(e)
    }
}

impl From<StoreError> for SupervisorError {
    fn from(e: StoreError) -> Self {
        SupervisorError::Store(e)
    }
}

/// Long-lived process state, started once per run and shut down once.
/// Startup order is Store, then ActivityMonitor, then the background
/// index/watch loop. Shutdown reverses that order with bounded waits so a
/// stuck component cannot hang the process indefinitely.
pub struct Supervisor {
    config: Config,
    store: Arc<Store>,
    activity: Arc<ActivityMonitor>,
    filter: Arc<ExclusionFilter>,
    registry: Arc<ExtractorRegistry>,
    retry_queue: Arc<RetryQueue>,
    audit: Arc<AuditLog>,
    cancel: Arc<AtomicBool>,
    worker_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    watcher: std::sync::Mutex<Option<Watcher>>,
    shut_down: AtomicBool,
}

impl Supervisor {
    /// Install the process-wide tracing subscriber. Idempotent within a
    /// single process is the caller's responsibility — call this once.
    pub fn install_tracing() {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("filedex=info".parse().unwrap()),
            )
            .with_target(false)
            .init();
    }

    pub fn start(config_path: &std::path::Path) -> Result<Self, SupervisorError> {
        let config = Config::load(config_path)?;
        let store = Arc::new(Store::open(std::path::Path::new(&config.index_path))?);
        let activity = Arc::new(if config.enable_activity_monitor {
            ActivityMonitor::start(config.idle_threshold_secs)
        } else {
            ActivityMonitor::always_idle()
        });
        let filter = Arc::new(ExclusionFilter::new(&config.exclude_globs));
        let registry = Arc::new(ExtractorRegistry::new(
            &config.legacy_codepage,
            config.extraction_timeout_seconds,
            config.hwp_timeout_seconds,
        ));
        let retry_queue = Arc::new(RetryQueue::new());
        let audit = Arc::new(AuditLog::open(&config.log_dir).map_err(SupervisorError::AuditLog)?);
        let cancel = Arc::new(AtomicBool::new(false));

        tracing::info!(roots = ?config.roots, "supervisor starting");

        Ok(Self {
            config,
            store,
            activity,
            filter,
            registry,
            retry_queue,
            audit,
            cancel,
            worker_handle: std::sync::Mutex::new(None),
            watcher: std::sync::Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry_queue
    }

    pub fn activity(&self) -> &ActivityMonitor {
        &self.activity
    }

    /// Run one foreground index pass over the configured roots, e.g. for a
    /// one-shot `index` CLI invocation.
    pub fn run_index_once(&self) -> Result<crate::types::IndexStats, crate::worker::WorkerBusy> {
        let worker = IndexWorker::new(&self.store, &self.registry, &self.retry_queue, &self.activity, &self.filter)
            .with_audit_log(&self.audit)
            .with_max_file_size_bytes(self.config.max_file_size_bytes);
        let roots: Vec<PathBuf> = self.config.roots.iter().map(PathBuf::from).collect();
        worker.run(&roots, &self.cancel)
    }

    /// Start the background watch loop: an initial index pass, then a
    /// filesystem watcher for the remainder of the process lifetime, plus
    /// periodic retry-queue drains. Intended for the long-running `watch`
    /// CLI invocation.
    pub fn start_watch_loop(&self) {
        let roots: Vec<PathBuf> = self.config.roots.iter().map(PathBuf::from).collect();

        let watcher = Watcher::start(
            &roots,
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.filter),
            Arc::clone(&self.activity),
            Arc::clone(&self.cancel),
        );
        *self.watcher.lock().expect("watcher mutex poisoned") = watcher;

        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);
        let activity = Arc::clone(&self.activity);
        let filter = Arc::clone(&self.filter);
        let retry_queue = Arc::clone(&self.retry_queue);
        let audit = Arc::clone(&self.audit);
        let cancel = Arc::clone(&self.cancel);
        let retry_interval = Duration::from_secs(self.config.retry_interval_seconds);
        let tombstone_gc_days = self.config.tombstone_gc_days;
        let max_file_size_bytes = self.config.max_file_size_bytes;
        // A zero interval disables the periodic reindex; only the watcher
        // and retry queue keep the index current.
        let auto_index_interval = (self.config.auto_index_interval_minutes > 0)
            .then(|| Duration::from_secs(self.config.auto_index_interval_minutes * 60));

        let handle = std::thread::Builder::new()
            .name("index-worker".to_string())
            .spawn(move || {
                let worker = IndexWorker::new(&store, &registry, &retry_queue, &activity, &filter)
                    .with_audit_log(&audit)
                    .with_max_file_size_bytes(max_file_size_bytes);
                if let Err(e) = worker.run(&roots, &cancel) {
                    tracing::warn!(error = %e, "initial index pass skipped");
                }

                let mut last_retry = Instant::now();
                let mut last_auto_index = Instant::now();

                while !cancel.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(200));
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }

                    if last_retry.elapsed() >= retry_interval {
                        retry_queue.run_retry_pass(&store, &registry, &activity, &cancel);
                        if let Err(e) = store.gc_tombstones((tombstone_gc_days as f64) * 86_400.0) {
                            tracing::warn!(error = %e, "tombstone gc failed");
                        }
                        last_retry = Instant::now();
                    }

                    if let Some(interval) = auto_index_interval {
                        if last_auto_index.elapsed() >= interval {
                            // Behaves like a user-initiated index start: a
                            // run already in flight (there isn't one here,
                            // since this is the only caller of `worker`) is
                            // rejected rather than queued.
                            if let Err(e) = worker.run(&roots, &cancel) {
                                tracing::debug!(error = %e, "auto-index pass skipped");
                            }
                            last_auto_index = Instant::now();
                        }
                    }
                }
            })
            .expect("failed to spawn index-worker thread");

        *self.worker_handle.lock().expect("worker handle mutex poisoned") = Some(handle);
    }

    /// Idempotent shutdown: signals cancellation, waits (bounded) for the
    /// worker thread and watcher to settle, then flushes and closes the
    /// store.
    pub fn shutdown(&self) {
        if self
            .shut_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        tracing::info!("supervisor shutting down");
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.lock().expect("worker handle mutex poisoned").take() {
            join_with_timeout(handle, WORKER_SHUTDOWN_TIMEOUT, "index-worker");
        }

        if let Some(watcher) = self.watcher.lock().expect("watcher mutex poisoned").take() {
            join_with_timeout(watcher.into_debounce_handle(), COMPONENT_SHUTDOWN_TIMEOUT, "watcher");
        }

        // `rdev::listen` never returns on its own, so this join is expected
        // to time out on a host where the listener actually started; the
        // thread is then abandoned to the process exit, same as any other
        // shutdown-timeout case `join_with_timeout` logs.
        if let Some(handle) = self.activity.take_listener_handle() {
            join_with_timeout(handle, COMPONENT_SHUTDOWN_TIMEOUT, "activity-monitor");
        }

        if let Err(e) = self.store.optimize() {
            tracing::warn!(error = %e, "final optimize failed during shutdown");
        }

        tracing::info!("supervisor shutdown complete");
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Join a thread, logging (but not panicking on) a timeout. Threads that
/// run past their deadline are abandoned — std has no thread-kill
/// primitive, so the process exit is what ultimately reclaims them. Crucially,
/// the waiter thread itself is only joined once it has already signalled
/// completion: joining it unconditionally would block this function on
/// `handle`'s own lifetime again, silently erasing the timeout for a thread
/// (like the activity listener) that never returns on its own.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, label: &str) {
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let waiter = std::thread::spawn(move || {
        let _ = handle.join();
        let _ = done_tx.send(());
    });
    match done_rx.recv_timeout(timeout) {
        Ok(()) => {
            let _ = waiter.join();
        }
        Err(_) => {
            tracing::warn!(component = label, "shutdown timed out waiting for thread to finish");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_loads_default_config_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");
        let supervisor = Supervisor::start(&config_path);
        assert!(supervisor.is_ok());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");
        let supervisor = Supervisor::start(&config_path).unwrap();
        supervisor.shutdown();
        supervisor.shutdown();
    }

    #[test]
    fn shutdown_completes_within_a_bounded_time_with_activity_monitor_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");
        let supervisor = Supervisor::start(&config_path).unwrap();

        let start = std::time::Instant::now();
        supervisor.shutdown();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn disabling_activity_monitor_uses_the_always_idle_stub() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "enable_activity_monitor = false\n").unwrap();
        let supervisor = Supervisor::start(&config_path).unwrap();

        assert!(supervisor.activity().is_degraded());
        assert!(!supervisor.activity().is_active());
    }
}

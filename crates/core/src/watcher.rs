//! Filesystem watcher: incremental re-indexing driven by OS change
//! notifications rather than a full periodic crawl, with a debounce window
//! absorbing event bursts from editors that rewrite a file several times
//! per save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};

use crate::activity::ActivityMonitor;
use crate::exclusion::ExclusionFilter;
use crate::extractors::{self, ExtractorRegistry};
use crate::store::Store;
use crate::types::{canonical_path_best_effort, FailReason};

/// Debounce window: wait this long after the last event touching a path
/// before acting on it, so a save-as-several-writes burst collapses into
/// one extraction.
const DEBOUNCE_MS: u64 = 500;

/// The event kinds a path can settle on after debouncing. Multiple raw
/// `notify` events for the same path collapse to whichever of these was
/// most recent, which is what decides whether `handle_path` applies the
/// "only reindex an already-live path" gate (Modified) or not (Created).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchKind {
    Created,
    Modified,
    Removed,
}

pub struct Watcher {
    _inner: RecommendedWatcher,
    debounce_handle: std::thread::JoinHandle<()>,
}

impl Watcher {
    /// Start watching `roots` recursively. The returned `Watcher` must be
    /// kept alive for the duration of watching; dropping it stops delivery.
    /// Spawns a debounce-processing thread that lives until `cancel` is set
    /// and the underlying channel disconnects.
    pub fn start(
        roots: &[PathBuf],
        store: Arc<Store>,
        registry: Arc<ExtractorRegistry>,
        filter: Arc<ExclusionFilter>,
        activity: Arc<ActivityMonitor>,
        cancel: Arc<AtomicBool>,
    ) -> Option<Self> {
        let (tx, rx) = mpsc::channel::<Event>();

        let mut watcher = match RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        ) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "failed to create filesystem watcher");
                return None;
            }
        };

        for root in roots {
            if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
                tracing::error!(path = %root.display(), error = %e, "failed to watch root");
            } else {
                tracing::info!(path = %root.display(), "watching root");
            }
        }

        let debounce_handle = std::thread::Builder::new()
            .name("watcher-debounce".to_string())
            .spawn(move || debounce_loop(rx, &store, &registry, &filter, &activity, &cancel))
            .ok()?;

        Some(Self {
            _inner: watcher,
            debounce_handle,
        })
    }

    /// Stop delivering new events and hand back the debounce thread's handle
    /// so the caller can join it with its own bounded timeout.
    pub fn into_debounce_handle(self) -> std::thread::JoinHandle<()> {
        self.debounce_handle
    }
}

fn debounce_loop(
    rx: mpsc::Receiver<Event>,
    store: &Store,
    registry: &ExtractorRegistry,
    filter: &ExclusionFilter,
    activity: &ActivityMonitor,
    cancel: &AtomicBool,
) {
    let mut pending: HashMap<PathBuf, (Instant, WatchKind)> = HashMap::new();
    let mut in_flight: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(Duration::from_millis(DEBOUNCE_MS)) {
            Ok(event) => {
                let kind = match event.kind {
                    EventKind::Create(_) => Some(WatchKind::Created),
                    EventKind::Modify(_) => Some(WatchKind::Modified),
                    EventKind::Remove(_) => Some(WatchKind::Removed),
                    _ => None,
                };
                if let Some(kind) = kind {
                    let now = Instant::now();
                    for path in event.paths {
                        // A newer event always wins the slot; a burst of
                        // Modify events after a Create still ends on
                        // Created, which is what the liveness gate below
                        // needs to treat the path as brand new.
                        pending
                            .entry(path)
                            .and_modify(|(t, k)| {
                                *t = now;
                                if *k != WatchKind::Created {
                                    *k = kind;
                                }
                            })
                            .or_insert((now, kind));
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                let cutoff = Instant::now() - Duration::from_millis(DEBOUNCE_MS);
                let ready: Vec<(PathBuf, WatchKind)> = pending
                    .iter()
                    .filter(|(_, (t, _))| *t <= cutoff)
                    .map(|(p, (_, k))| (p.clone(), *k))
                    .collect();
                for (path, _) in &ready {
                    pending.remove(path);
                }
                for (path, kind) in ready {
                    if in_flight.contains(&path) {
                        continue;
                    }
                    in_flight.insert(path.clone());
                    if activity.is_active() {
                        activity.wait_until_idle(
                            activity.idle_threshold(),
                            Duration::from_millis(100),
                            cancel,
                        );
                    }
                    handle_path(&path, kind, store, registry, filter);
                    in_flight.remove(&path);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn handle_path(
    path: &Path,
    kind: WatchKind,
    store: &Store,
    registry: &ExtractorRegistry,
    filter: &ExclusionFilter,
) {
    if path.is_dir() {
        return;
    }
    if !filter.include(path) {
        return;
    }

    let path_str = canonical_path_best_effort(path);

    if kind == WatchKind::Removed || !path.exists() {
        if let Err(e) = store.tombstone(&path_str) {
            tracing::error!(path = %path_str, error = %e, "watcher tombstone failed");
        }
        return;
    }

    // Per the original file watcher's `on_modified` handler: a Modify event
    // on a path the store doesn't already know about is not indexed here —
    // only a Create event (or the periodic IndexWorker crawl) brings a new
    // path in. This keeps the watcher from reindexing a path that policy
    // excluded at the time of its last full pass but that a stray Modify
    // event still slips through for.
    if kind == WatchKind::Modified {
        match store.exists_live(&path_str) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!(path = %path_str, error = %e, "watcher liveness check failed");
                return;
            }
        }
    }

    match extractors::extract_with_wrapper(registry, path) {
        Ok(extracted) => {
            if let Err(e) = store.upsert(&path_str, &extracted.text, extracted.mtime) {
                tracing::error!(path = %path_str, error = %e, "watcher upsert failed");
            }
        }
        Err(FailReason::ExcludedByPolicy) => {}
        Err(reason) => {
            tracing::debug!(path = %path_str, reason = %reason, "watcher extraction skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_path_tombstones_a_since_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, "x").unwrap();

        let store = Store::open_in_memory().unwrap();
        let path_str = canonical_path_best_effort(&path);
        store.upsert(&path_str, "x", 1.0).unwrap();

        std::fs::remove_file(&path).unwrap();

        let registry = ExtractorRegistry::default();
        let filter = ExclusionFilter::new(&[]);
        handle_path(&path, WatchKind::Removed, &store, &registry, &filter);

        assert!(!store.exists_live(&path_str).unwrap());
    }

    #[test]
    fn handle_path_indexes_a_newly_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");
        std::fs::write(&path, "hello watcher").unwrap();

        let store = Store::open_in_memory().unwrap();
        let registry = ExtractorRegistry::default();
        let filter = ExclusionFilter::new(&[]);
        handle_path(&path, WatchKind::Created, &store, &registry, &filter);

        let path_str = canonical_path_best_effort(&path);
        assert!(store.exists_live(&path_str).unwrap());
        assert_eq!(store.search("watcher", 10).unwrap().len(), 1);
    }

    #[test]
    fn handle_path_ignores_excluded_paths() {
        let dir = tempfile::tempdir().unwrap();
        let excluded_dir = dir.path().join("node_modules");
        std::fs::create_dir(&excluded_dir).unwrap();
        let path = excluded_dir.join("skip.js");
        std::fs::write(&path, "x").unwrap();

        let store = Store::open_in_memory().unwrap();
        let registry = ExtractorRegistry::default();
        let filter = ExclusionFilter::new(&[]);
        handle_path(&path, WatchKind::Created, &store, &registry, &filter);

        let path_str = path.to_string_lossy().into_owned();
        assert!(!store.exists_live(&path_str).unwrap());
    }

    #[test]
    fn handle_path_ignores_modify_event_on_a_path_never_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untracked.txt");
        std::fs::write(&path, "hello watcher").unwrap();

        let store = Store::open_in_memory().unwrap();
        let registry = ExtractorRegistry::default();
        let filter = ExclusionFilter::new(&[]);
        handle_path(&path, WatchKind::Modified, &store, &registry, &filter);

        let path_str = canonical_path_best_effort(&path);
        assert!(!store.exists_live(&path_str).unwrap());
    }

    #[test]
    fn handle_path_reindexes_modify_event_on_an_already_live_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracked.txt");
        std::fs::write(&path, "original").unwrap();

        let store = Store::open_in_memory().unwrap();
        let path_str = canonical_path_best_effort(&path);
        store.upsert(&path_str, "original", 1.0).unwrap();

        std::fs::write(&path, "updated watcher content").unwrap();

        let registry = ExtractorRegistry::default();
        let filter = ExclusionFilter::new(&[]);
        handle_path(&path, WatchKind::Modified, &store, &registry, &filter);

        assert_eq!(store.search("updated", 10).unwrap().len(), 1);
    }
}

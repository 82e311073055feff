//! Global keyboard/mouse idle detector gating indexing work.
//!
//! Initialized once at startup and torn down once at shutdown (see
//! `Supervisor`); injected as a handle into IndexWorker, RetryQueue, and
//! Watcher rather than kept as a free-floating global, so tests can swap in
//! an always-idle stub.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::types::now_secs;

/// Process-wide activity signal. Construction spawns the listener thread(s)
/// (or, on hosts without global input hooks, degrades to "always idle").
pub struct ActivityMonitor {
    last_activity_at: Arc<AtomicU64>,
    idle_threshold_secs: f64,
    degraded: bool,
    listener_handle: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

/// Bit-pattern round-trip helpers so an `f64` timestamp can live in an
/// `AtomicU64`.
fn to_bits(t: f64) -> u64 {
    t.to_bits()
}
fn from_bits(bits: u64) -> f64 {
    f64::from_bits(bits)
}

impl ActivityMonitor {
    /// Start the global listener. `idle_threshold_secs` is the default
    /// threshold `is_active()` uses when none is supplied explicitly.
    pub fn start(idle_threshold_secs: f64) -> Self {
        let last_activity_at = Arc::new(AtomicU64::new(to_bits(now_secs())));
        let listener_result = Self::spawn_listener(Arc::clone(&last_activity_at));

        let degraded = listener_result.is_err();
        if degraded {
            tracing::warn!(
                "no global input hooks available on this host; activity monitor degraded to always-idle"
            );
        }

        Self {
            last_activity_at,
            idle_threshold_secs,
            degraded,
            listener_handle: std::sync::Mutex::new(listener_result.ok()),
        }
    }

    /// An always-idle stub for tests — no background thread, `is_active()`
    /// always returns false.
    pub fn always_idle() -> Self {
        Self {
            last_activity_at: Arc::new(AtomicU64::new(to_bits(now_secs() - 3600.0))),
            idle_threshold_secs: 2.0,
            degraded: true,
            listener_handle: std::sync::Mutex::new(None),
        }
    }

    /// A controllable stub for tests that need to observe gating behavior
    /// rather than bypass it: reports active until `seconds_since_last_activity`
    /// plus real elapsed wall-clock time passes `idle_threshold_secs`.
    #[cfg(test)]
    pub fn for_test(idle_threshold_secs: f64, seconds_since_last_activity: f64) -> Self {
        Self {
            last_activity_at: Arc::new(AtomicU64::new(to_bits(
                now_secs() - seconds_since_last_activity,
            ))),
            idle_threshold_secs,
            degraded: true,
            listener_handle: std::sync::Mutex::new(None),
        }
    }

    /// Take the listener thread's handle, if one was spawned (`start` on a
    /// host with working global input hooks). `rdev::listen` never returns
    /// on its own, so the caller is expected to join this with a bounded
    /// timeout rather than wait on it indefinitely.
    pub fn take_listener_handle(&self) -> Option<std::thread::JoinHandle<()>> {
        self.listener_handle
            .lock()
            .expect("listener handle mutex poisoned")
            .take()
    }

    /// Spawns the background listener thread. Returns `Err(())` only if the
    /// OS refuses to spawn the thread at all; a missing display server or
    /// lack of permission is instead reported by `rdev::listen` once the
    /// thread is already running, and is logged from inside it.
    fn spawn_listener(last_activity_at: Arc<AtomicU64>) -> Result<std::thread::JoinHandle<()>, ()> {
        std::thread::Builder::new()
            .name("activity-monitor".into())
            .spawn(move || {
                let callback = {
                    let last_activity_at = Arc::clone(&last_activity_at);
                    move |_event: rdev::Event| {
                        last_activity_at.store(to_bits(now_secs()), Ordering::Relaxed);
                    }
                };
                // Blocks the calling thread for the lifetime of the process.
                if let Err(e) = rdev::listen(callback) {
                    tracing::warn!(?e, "activity listener exited");
                }
            })
            .map_err(|_| ())
    }

    pub fn idle_duration(&self) -> f64 {
        now_secs() - from_bits(self.last_activity_at.load(Ordering::Relaxed))
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn idle_threshold(&self) -> f64 {
        self.idle_threshold_secs
    }

    pub fn is_active(&self) -> bool {
        self.idle_duration() < self.idle_threshold_secs
    }

    /// Poll `is_active()` at `poll_interval` until either the idle threshold
    /// is met or `cancel` fires. Sub-second `poll_interval` is a design
    /// requirement so the gate releases promptly once the user stops.
    pub fn wait_until_idle(&self, threshold: f64, poll_interval: Duration, cancel: &AtomicBool) {
        loop {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            if self.idle_duration() >= threshold {
                return;
            }
            std::thread::sleep(poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_idle_stub_reports_not_active() {
        let monitor = ActivityMonitor::always_idle();
        assert!(!monitor.is_active());
        assert!(monitor.idle_duration() >= 2.0);
    }

    #[test]
    fn wait_until_idle_returns_immediately_when_already_idle() {
        let monitor = ActivityMonitor::always_idle();
        let cancel = AtomicBool::new(false);
        let start = std::time::Instant::now();
        monitor.wait_until_idle(2.0, Duration::from_millis(10), &cancel);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn wait_until_idle_respects_cancel_signal() {
        let last_activity_at = Arc::new(AtomicU64::new(to_bits(now_secs())));
        let monitor = ActivityMonitor {
            last_activity_at,
            idle_threshold_secs: 2.0,
            degraded: true,
            listener_handle: std::sync::Mutex::new(None),
        };
        let cancel = AtomicBool::new(true);
        let start = std::time::Instant::now();
        monitor.wait_until_idle(2.0, Duration::from_millis(10), &cancel);
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[test]
    fn stub_constructors_have_no_listener_handle_to_take() {
        assert!(ActivityMonitor::always_idle().take_listener_handle().is_none());
        assert!(ActivityMonitor::for_test(1.0, 0.0).take_listener_handle().is_none());
    }
}

//! The safe-copy and deadline combinators shared by every format extractor.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::types::FailReason;

#[derive(Debug)]
pub struct ExtractError(pub String);

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extract: {}", self.0)
    }
}

impl std::error::Error for ExtractError {}

/// Copy `path` into a fresh, private temporary directory, so the extractor
/// never opens user data in place. Prefers `std::fs::copy` (an OS-level
/// copy that only needs read access to the source); there is no second-tier
/// raw byte-stream fallback distinct from `fs::copy` on any platform this
/// crate targets, so a copy failure is reported directly as `FileLocked`.
///
/// The returned `TempDir` owns the temporary directory and deletes it (and
/// the copy inside it) when dropped — on every exit path, success or
/// failure.
pub fn safe_copy(path: &Path) -> Result<tempfile::TempDir, ExtractError> {
    let dir = tempfile::tempdir().map_err(|e| ExtractError(e.to_string()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| ExtractError("path has no file name".to_string()))?;
    let dest = dir.path().join(file_name);
    std::fs::copy(path, &dest).map_err(|e| ExtractError(e.to_string()))?;
    Ok(dir)
}

/// Run `f` with a wall-clock deadline. `f` runs on a dedicated thread; if it
/// has not finished by `deadline`, the wrapper returns `Timeout` and lets
/// the orphaned thread finish in the background, discarding its result —
/// the caller's wall-clock cost is always bounded even though the
/// underlying library itself is not cooperatively cancellable.
pub fn run_with_deadline<F>(deadline: Duration, f: F) -> Result<String, FailReason>
where
    F: FnOnce() -> Result<String, FailReason> + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        // The receiver may already be gone (we timed out) — that's fine,
        // the send is best-effort and its result is discarded silently.
        let _ = tx.send(f());
    });

    match rx.recv_timeout(deadline) {
        Ok(result) => result,
        Err(_) => Err(FailReason::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_copy_produces_independent_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.txt");
        std::fs::write(&source, b"original").unwrap();

        let copy_dir = safe_copy(&source).unwrap();
        let copied = copy_dir.path().join("source.txt");
        assert_eq!(std::fs::read_to_string(&copied).unwrap(), "original");

        std::fs::write(&source, b"mutated").unwrap();
        assert_eq!(std::fs::read_to_string(&copied).unwrap(), "original");
    }

    #[test]
    fn run_with_deadline_returns_timeout_when_exceeded() {
        let result = run_with_deadline(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(500));
            Ok("too slow".to_string())
        });
        assert_eq!(result, Err(FailReason::Timeout));
    }

    #[test]
    fn run_with_deadline_returns_ok_when_fast_enough() {
        let result = run_with_deadline(Duration::from_secs(5), || Ok("fast".to_string()));
        assert_eq!(result, Ok("fast".to_string()));
    }
}

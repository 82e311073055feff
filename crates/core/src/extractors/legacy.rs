//! Legacy DOC / PPT / XLS / HWP extraction via the OS's office-automation
//! facility, re-architected per §9 behind a capability interface rather
//! than in-process automation with implicit global state and apartment
//! threading.
//!
//! Each invocation is specified to use a brand-new, hidden,
//! alert-suppressed, read-only session disjoint from any user session.
//! That facility is Windows-only COM automation (`win32com`/`pythoncom` in
//! the original implementation); binding to it is outside what this crate
//! can do portably, so the capability is probed once at startup and, on
//! every host this crate actually runs on, registers the stub below —
//! matching the spec's own fallback for "a backend unavailable on the
//! host": `UnsupportedFormat` is a terminal skip, not an error.

use std::path::Path;

use crate::types::FailReason;

use super::Extractor;

/// A legacy-format backend, swappable per platform. The only implementation
/// shipped here is `UnavailableBackend`; a Windows-specific COM-automation
/// backend would implement this trait and be selected by `probe()` instead.
trait LegacyBackend: Send + Sync {
    fn extract(&self, temp_path: &Path) -> Result<String, FailReason>;
}

struct UnavailableBackend;

impl LegacyBackend for UnavailableBackend {
    fn extract(&self, _temp_path: &Path) -> Result<String, FailReason> {
        Err(FailReason::UnsupportedFormat)
    }
}

pub struct LegacyOfficeExtractor {
    backend: Box<dyn LegacyBackend>,
}

impl LegacyOfficeExtractor {
    /// Probe for an available backend once at startup. Always resolves to
    /// the unavailable stub on this build.
    pub fn probe() -> Self {
        tracing::info!("legacy office-automation backend unavailable; .doc/.ppt/.xls/.hwp will be skipped as UnsupportedFormat");
        Self {
            backend: Box::new(UnavailableBackend),
        }
    }
}

impl Extractor for LegacyOfficeExtractor {
    fn extract(&self, temp_path: &Path) -> Result<String, FailReason> {
        self.backend.extract(temp_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_backend_returns_unsupported_format() {
        let extractor = LegacyOfficeExtractor::probe();
        let result = extractor.extract(Path::new("/tmp/does-not-matter.doc"));
        assert_eq!(result, Err(FailReason::UnsupportedFormat));
    }
}

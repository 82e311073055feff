//! Depth-first directory walk emitting candidate paths past the
//! ExclusionFilter, with directory-level pruning and cancellation support.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::exclusion::ExclusionFilter;

pub struct Crawler<'a> {
    filter: &'a ExclusionFilter,
}

impl<'a> Crawler<'a> {
    pub fn new(filter: &'a ExclusionFilter) -> Self {
        Self { filter }
    }

    /// Walk `root`, applying the ExclusionFilter at both directory level
    /// (pruning an entire subtree) and file level. Checks `cancel` between
    /// entries so a crawl can be aborted mid-walk.
    pub fn walk(&self, root: &Path, cancel: &AtomicBool) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .filter_entry({
                let filter = self.filter;
                move |entry| {
                    if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                        let name = entry.file_name().to_string_lossy();
                        return filter.include_dir(&name);
                    }
                    true
                }
            })
            .build();

        for entry in walker {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let path = entry.into_path();
            if self.filter.include(&path) {
                candidates.push(path);
            }
        }

        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_yields_included_files_and_prunes_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/skip.js"), "x").unwrap();

        let filter = ExclusionFilter::new(&[]);
        let crawler = Crawler::new(&filter);
        let cancel = AtomicBool::new(false);
        let found = crawler.walk(dir.path(), &cancel);

        assert!(found.iter().any(|p| p.ends_with("keep.txt")));
        assert!(!found.iter().any(|p| p.to_string_lossy().contains("node_modules")));
    }

    #[test]
    fn walk_respects_cancel_signal() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let filter = ExclusionFilter::new(&[]);
        let crawler = Crawler::new(&filter);
        let cancel = AtomicBool::new(true);
        let found = crawler.walk(dir.path(), &cancel);
        assert!(found.is_empty());
    }
}

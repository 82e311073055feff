//! filedex-core: local desktop file-content indexing and full-text search.
//!
//! Owns the persistent index (`store`), the directory walk and exclusion
//! policy (`crawler`, `exclusion`), per-format text extraction
//! (`extractors`), the background scheduler that ties them together
//! (`worker`), live filesystem change handling (`watcher`), user idle
//! detection (`activity`), failed-extraction retries (`retry_queue`), and
//! process lifecycle (`supervisor`).

pub mod activity;
pub mod audit_log;
pub mod config;
pub mod crawler;
pub mod exclusion;
pub mod extractors;
pub mod retry_queue;
pub mod store;
pub mod supervisor;
pub mod types;
pub mod watcher;
pub mod worker;

pub use config::Config;
pub use store::{SearchHit, Store};
pub use supervisor::Supervisor;
pub use types::{FailReason, IndexEntry, IndexStats};

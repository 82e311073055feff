//! Persistent full-text index with tombstone semantics and a search-history
//! table, backed by SQLite in WAL mode with an external-content FTS5 virtual
//! table kept in sync via triggers on the base table.

use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use crate::types::{now_secs, IndexEntry};

#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError(e.to_string())
    }
}

/// A single search hit: path, a highlighted snippet, the stored mtime, and
/// a relevance rank (lower is better; 0 for quoted-phrase hits).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub path: String,
    pub snippet: String,
    pub mtime: f64,
    pub rank: f64,
}

/// Characters with special meaning to the FTS5 query grammar. Rather than
/// attempt a literal backslash-escape (FTS5's grammar has no such
/// mechanism), every unquoted token is wrapped in double quotes, which
/// neutralizes all of these as ordinary token characters.
const FTS_SPECIAL: &[char] = &['-', '(', ')', '[', ']', '"', '*'];

/// Durable SQLite-backed store. Safe to share across threads via `Arc<Store>`
/// — all operations take the internal lock synchronously.
pub struct Store {
    conn: Mutex<Connection>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the index database at `path`, creating its parent
    /// directory if necessary.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError(format!("create_dir_all: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError(format!("open {}: {e}", path.display())))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database, for tests and short-lived tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS index_entries (
                path       TEXT PRIMARY KEY,
                content    TEXT NOT NULL,
                mtime      REAL NOT NULL,
                deleted    INTEGER NOT NULL DEFAULT 0,
                deleted_at REAL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS index_fts USING fts5(
                path, content,
                content=index_entries,
                content_rowid=rowid
            );

            CREATE TRIGGER IF NOT EXISTS index_entries_ai
                AFTER INSERT ON index_entries BEGIN
                    INSERT INTO index_fts(rowid, path, content)
                    VALUES (new.rowid, new.path, new.content);
                END;
            CREATE TRIGGER IF NOT EXISTS index_entries_ad
                AFTER DELETE ON index_entries BEGIN
                    INSERT INTO index_fts(index_fts, rowid, path, content)
                    VALUES ('delete', old.rowid, old.path, old.content);
                END;
            CREATE TRIGGER IF NOT EXISTS index_entries_au
                AFTER UPDATE ON index_entries BEGIN
                    INSERT INTO index_fts(index_fts, rowid, path, content)
                    VALUES ('delete', old.rowid, old.path, old.content);
                    INSERT INTO index_fts(rowid, path, content)
                    VALUES (new.rowid, new.path, new.content);
                END;

            CREATE TABLE IF NOT EXISTS search_history (
                keyword   TEXT PRIMARY KEY,
                last_used REAL NOT NULL
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError(format!("lock: {e}")))
    }

    // -----------------------------------------------------------------------
    // Index entries
    // -----------------------------------------------------------------------

    /// Insert or update a live entry, clearing any tombstone. Atomic.
    pub fn upsert(&self, path: &str, content: &str, mtime: f64) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO index_entries (path, content, mtime, deleted, deleted_at)
             VALUES (?1, ?2, ?3, 0, NULL)
             ON CONFLICT(path) DO UPDATE SET
                content = excluded.content,
                mtime = excluded.mtime,
                deleted = 0,
                deleted_at = NULL",
            params![path, content, mtime],
        )?;
        Ok(())
    }

    /// Atomic batch variant: persists all entries or none.
    pub fn upsert_batch(&self, entries: &[IndexEntry]) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT INTO index_entries (path, content, mtime, deleted, deleted_at)
                 VALUES (?1, ?2, ?3, 0, NULL)
                 ON CONFLICT(path) DO UPDATE SET
                    content = excluded.content,
                    mtime = excluded.mtime,
                    deleted = 0,
                    deleted_at = NULL",
                params![entry.path, entry.content, entry.mtime],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Mark an existing entry deleted with the current timestamp. No-op if
    /// the path is unknown.
    pub fn tombstone(&self, path: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE index_entries SET deleted = 1, deleted_at = ?2 WHERE path = ?1",
            params![path, now_secs()],
        )?;
        Ok(())
    }

    /// Clear the tombstone flag on an existing entry. No-op if unknown.
    pub fn untombstone(&self, path: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE index_entries SET deleted = 0, deleted_at = NULL WHERE path = ?1",
            params![path],
        )?;
        Ok(())
    }

    pub fn exists_live(&self, path: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM index_entries WHERE path = ?1 AND deleted = 0",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Stored mtime for a live entry; `None` if unknown or tombstoned.
    pub fn get_mtime(&self, path: &str) -> Result<Option<f64>, StoreError> {
        let conn = self.lock()?;
        let mtime: Option<f64> = conn
            .query_row(
                "SELECT mtime FROM index_entries WHERE path = ?1 AND deleted = 0",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(mtime)
    }

    /// Look up an entry regardless of tombstone state, tolerating case and
    /// path-separator mismatches per §4.1.1: exact match, then
    /// case-insensitive, then separator-swapped variants of both.
    pub fn get_detail(&self, path: &str) -> Result<Option<IndexEntry>, StoreError> {
        let conn = self.lock()?;
        for (branch, candidate) in crate::types::resolve_path_variants(path)
            .into_iter()
            .enumerate()
        {
            let row: Option<(String, String, f64, bool, Option<f64>)> = conn
                .query_row(
                    "SELECT path, content, mtime, deleted, deleted_at
                     FROM index_entries WHERE path = ?1 COLLATE NOCASE",
                    params![candidate],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get::<_, i64>(3)? != 0,
                            row.get(4)?,
                        ))
                    },
                )
                .optional()?;
            if let Some((found_path, content, mtime, deleted, deleted_at)) = row {
                tracing::debug!(branch, path = %found_path, "get_detail resolved");
                return Ok(Some(IndexEntry {
                    path: found_path,
                    content,
                    mtime,
                    deleted,
                    deleted_at,
                }));
            }
        }
        Ok(None)
    }

    pub fn list_live_paths(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT path FROM index_entries WHERE deleted = 0")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Search per §4.1.2: quoted phrase bypasses FTS for a literal
    /// case-sensitive substring match (rank 0); otherwise every token is
    /// quoted before being passed to FTS5, giving an implicit conjunctive
    /// MATCH ranked by `bm25()`.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let trimmed = query.trim();
        if let Some(phrase) = quoted_phrase(trimmed) {
            return self.search_literal(phrase, limit);
        }
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        let fts_query = quote_tokens(trimmed);
        match self.search_fts(&fts_query, limit) {
            Ok(hits) => Ok(hits),
            Err(_) => {
                let fallback = or_quoted_words(trimmed);
                self.search_fts(&fallback, limit)
            }
        }
    }

    fn search_literal(&self, phrase: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT path, content, mtime FROM index_entries
             WHERE deleted = 0 AND instr(content, ?1) > 0
             ORDER BY path ASC LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![phrase, limit as i64], |row| {
                let path: String = row.get(0)?;
                let content: String = row.get(1)?;
                let mtime: f64 = row.get(2)?;
                Ok(SearchHit {
                    path,
                    snippet: make_literal_snippet(&content, phrase),
                    mtime,
                    rank: 0.0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    fn search_fts(&self, fts_query: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT e.path, snippet(index_fts, 1, '**', '**', '...', 10), e.mtime,
                    bm25(index_fts) AS rank
             FROM index_fts f
             JOIN index_entries e ON e.rowid = f.rowid
             WHERE index_fts MATCH ?1 AND e.deleted = 0
             ORDER BY rank ASC, e.path ASC
             LIMIT ?2",
        )?;
        let hits = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok(SearchHit {
                    path: row.get(0)?,
                    snippet: row.get(1)?,
                    mtime: row.get(2)?,
                    rank: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Physically remove tombstoned entries older than `age_threshold_secs`.
    /// Returns the number removed.
    pub fn gc_tombstones(&self, age_threshold_secs: f64) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let cutoff = now_secs() - age_threshold_secs;
        let removed = conn.execute(
            "DELETE FROM index_entries WHERE deleted = 1 AND deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff],
        )?;
        Ok(removed as u64)
    }

    /// Rebuild the FTS index from the base table (compaction hook).
    pub fn optimize(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO index_fts(index_fts) VALUES ('optimize')", [])?;
        Ok(())
    }

    pub fn vacuum(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Search history
    // -----------------------------------------------------------------------

    pub fn history_add(&self, keyword: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO search_history (keyword, last_used) VALUES (?1, ?2)
             ON CONFLICT(keyword) DO UPDATE SET last_used = excluded.last_used",
            params![keyword, now_secs()],
        )?;
        Ok(())
    }

    pub fn history_list(&self, limit: usize) -> Result<Vec<(String, f64)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT keyword, last_used FROM search_history ORDER BY last_used DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn history_delete(&self, keyword: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM search_history WHERE keyword = ?1", params![keyword])?;
        Ok(())
    }

    pub fn history_clear(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM search_history", [])?;
        Ok(())
    }
}

fn quoted_phrase(query: &str) -> Option<&str> {
    if query.len() >= 2 && query.starts_with('"') && query.ends_with('"') {
        Some(&query[1..query.len() - 1])
    } else {
        None
    }
}

/// Wrap every whitespace-separated token in double quotes, stripping any
/// embedded special characters so the resulting FTS5 query is always
/// syntactically valid while still matching the conjunctive semantics of
/// §4.1.2.
fn quote_tokens(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| {
            let cleaned: String = tok.chars().filter(|c| !FTS_SPECIAL.contains(c)).collect();
            format!("\"{cleaned}\"")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn or_quoted_words(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| format!("\"{}\"", tok.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn make_literal_snippet(content: &str, phrase: &str) -> String {
    match content.find(phrase) {
        Some(idx) => {
            let start = content[..idx].char_indices().rev().nth(40).map(|(i, _)| i).unwrap_or(0);
            let end_idx = idx + phrase.len();
            let end = content[end_idx..]
                .char_indices()
                .nth(40)
                .map(|(i, _)| end_idx + i)
                .unwrap_or(content.len());
            format!("...{}...", &content[start..end])
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_search_returns_hit() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/root/a.txt", "hello world", 100.0).unwrap();
        let hits = store.search("world", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/root/a.txt");
    }

    #[test]
    fn quoted_phrase_bypasses_fts_and_is_case_sensitive() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/root/a.txt", "Hello World", 100.0).unwrap();
        assert!(store.search("\"Hello World\"", 10).unwrap().len() == 1);
        assert!(store.search("\"hello world\"", 10).unwrap().is_empty());
    }

    #[test]
    fn tombstoned_entries_excluded_from_search() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/root/a.txt", "hello world", 100.0).unwrap();
        store.tombstone("/root/a.txt").unwrap();
        assert!(store.search("world", 10).unwrap().is_empty());
        assert!(!store.exists_live("/root/a.txt").unwrap());
    }

    #[test]
    fn tombstone_then_upsert_clears_tombstone() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/root/a.txt", "hello", 100.0).unwrap();
        store.tombstone("/root/a.txt").unwrap();
        store.upsert("/root/a.txt", "hello again", 200.0).unwrap();
        let entry = store.get_detail("/root/a.txt").unwrap().unwrap();
        assert!(!entry.deleted);
        assert!(entry.deleted_at.is_none());
    }

    #[test]
    fn search_query_with_only_special_chars_returns_no_crash_no_results() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/root/a.txt", "hello world", 100.0).unwrap();
        let hits = store.search("---***", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn gc_tombstones_removes_only_old_enough_entries() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/root/a.txt", "x", 1.0).unwrap();
        store.tombstone("/root/a.txt").unwrap();
        let removed_immediately = store.gc_tombstones(3600.0).unwrap();
        assert_eq!(removed_immediately, 0);
        let removed_now = store.gc_tombstones(-1.0).unwrap();
        assert_eq!(removed_now, 1);
    }

    #[test]
    fn get_detail_resolves_case_insensitive_match() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/Root/A.txt", "x", 1.0).unwrap();
        let found = store.get_detail("/root/a.txt").unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn upsert_batch_is_atomic_and_visible_together() {
        let store = Store::open_in_memory().unwrap();
        let entries = vec![
            IndexEntry::live("/root/a.txt", "alpha", 1.0),
            IndexEntry::live("/root/b.txt", "beta", 1.0),
        ];
        store.upsert_batch(&entries).unwrap();
        assert_eq!(store.list_live_paths().unwrap().len(), 2);
    }

    #[test]
    fn search_history_upserts_on_reuse() {
        let store = Store::open_in_memory().unwrap();
        store.history_add("rust").unwrap();
        store.history_add("rust").unwrap();
        let history = store.history_list(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].0, "rust");
    }

    #[test]
    fn korean_and_latin_queries_both_match() {
        let store = Store::open_in_memory().unwrap();
        store.upsert("/root/ko.txt", "안녕하세요 world", 1.0).unwrap();
        assert_eq!(store.search("world", 10).unwrap().len(), 1);
        assert_eq!(store.search("안녕하세요", 10).unwrap().len(), 1);
    }
}

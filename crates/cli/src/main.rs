//! filedex CLI — index and search local files from the terminal.
//!
//! Calls `filedex-core` directly with no transport layer in between.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use filedex_core::config::Config;
use filedex_core::store::Store;
use filedex_core::supervisor::Supervisor;

/// filedex — local desktop file-content indexing and search.
#[derive(Parser)]
#[command(name = "filedex", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "filedex.toml")]
    config: PathBuf,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single foreground index pass over the configured roots
    Index,
    /// Run an initial index pass, then watch the configured roots for changes
    Watch,
    /// Search the index
    Search {
        /// Search query. Wrap in quotes for a literal phrase match.
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show index status: live entries, tombstones, recent searches
    Status,
    /// Wipe the index and start fresh
    ClearIndex,
}

fn main() {
    Supervisor::install_tracing();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Index => run_index(&cli.config, cli.json),
        Commands::Watch => run_watch(&cli.config),
        Commands::Search { query, limit } => run_search(&cli.config, &query, limit, cli.json),
        Commands::Status => run_status(&cli.config, cli.json),
        Commands::ClearIndex => run_clear_index(&cli.config),
    };

    std::process::exit(exit_code);
}

fn run_index(config_path: &std::path::Path, json: bool) -> i32 {
    let supervisor = match Supervisor::start(config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to start: {e}");
            return 1;
        }
    };

    match supervisor.run_index_once() {
        Ok(stats) => {
            if json {
                let output = serde_json::json!({
                    "discovered": stats.total_discovered,
                    "indexed": stats.indexed,
                    "new": stats.new,
                    "modified": stats.modified,
                    "skipped": stats.skipped,
                    "errored": stats.errored,
                    "tombstoned": stats.tombstoned,
                    "paused_count": stats.paused_count,
                });
                println!("{}", serde_json::to_string_pretty(&output).unwrap());
            } else {
                println!("discovered:  {}", stats.total_discovered);
                println!("indexed:     {} (new: {}, modified: {})", stats.indexed, stats.new, stats.modified);
                println!("skipped:     {}", stats.skipped);
                println!("errored:     {}", stats.errored);
                println!("tombstoned:  {}", stats.tombstoned);
                println!("paused:      {} (activity gate)", stats.paused_count);
            }
            0
        }
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

fn run_watch(config_path: &std::path::Path) -> i32 {
    let supervisor = match Supervisor::start(config_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("failed to start: {e}");
            return 1;
        }
    };

    let shutdown_requested = Arc::new(std::sync::atomic::AtomicBool::new(false));
    {
        let shutdown_requested = Arc::clone(&shutdown_requested);
        let handler_result = ctrlc::set_handler(move || {
            tracing::info!("received shutdown signal");
            shutdown_requested.store(true, Ordering::SeqCst);
        });
        if let Err(e) = handler_result {
            tracing::warn!(error = %e, "failed to install signal handler; watch will only stop on process kill");
        }
    }

    supervisor.start_watch_loop();

    while !shutdown_requested.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    supervisor.shutdown();
    0
}

fn run_search(config_path: &std::path::Path, query: &str, limit: usize, json: bool) -> i32 {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return 1;
        }
    };
    let store = match Store::open(&config.index_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to open index: {e}");
            return 1;
        }
    };

    let hits = match store.search(query, limit) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("search failed: {e}");
            return 1;
        }
    };

    let _ = store.history_add(query);

    if json {
        let items: Vec<serde_json::Value> = hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "path": h.path,
                    "snippet": h.snippet,
                    "mtime": h.mtime,
                    "rank": h.rank,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items).unwrap());
    } else {
        if hits.is_empty() {
            eprintln!("No results for '{query}'");
            return 1;
        }
        for hit in &hits {
            println!("{}", hit.path);
            println!("  {}", hit.snippet);
        }
        eprintln!("\n{} results", hits.len());
    }
    0
}

fn run_status(config_path: &std::path::Path, json: bool) -> i32 {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return 1;
        }
    };
    let store = match Store::open(&config.index_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to open index: {e}");
            return 1;
        }
    };

    let live = store.list_live_paths().map(|p| p.len()).unwrap_or(0);
    let history = store.history_list(5).unwrap_or_default();

    if json {
        let output = serde_json::json!({
            "index_path": config.index_path.display().to_string(),
            "live_entries": live,
            "recent_searches": history.iter().map(|(k, _)| k).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
    } else {
        println!("index:          {}", config.index_path.display());
        println!("live entries:   {live}");
        println!("recent searches:");
        for (keyword, _) in &history {
            println!("  {keyword}");
        }
    }
    0
}

fn run_clear_index(config_path: &std::path::Path) -> i32 {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return 1;
        }
    };

    if config.index_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.index_path) {
            eprintln!("failed to remove index: {e}");
            return 1;
        }
    }
    println!("index cleared: {}", config.index_path.display());
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_subcommand_is_rejected() {
        let result = Cli::try_parse_from(["filedex", "bogus-command"]);
        assert!(result.is_err());
    }

    #[test]
    fn known_subcommands_parse() {
        assert!(Cli::try_parse_from(["filedex", "index"]).is_ok());
        assert!(Cli::try_parse_from(["filedex", "watch"]).is_ok());
        assert!(Cli::try_parse_from(["filedex", "search", "hello"]).is_ok());
        assert!(Cli::try_parse_from(["filedex", "status"]).is_ok());
        assert!(Cli::try_parse_from(["filedex", "clear-index"]).is_ok());
    }
}

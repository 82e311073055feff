//! Process-wide configuration, loaded from an optional TOML file with
//! built-in defaults for every recognized key.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub roots: Vec<PathBuf>,
    pub index_path: PathBuf,
    pub log_dir: PathBuf,
    pub exclude_globs: Vec<String>,
    pub legacy_codepage: String,
    pub enable_activity_monitor: bool,
    pub idle_threshold_secs: f64,
    pub auto_index_interval_minutes: u64,
    pub retry_interval_seconds: u64,
    pub max_file_size_bytes: u64,
    pub extraction_timeout_seconds: u64,
    pub hwp_timeout_seconds: u64,
    pub tombstone_gc_days: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            index_path: PathBuf::from("index.sqlite3"),
            log_dir: PathBuf::from("logs"),
            exclude_globs: Vec::new(),
            legacy_codepage: "CP949".to_string(),
            enable_activity_monitor: true,
            idle_threshold_secs: 2.0,
            auto_index_interval_minutes: 30,
            retry_interval_seconds: 300,
            max_file_size_bytes: 100 * 1024 * 1024,
            extraction_timeout_seconds: 60,
            hwp_timeout_seconds: 30,
            tombstone_gc_days: 30,
        }
    }
}

#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError(e.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError(e.to_string())
    }
}

impl Config {
    /// Load from a TOML file, falling back to `Config::default()` for any
    /// key the file omits. A missing file is not an error — it behaves as
    /// an empty one.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.idle_threshold_secs, 2.0);
        assert_eq!(config.tombstone_gc_days, 30);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "idle_threshold_secs = 5.0\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.idle_threshold_secs, 5.0);
        assert_eq!(config.retry_interval_seconds, 300);
        assert!(config.enable_activity_monitor);
    }
}

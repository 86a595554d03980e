use std::path::{Path, PathBuf};

use thiserror::Error;

const MEMORY_URL: &str = "sqlite::memory:";
const FILE_PREFIX: &str = "sqlite://";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid --db value: {raw}")]
    InvalidDbUrl { raw: String },
}

/// Runtime settings resolved from flags and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_url: String,
    pub log_filter: String,
}

impl AppConfig {
    #[must_use]
    pub fn new(raw_db: &str, log_filter: impl Into<String>) -> Self {
        Self {
            db_url: normalize_sqlite_url(raw_db),
            log_filter: log_filter.into(),
        }
    }

    /// Whether the database lives only in this process.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        is_in_memory(&self.db_url)
    }
}

fn is_in_memory(url: &str) -> bool {
    url == MEMORY_URL || url.contains("mode=memory")
}

/// Turn a bare path or `sqlite:` path into an absolute `sqlite://` URL.
///
/// In-memory URLs and URLs already in `sqlite://` form pass through.
#[must_use]
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if is_in_memory(trimmed) || trimmed.starts_with(FILE_PREFIX) {
        return trimmed.to_owned();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("{FILE_PREFIX}{}", absolute.display())
}

/// Path of the database file behind a `sqlite://` URL, or `None` for in-memory URLs.
///
/// # Errors
///
/// Returns `ConfigError::InvalidDbUrl` if the URL is not `sqlite://<path>`.
pub fn sqlite_file_path(db_url: &str) -> Result<Option<PathBuf>, ConfigError> {
    if is_in_memory(db_url) {
        return Ok(None);
    }

    let invalid = || ConfigError::InvalidDbUrl {
        raw: db_url.to_owned(),
    };
    let path = db_url.strip_prefix(FILE_PREFIX).ok_or_else(invalid)?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(invalid());
    }
    Ok(Some(PathBuf::from(path)))
}

/// Make sure the database file and its parent directories exist.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the file cannot be created.
pub fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_file_path(db_url)? else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_and_full_urls_pass_through() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:file:memdb_cli?mode=memory&cache=shared"),
            "sqlite:file:memdb_cli?mode=memory&cache=shared"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:///var/lib/progression.sqlite3"),
            "sqlite:///var/lib/progression.sqlite3"
        );
    }

    #[test]
    fn relative_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/progression.sqlite3");
        let path = sqlite_file_path(&url).unwrap().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("data/progression.sqlite3"));

        let config = AppConfig::new("/tmp/p.sqlite3", "info");
        assert_eq!(config.db_url, "sqlite:///tmp/p.sqlite3");
        assert!(!config.is_in_memory());
    }

    #[test]
    fn file_path_drops_query_and_rejects_garbage() {
        assert_eq!(
            sqlite_file_path("sqlite:///tmp/p.sqlite3?mode=rwc").unwrap(),
            Some(PathBuf::from("/tmp/p.sqlite3"))
        );
        assert_eq!(sqlite_file_path("sqlite::memory:").unwrap(), None);
        assert!(matches!(
            sqlite_file_path("postgres://db"),
            Err(ConfigError::InvalidDbUrl { .. })
        ));
        assert!(sqlite_file_path("sqlite://").is_err());
    }
}

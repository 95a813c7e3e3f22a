//! Runtime configuration for taxonomy editors and the smoke CLI.
//!
//! # Invariants
//! - Every field is optional in the JSON document; missing fields take the
//!   defaults below, unknown fields are rejected.
//! - `log_dir = None` leaves file logging disabled.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::logging::{default_log_level, init_logging};
use crate::tree::guard::CycleCheckScope;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Errors from loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid taxonomy config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Taxonomy runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaxonomyConfig {
    /// SQLite file; `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,
    /// `trace|debug|info|warn|error`; `None` uses `default_log_level()`.
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files.
    pub log_dir: Option<PathBuf>,
    pub cycle_check: CycleCheckScope,
}

impl TaxonomyConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(Into::into)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn effective_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }

    /// Starts file logging when `log_dir` is set.
    ///
    /// Returns `Ok(false)` when logging is disabled by configuration.
    pub fn init_logging(&self) -> Result<bool, String> {
        let Some(log_dir) = &self.log_dir else {
            return Ok(false);
        };
        let log_dir = log_dir
            .to_str()
            .ok_or_else(|| format!("log_dir is not valid UTF-8: `{}`", log_dir.display()))?;
        init_logging(self.effective_log_level(), log_dir)?;
        Ok(true)
    }

    /// Opens the configured database with migrations applied.
    pub fn open_connection(&self) -> DbResult<Connection> {
        match &self.database_path {
            Some(path) => open_db(path),
            None => open_db_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, TaxonomyConfig};
    use crate::tree::guard::CycleCheckScope;
    use std::path::PathBuf;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TaxonomyConfig::from_json_str("{}").unwrap();
        assert_eq!(config, TaxonomyConfig::default());
        assert_eq!(config.cycle_check, CycleCheckScope::FullSubtree);
        assert!(!config.init_logging().unwrap());
    }

    #[test]
    fn parses_all_fields() {
        let config = TaxonomyConfig::from_json_str(
            r#"{
                "database_path": "/tmp/taxonomy.sqlite3",
                "log_level": "warn",
                "log_dir": "/tmp/taxonomy-logs",
                "cycle_check": "loaded_only"
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/tmp/taxonomy.sqlite3"))
        );
        assert_eq!(config.effective_log_level(), "warn");
        assert_eq!(config.cycle_check, CycleCheckScope::LoadedOnly);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_scope() {
        let unknown = TaxonomyConfig::from_json_str(r#"{"db": "x"}"#).unwrap_err();
        assert!(matches!(unknown, ConfigError::Parse(_)));

        let bad_scope =
            TaxonomyConfig::from_json_str(r#"{"cycle_check": "sometimes"}"#).unwrap_err();
        assert!(bad_scope.to_string().contains("invalid taxonomy config"));
    }

    #[test]
    fn load_reports_missing_file_path() {
        let err = TaxonomyConfig::load("/definitely/missing/taxonomy.json").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/definitely/missing/taxonomy.json"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn in_memory_connection_when_no_path() {
        let conn = TaxonomyConfig::default().open_connection().unwrap();
        let version: u32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, crate::db::migrations::latest_version());
    }
}

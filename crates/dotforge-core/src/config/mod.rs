//! Driver configuration and backend kinds

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default maximum open connections in a pool
const DEFAULT_MAX_OPEN: u32 = 5;

/// Default maximum idle connections in a pool
const DEFAULT_MAX_IDLE: u32 = 2;

/// Default maximum connection lifetime in seconds
const DEFAULT_MAX_LIFETIME_SECS: u64 = 30 * 60;

/// Storage engine a driver talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded file database (SQLite)
    Sqlite,
    /// In-memory embedded database (SQLite `:memory:`)
    Memory,
    /// Networked relational database (PostgreSQL)
    Postgres,
}

impl BackendKind {
    /// Stable string tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
            Self::Postgres => "postgres",
        }
    }

    /// Migration script subdirectory for this kind.
    ///
    /// The in-memory backend runs the same engine as the file backend and
    /// shares its script set.
    pub fn script_dir(&self) -> &'static str {
        match self {
            Self::Sqlite | Self::Memory => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "memory" | ":memory:" => Ok(Self::Memory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(Error::UnsupportedBackend(other.to_string())),
        }
    }
}

/// TLS mode for networked backends, passed through as a libpq-style string
pub const SSL_MODE_DISABLE: &str = "disable";

/// Configuration describing how to reach a backend.
///
/// Immutable once handed to a driver constructor; the constructed driver
/// copies what it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    pub kind: BackendKind,

    /// Database file path (file-backed kinds only)
    #[serde(default)]
    pub path: PathBuf,

    // Networked backend settings
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    // Pool sizing
    #[serde(default = "default_max_open")]
    pub max_open: u32,
    #[serde(default = "default_max_idle")]
    pub max_idle: u32,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

fn default_ssl_mode() -> String {
    SSL_MODE_DISABLE.to_string()
}

fn default_max_open() -> u32 {
    DEFAULT_MAX_OPEN
}

fn default_max_idle() -> u32 {
    DEFAULT_MAX_IDLE
}

fn default_max_lifetime_secs() -> u64 {
    DEFAULT_MAX_LIFETIME_SECS
}

impl DriverConfig {
    /// Create a config for a file-backed SQLite database
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Sqlite,
            path: path.into(),
            ..Self::empty(BackendKind::Sqlite)
        }
    }

    /// Create a config for an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        let mut config = Self::empty(BackendKind::Memory);
        // In-memory databases live inside a single connection
        config.max_open = 1;
        config.max_idle = 1;
        config
    }

    /// Create a config for a networked PostgreSQL database
    pub fn postgres(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            ..Self::empty(BackendKind::Postgres)
        }
    }

    fn empty(kind: BackendKind) -> Self {
        Self {
            kind,
            path: PathBuf::new(),
            host: String::new(),
            port: 0,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            ssl_mode: default_ssl_mode(),
            max_open: DEFAULT_MAX_OPEN,
            max_idle: DEFAULT_MAX_IDLE,
            max_lifetime_secs: DEFAULT_MAX_LIFETIME_SECS,
        }
    }

    /// Set the maximum number of open connections
    pub fn max_open(mut self, max: u32) -> Self {
        self.max_open = max;
        self
    }

    /// Set the TLS mode for networked backends
    pub fn ssl_mode(mut self, mode: impl Into<String>) -> Self {
        self.ssl_mode = mode.into();
        self
    }

    /// Maximum connection lifetime as a [`Duration`]
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Resolve the database file path for file-backed kinds.
    ///
    /// Expands a leading `~`, makes the path absolute, and creates the parent
    /// directory. Runs once at config-resolution time, not on every call.
    pub fn resolved(mut self) -> Result<Self> {
        if self.kind != BackendKind::Sqlite {
            return Ok(self);
        }
        if self.path.as_os_str().is_empty() {
            return Err(Error::ConfigError(
                "sqlite backend requires a database file path".to_string(),
            ));
        }

        let expanded = expand_home(&self.path)?;
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            env::current_dir()?.join(expanded)
        };
        if let Some(parent) = absolute.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        self.path = absolute;
        Ok(self)
    }
}

/// Expand a leading `~` or `~/` to the user's home directory
fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(stripped) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir()
        .ok_or_else(|| Error::ConfigError("could not determine home directory".to_string()))?;
    Ok(home.join(stripped))
}

/// Get the Dotforge config directory path.
///
/// Honors the `DOTFORGE_CONFIG_DIR` environment variable override.
pub fn config_dir() -> Result<PathBuf> {
    let dir = if let Ok(custom_dir) = env::var("DOTFORGE_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        dirs::config_dir()
            .ok_or_else(|| Error::ConfigError("could not determine config directory".to_string()))?
            .join("dotforge")
    };
    Ok(dir)
}

/// Get the default database path
pub fn default_database_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("dotforge.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert_eq!(
            "sqlite3".parse::<BackendKind>().unwrap(),
            BackendKind::Sqlite
        );
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!(
            "postgresql".parse::<BackendKind>().unwrap(),
            BackendKind::Postgres
        );
        assert_eq!("pg".parse::<BackendKind>().unwrap(), BackendKind::Postgres);

        let err = "oracle".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedBackend(name) if name == "oracle"));
    }

    #[test]
    fn test_memory_maps_to_sqlite_scripts() {
        assert_eq!(BackendKind::Memory.script_dir(), "sqlite");
        assert_eq!(BackendKind::Sqlite.script_dir(), "sqlite");
        assert_eq!(BackendKind::Postgres.script_dir(), "postgres");
    }

    #[test]
    fn test_in_memory_uses_single_connection() {
        let config = DriverConfig::in_memory();
        assert_eq!(config.kind, BackendKind::Memory);
        assert_eq!(config.max_open, 1);
    }

    #[test]
    fn test_resolved_creates_parent_and_absolutizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("df.db");
        let config = DriverConfig::sqlite(&path).resolved().unwrap();

        assert!(config.path.is_absolute());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_resolved_rejects_empty_sqlite_path() {
        let config = DriverConfig {
            path: PathBuf::new(),
            ..DriverConfig::sqlite("unused")
        };
        assert!(matches!(
            config.resolved(),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_resolved_is_noop_for_networked_kinds() {
        let config = DriverConfig::postgres("db.internal", 5432, "dotforge", "df", "s3cret");
        let resolved = config.clone().resolved().unwrap();
        assert_eq!(resolved.host, config.host);
        assert_eq!(resolved.path, PathBuf::new());
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home(Path::new("~/x/y.db")).unwrap();
            assert_eq!(expanded, home.join("x/y.db"));
        }
        // Paths without the shorthand pass through untouched
        let plain = expand_home(Path::new("/tmp/z.db")).unwrap();
        assert_eq!(plain, PathBuf::from("/tmp/z.db"));
    }
}

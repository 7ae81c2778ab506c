//! Version gate: skip the schema probe when the binary version is unchanged
//!
//! The gate caches the last-seen application version in a small text file
//! under the config directory. The cache is advisory only; when it is stale
//! or missing the migration manager re-derives schema state from the
//! backend's own bookkeeping. A wrong or lost cache file costs one extra
//! probe, never a skipped correctness check.

use crate::config;
use crate::error::Result;
use crate::migrate::{MigrationManager, ScriptSet};
use crate::storage::driver::Driver;
use std::fs;
use std::path::PathBuf;

/// File name of the version cache inside the config directory
const VERSION_FILE: &str = "version";

/// Persists the last-run application version and short-circuits migration
/// checks while it is unchanged.
#[derive(Debug, Clone)]
pub struct VersionGate {
    path: PathBuf,
}

impl VersionGate {
    /// Gate backed by the default version file under the config directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: config::config_dir()?.join(VERSION_FILE),
        })
    }

    /// Gate backed by an explicit file path (tests, alternate layouts)
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Last application version recorded, or None on first run
    pub fn stored_version(&self) -> Option<String> {
        let contents = fs::read_to_string(&self.path).ok()?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Persist `version` as the new stored value
    pub fn record(&self, version: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, version)?;
        Ok(())
    }

    /// Pure decision: does this stored/current pair require a migration check?
    pub fn should_migrate(stored: Option<&str>, current: &str) -> bool {
        stored != Some(current)
    }

    /// Run the migration check, skipping all backend I/O when the stored
    /// version matches `current_version`.
    ///
    /// Returns whether migrations were applied. After a successful check or
    /// apply the current version is persisted; a persist failure is logged
    /// and swallowed, since re-running an up-to-date apply on the next start
    /// is a harmless no-op.
    pub async fn run_if_needed(
        &self,
        driver: &dyn Driver,
        scripts: &ScriptSet,
        current_version: &str,
    ) -> Result<bool> {
        let stored = self.stored_version();
        if !Self::should_migrate(stored.as_deref(), current_version) {
            tracing::debug!(version = current_version, "Schema check skipped; version unchanged");
            return Ok(false);
        }

        tracing::info!(
            stored = stored.as_deref().unwrap_or("<none>"),
            current = current_version,
            "Version changed; checking schema"
        );

        let manager = MigrationManager::new(driver);
        let pending = manager.check_pending(scripts).await?;
        if pending {
            manager.apply(scripts).await?;
        }

        if let Err(e) = self.record(current_version) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist version file; next start will re-check"
            );
        }
        Ok(pending)
    }
}

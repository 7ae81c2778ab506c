//! Schema migrations
//!
//! The manager keeps the backend's schema in step with the script set from
//! [`source`]. Bookkeeping lives in a single-row `schema_migrations` table
//! (applied version + dirty flag) inside the backend itself; that row is the
//! authoritative record of schema state. The version-gate file in [`gate`]
//! only caches the last binary version to skip the check, never to replace it.

pub mod gate;
pub mod source;

pub use gate::VersionGate;
pub use source::{Migration, ScriptSet};

use crate::error::{Error, Result};
use crate::storage::dialect::{Dialect, dialect_for};
use crate::storage::driver::{Driver, Value};

/// Bookkeeping table name, shared by every backend kind
const STATE_TABLE: &str = "schema_migrations";

/// Applied version and dirty flag read from the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaState {
    pub version: i64,
    pub dirty: bool,
}

/// Result of advancing the schema by one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Applied(u64),
    NoChange,
}

/// Snapshot of migration progress, for logging and introspection
#[derive(Debug, Clone, Copy)]
pub struct MigrationStatus {
    pub current_version: i64,
    pub dirty: bool,
    pub latest_version: u64,
}

/// Applies versioned migration scripts to one driver's backend.
pub struct MigrationManager<'a> {
    driver: &'a dyn Driver,
    dialect: &'static dyn Dialect,
}

impl<'a> MigrationManager<'a> {
    pub fn new(driver: &'a dyn Driver) -> Self {
        let dialect = dialect_for(driver.kind());
        Self { driver, dialect }
    }

    /// Whether outstanding scripts exist for this backend.
    ///
    /// Externally read-only: when the version row is present and clean, the
    /// check probes by advancing exactly one step and stepping back, so the
    /// observed applied version is unchanged afterwards. The probe reuses the
    /// same step machinery as [`apply`](Self::apply), so check and apply can
    /// never disagree about what counts as pending.
    ///
    /// A database with no version row reports pending without probing;
    /// first-time setup belongs to [`apply`](Self::apply).
    pub async fn check_pending(&self, scripts: &ScriptSet) -> Result<bool> {
        self.ensure_state_table().await?;
        let state = match self.read_state().await? {
            None => {
                tracing::debug!("No schema version recorded; treating database as new");
                return Ok(true);
            }
            Some(state) => state,
        };
        if state.dirty {
            return Err(Error::DirtySchema {
                version: state.version,
            });
        }

        match self.step_up(scripts).await? {
            StepOutcome::NoChange => Ok(false),
            StepOutcome::Applied(version) => {
                tracing::debug!(version, "Probe step applied; reverting");
                self.step_down(scripts).await?;
                // Put back the exact pre-probe bookkeeping row. Stepping down
                // from the first script clears the row, which would erase a
                // recorded version 0.
                self.write_state(state.version, state.dirty).await?;
                Ok(true)
            }
        }
    }

    /// Advance the schema to the latest script version.
    ///
    /// Nothing pending is success, not an error.
    pub async fn apply(&self, scripts: &ScriptSet) -> Result<()> {
        self.ensure_state_table().await?;
        if let Some(state) = self.read_state().await? {
            if state.dirty {
                return Err(Error::DirtySchema {
                    version: state.version,
                });
            }
        }

        let mut applied = 0usize;
        loop {
            match self.step_up(scripts).await? {
                StepOutcome::Applied(version) => {
                    tracing::info!(version, "Applied migration");
                    applied += 1;
                }
                StepOutcome::NoChange => break,
            }
        }

        // A fresh database with nothing to apply still gets its version row,
        // so later checks see an initialized schema instead of a new one.
        if self.read_state().await?.is_none() {
            self.write_state(0, false).await?;
        }

        tracing::info!(
            applied,
            current_version = self.read_state().await?.map(|s| s.version).unwrap_or(0),
            "Migrations up to date"
        );
        Ok(())
    }

    /// Read-only snapshot of current schema state against a script set
    pub async fn status(&self, scripts: &ScriptSet) -> Result<MigrationStatus> {
        self.ensure_state_table().await?;
        let state = self.read_state().await?;
        Ok(MigrationStatus {
            current_version: state.map(|s| s.version).unwrap_or(0),
            dirty: state.map(|s| s.dirty).unwrap_or(false),
            latest_version: scripts.latest_version(),
        })
    }

    async fn ensure_state_table(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {STATE_TABLE} (\
                 version BIGINT NOT NULL, \
                 dirty BOOLEAN NOT NULL\
             )"
        );
        self.driver.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn read_state(&self) -> Result<Option<SchemaState>> {
        let sql = format!("SELECT version, dirty FROM {STATE_TABLE}");
        let row = self.driver.query_one(&sql, &[]).await?;
        Ok(row.map(|row| SchemaState {
            version: row.get_i64("version").unwrap_or(0),
            dirty: row.get_bool("dirty").unwrap_or(false),
        }))
    }

    /// Replace the bookkeeping row (delete-then-insert keeps it single-row)
    async fn write_state(&self, version: i64, dirty: bool) -> Result<()> {
        self.driver
            .execute(&format!("DELETE FROM {STATE_TABLE}"), &[])
            .await?;
        let sql = format!(
            "INSERT INTO {STATE_TABLE} (version, dirty) VALUES ({}, {})",
            self.dialect.placeholder(1),
            self.dialect.boolean(dirty),
        );
        self.driver.execute(&sql, &[Value::Integer(version)]).await?;
        Ok(())
    }

    async fn clear_state(&self) -> Result<()> {
        self.driver
            .execute(&format!("DELETE FROM {STATE_TABLE}"), &[])
            .await?;
        Ok(())
    }

    /// Apply the next outstanding script, if any.
    ///
    /// The dirty flag is set before the script runs and cleared after, so an
    /// interruption is visible as a dirty schema rather than a silent
    /// half-applied state.
    async fn step_up(&self, scripts: &ScriptSet) -> Result<StepOutcome> {
        let current = self.read_state().await?.map(|s| s.version).unwrap_or(0);
        let Some(migration) = scripts.next_after(current.max(0) as u64) else {
            return Ok(StepOutcome::NoChange);
        };

        self.write_state(migration.version as i64, true).await?;
        self.run_script(migration, &migration.up_sql).await?;
        self.write_state(migration.version as i64, false).await?;
        Ok(StepOutcome::Applied(migration.version))
    }

    /// Revert the most recently applied script
    async fn step_down(&self, scripts: &ScriptSet) -> Result<StepOutcome> {
        let Some(state) = self.read_state().await? else {
            return Ok(StepOutcome::NoChange);
        };
        let current = state.version.max(0) as u64;
        let Some(migration) = scripts.at(current) else {
            return Err(Error::MigrationApply {
                version: current,
                name: String::new(),
                message: "no script found for the applied version".to_string(),
            });
        };
        let Some(down_sql) = migration.down_sql.as_deref() else {
            return Err(Error::MigrationApply {
                version: migration.version,
                name: migration.name.clone(),
                message: "missing down script".to_string(),
            });
        };

        self.write_state(migration.version as i64, true).await?;
        self.run_script(migration, down_sql).await?;
        match scripts.prev_before(current) {
            Some(prev) => self.write_state(prev as i64, false).await?,
            None => self.clear_state().await?,
        }
        Ok(StepOutcome::Applied(migration.version))
    }

    /// Run one script atomically.
    ///
    /// The transaction statements travel inside the batch itself, and a batch
    /// runs on a single connection, so the script either commits whole or
    /// rolls back whole. On failure the rollback is best effort; the dirty
    /// flag set by the caller is the durable failure record.
    async fn run_script(&self, migration: &Migration, sql: &str) -> Result<()> {
        let script = sql.trim().trim_end_matches(';');
        let wrapped = format!("BEGIN;\n{script};\nCOMMIT;");
        if let Err(e) = self.driver.execute_batch(&wrapped).await {
            let _ = self.driver.execute_batch("ROLLBACK").await;
            return Err(Error::MigrationApply {
                version: migration.version,
                name: migration.name.clone(),
                message: e.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendKind, DriverConfig};
    use crate::storage::sqlite::SqliteDriver;
    use std::fs;
    use std::path::Path;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    async fn memory_driver() -> SqliteDriver {
        init_tracing();
        let driver = SqliteDriver::new(&DriverConfig::in_memory()).unwrap();
        driver.connect().await.unwrap();
        driver
    }

    fn write_scripts(root: &Path, files: &[(&str, &str)]) {
        let dir = root.join("sqlite");
        fs::create_dir_all(&dir).unwrap();
        for (name, sql) in files {
            fs::write(dir.join(name), sql).unwrap();
        }
    }

    fn two_step_scripts(root: &Path) {
        write_scripts(
            root,
            &[
                (
                    "0001_ecosystems.up.sql",
                    "CREATE TABLE ecosystems (id TEXT PRIMARY KEY, name TEXT NOT NULL);",
                ),
                ("0001_ecosystems.down.sql", "DROP TABLE ecosystems;"),
                (
                    "0002_apps.up.sql",
                    "CREATE TABLE apps (id TEXT PRIMARY KEY, name TEXT NOT NULL);",
                ),
                ("0002_apps.down.sql", "DROP TABLE apps;"),
            ],
        );
    }

    #[tokio::test]
    async fn test_fresh_database_reports_pending_without_probing() {
        let driver = memory_driver().await;
        let root = tempfile::tempdir().unwrap();
        two_step_scripts(root.path());
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();

        let manager = MigrationManager::new(&driver);
        assert!(manager.check_pending(&scripts).await.unwrap());

        // The check must not have initialized anything
        let state = manager.read_state().await.unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_apply_then_check_clean() {
        let driver = memory_driver().await;
        let root = tempfile::tempdir().unwrap();
        two_step_scripts(root.path());
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();

        let manager = MigrationManager::new(&driver);
        manager.apply(&scripts).await.unwrap();
        assert!(!manager.check_pending(&scripts).await.unwrap());

        let status = manager.status(&scripts).await.unwrap();
        assert_eq!(status.current_version, 2);
        assert_eq!(status.latest_version, 2);
        assert!(!status.dirty);

        // Both tables exist
        driver
            .query_many("SELECT * FROM ecosystems", &[])
            .await
            .unwrap();
        driver.query_many("SELECT * FROM apps", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let driver = memory_driver().await;
        let root = tempfile::tempdir().unwrap();
        two_step_scripts(root.path());
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();

        let manager = MigrationManager::new(&driver);
        manager.apply(&scripts).await.unwrap();
        manager.apply(&scripts).await.unwrap();

        let status = manager.status(&scripts).await.unwrap();
        assert_eq!(status.current_version, 2);
    }

    #[tokio::test]
    async fn test_probe_leaves_version_unchanged() {
        let driver = memory_driver().await;

        // Apply only the first script, then check against the full set
        let partial = tempfile::tempdir().unwrap();
        write_scripts(
            partial.path(),
            &[
                (
                    "0001_ecosystems.up.sql",
                    "CREATE TABLE ecosystems (id TEXT PRIMARY KEY, name TEXT NOT NULL);",
                ),
                ("0001_ecosystems.down.sql", "DROP TABLE ecosystems;"),
            ],
        );
        let full = tempfile::tempdir().unwrap();
        two_step_scripts(full.path());

        let partial_set = ScriptSet::load(partial.path(), BackendKind::Memory).unwrap();
        let full_set = ScriptSet::load(full.path(), BackendKind::Memory).unwrap();

        let manager = MigrationManager::new(&driver);
        manager.apply(&partial_set).await.unwrap();

        for _ in 0..3 {
            assert!(manager.check_pending(&full_set).await.unwrap());
            let state = manager.read_state().await.unwrap().unwrap();
            assert_eq!(state.version, 1);
            assert!(!state.dirty);
        }

        // The probe's revert removed the second table again
        assert!(driver.query_many("SELECT * FROM apps", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_dirty_schema_is_fatal() {
        let driver = memory_driver().await;
        let root = tempfile::tempdir().unwrap();
        two_step_scripts(root.path());
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();

        let manager = MigrationManager::new(&driver);
        manager.apply(&scripts).await.unwrap();
        manager.write_state(2, true).await.unwrap();

        assert!(matches!(
            manager.check_pending(&scripts).await,
            Err(Error::DirtySchema { version: 2 })
        ));
        assert!(matches!(
            manager.apply(&scripts).await,
            Err(Error::DirtySchema { version: 2 })
        ));
    }

    #[tokio::test]
    async fn test_failed_script_leaves_dirty_flag() {
        let driver = memory_driver().await;
        let root = tempfile::tempdir().unwrap();
        write_scripts(root.path(), &[("0001_bad.up.sql", "CREATE BOGUS SYNTAX;")]);
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();

        let manager = MigrationManager::new(&driver);
        let err = manager.apply(&scripts).await.unwrap_err();
        assert!(matches!(err, Error::MigrationApply { version: 1, .. }));

        let state = manager.read_state().await.unwrap().unwrap();
        assert_eq!(state.version, 1);
        assert!(state.dirty);
    }

    #[tokio::test]
    async fn test_failed_script_applies_atomically() {
        let driver = memory_driver().await;
        let root = tempfile::tempdir().unwrap();
        write_scripts(
            root.path(),
            &[(
                "0001_partial.up.sql",
                "CREATE TABLE survivors (x INTEGER);\nCREATE BOGUS SYNTAX;",
            )],
        );
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();

        let manager = MigrationManager::new(&driver);
        assert!(manager.apply(&scripts).await.is_err());

        // The statement before the failure was rolled back with the script
        assert!(
            driver
                .query_many("SELECT * FROM survivors", &[])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_probe_preserves_version_zero_row() {
        let driver = memory_driver().await;
        let manager = MigrationManager::new(&driver);

        // An apply with no scripts records version 0
        let empty_root = tempfile::tempdir().unwrap();
        let empty = ScriptSet::load(empty_root.path(), BackendKind::Memory).unwrap();
        manager.apply(&empty).await.unwrap();
        assert_eq!(
            manager.read_state().await.unwrap(),
            Some(SchemaState {
                version: 0,
                dirty: false
            })
        );

        // Scripts appearing later are pending, and the check must leave the
        // version-0 row exactly as it found it
        let root = tempfile::tempdir().unwrap();
        two_step_scripts(root.path());
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();

        assert!(manager.check_pending(&scripts).await.unwrap());
        assert_eq!(
            manager.read_state().await.unwrap(),
            Some(SchemaState {
                version: 0,
                dirty: false
            })
        );
    }

    #[tokio::test]
    async fn test_empty_script_set_initializes_on_apply() {
        let driver = memory_driver().await;
        let root = tempfile::tempdir().unwrap();
        let scripts = ScriptSet::load(root.path(), BackendKind::Memory).unwrap();
        assert!(scripts.is_empty());

        let manager = MigrationManager::new(&driver);
        assert!(manager.check_pending(&scripts).await.unwrap());
        manager.apply(&scripts).await.unwrap();
        assert!(!manager.check_pending(&scripts).await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_without_down_script_fails() {
        let driver = memory_driver().await;
        let partial = tempfile::tempdir().unwrap();
        write_scripts(partial.path(), &[("0001_a.up.sql", "CREATE TABLE a (x INTEGER);")]);
        let full = tempfile::tempdir().unwrap();
        write_scripts(
            full.path(),
            &[
                ("0001_a.up.sql", "CREATE TABLE a (x INTEGER);"),
                ("0002_b.up.sql", "CREATE TABLE b (x INTEGER);"),
            ],
        );

        let manager = MigrationManager::new(&driver);
        manager
            .apply(&ScriptSet::load(partial.path(), BackendKind::Memory).unwrap())
            .await
            .unwrap();

        let full_set = ScriptSet::load(full.path(), BackendKind::Memory).unwrap();
        let err = manager.check_pending(&full_set).await.unwrap_err();
        assert!(matches!(
            err,
            Error::MigrationApply { version: 2, ref message, .. } if message.contains("down")
        ));
    }

    #[tokio::test]
    async fn test_repo_migrations_apply_cleanly() {
        // The shipped script tree must always apply to a fresh database
        let driver = memory_driver().await;
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
        let scripts = ScriptSet::load(&root, BackendKind::Memory).unwrap();
        assert!(!scripts.is_empty());

        let manager = MigrationManager::new(&driver);
        manager.apply(&scripts).await.unwrap();
        assert!(!manager.check_pending(&scripts).await.unwrap());
        driver
            .query_many("SELECT * FROM credentials", &[])
            .await
            .unwrap();
    }
}

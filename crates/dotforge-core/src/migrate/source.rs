//! Migration script discovery
//!
//! Scripts live in one root directory with a subdirectory per backend kind
//! (the in-memory kind shares the `sqlite/` tree). Each migration is a pair
//! of `NNNN_name.up.sql` / `NNNN_name.down.sql` files; the numeric prefix is
//! the version. Files without a valid numeric prefix are ignored.

use crate::config::BackendKind;
use crate::error::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One versioned up/down script pair
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u64,
    pub name: String,
    pub up_sql: String,
    pub down_sql: Option<String>,
}

/// Ordered set of migrations for one backend kind
#[derive(Debug, Clone, Default)]
pub struct ScriptSet {
    migrations: Vec<Migration>,
}

impl ScriptSet {
    /// Load the script subset for a backend kind from a script root.
    ///
    /// A missing subdirectory yields an empty set, not an error.
    pub fn load(root: &Path, kind: BackendKind) -> Result<Self> {
        let dir = root.join(kind.script_dir());
        if !dir.is_dir() {
            return Ok(Self::default());
        }

        struct Pending {
            name: String,
            up_sql: Option<String>,
            down_sql: Option<String>,
        }
        let mut pending: BTreeMap<u64, Pending> = BTreeMap::new();

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some((version, name, is_up)) = parse_script_name(file_name) else {
                continue;
            };
            let sql = fs::read_to_string(entry.path())?;
            let slot = pending.entry(version).or_insert_with(|| Pending {
                name: name.to_string(),
                up_sql: None,
                down_sql: None,
            });
            if is_up {
                slot.up_sql = Some(sql);
            } else {
                slot.down_sql = Some(sql);
            }
        }

        // A version exists only once it has an up script; orphan down
        // scripts are ignored like any other unmatched file.
        let migrations = pending
            .into_iter()
            .filter_map(|(version, slot)| {
                slot.up_sql.map(|up_sql| Migration {
                    version,
                    name: slot.name,
                    up_sql,
                    down_sql: slot.down_sql,
                })
            })
            .collect();

        Ok(Self { migrations })
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Numeric prefix of the highest up script, or 0 for an empty set
    pub fn latest_version(&self) -> u64 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    /// The first migration strictly after `version`
    pub fn next_after(&self, version: u64) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.version > version)
    }

    /// The migration at exactly `version`
    pub fn at(&self, version: u64) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.version == version)
    }

    /// The highest version strictly before `version`
    pub fn prev_before(&self, version: u64) -> Option<u64> {
        self.migrations
            .iter()
            .rev()
            .find(|m| m.version < version)
            .map(|m| m.version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }
}

/// Parse `NNNN_name.up.sql` / `NNNN_name.down.sql`.
///
/// Returns (version, name, is_up), or None for anything that does not match.
/// Version 0 is reserved for "no migrations applied" and is never a valid
/// script version.
fn parse_script_name(file_name: &str) -> Option<(u64, &str, bool)> {
    let (stem, is_up) = if let Some(stem) = file_name.strip_suffix(".up.sql") {
        (stem, true)
    } else if let Some(stem) = file_name.strip_suffix(".down.sql") {
        (stem, false)
    } else {
        return None;
    };

    let (prefix, name) = stem.split_once('_').unwrap_or((stem, ""));
    let version = prefix.parse::<u64>().ok()?;
    if version == 0 {
        return None;
    }
    Some((version, name, is_up))
}

//! Per-backend SQL fragment generation
//!
//! Stateless strategy objects, one per storage engine. The embedded-file and
//! in-memory kinds run the same engine and share [`SqliteDialect`].

use crate::config::BackendKind;

/// SQL syntax strategy for one backend kind
pub trait Dialect: Send + Sync {
    /// Dialect identifier
    fn name(&self) -> &'static str;

    /// Parameter placeholder for the given 1-based index.
    ///
    /// - SQLite: positional `?`
    /// - PostgreSQL: numbered `$1`, `$2`, ...
    fn placeholder(&self, index: usize) -> String;

    /// Current-timestamp expression
    fn now(&self) -> &'static str;

    /// Boolean literal.
    ///
    /// SQLite stores booleans as integers; PostgreSQL has true literals.
    fn boolean(&self, value: bool) -> &'static str;

    /// Upsert clause for `INSERT ... <clause>`.
    ///
    /// Empty when either column list is empty; otherwise a conflict target on
    /// `conflict_columns` that sets every update column to the incoming value.
    fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> String;

    /// LIMIT/OFFSET clause.
    ///
    /// Empty when `limit <= 0`; `LIMIT n` when `offset <= 0`; otherwise
    /// `LIMIT n OFFSET m`.
    fn limit_offset(&self, limit: i64, offset: i64) -> String {
        if limit <= 0 {
            String::new()
        } else if offset <= 0 {
            format!("LIMIT {limit}")
        } else {
            format!("LIMIT {limit} OFFSET {offset}")
        }
    }
}

/// Dialect for the embedded-file and in-memory kinds
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn now(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn boolean(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> String {
        if conflict_columns.is_empty() || update_columns.is_empty() {
            return String::new();
        }
        let updates: Vec<String> = update_columns
            .iter()
            .map(|col| format!("{col} = excluded.{col}"))
            .collect();
        format!(
            "ON CONFLICT({}) DO UPDATE SET {}",
            conflict_columns.join(", "),
            updates.join(", ")
        )
    }
}

/// Dialect for the networked-relational kind
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn now(&self) -> &'static str {
        "NOW()"
    }

    fn boolean(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn upsert_clause(&self, conflict_columns: &[&str], update_columns: &[&str]) -> String {
        if conflict_columns.is_empty() || update_columns.is_empty() {
            return String::new();
        }
        let updates: Vec<String> = update_columns
            .iter()
            .map(|col| format!("{col} = EXCLUDED.{col}"))
            .collect();
        format!(
            "ON CONFLICT ({}) DO UPDATE SET {}",
            conflict_columns.join(", "),
            updates.join(", ")
        )
    }
}

static SQLITE: SqliteDialect = SqliteDialect;
static POSTGRES: PostgresDialect = PostgresDialect;

/// Select the dialect for a backend kind.
///
/// Total over [`BackendKind`]. The SQLite dialect is the deliberate default
/// for any kind without its own strategy, since every embedded kind shares
/// that engine.
pub fn dialect_for(kind: BackendKind) -> &'static dyn Dialect {
    match kind {
        BackendKind::Postgres => &POSTGRES,
        BackendKind::Sqlite | BackendKind::Memory => &SQLITE,
    }
}

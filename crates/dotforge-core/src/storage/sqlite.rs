//! SQLite driver for the embedded-file and in-memory backend kinds

use crate::config::{BackendKind, DriverConfig};
use crate::error::{Error, Result};
use crate::storage::driver::{Driver, ExecResult, Row, Transaction, Value};
use async_trait::async_trait;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Row as _, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use tokio::sync::Mutex;

/// Driver for SQLite, covering both the file-backed and in-memory kinds.
///
/// One instance owns one connection pool. The pool opens lazily on first use
/// or explicitly via [`Driver::connect`].
pub struct SqliteDriver {
    kind: BackendKind,
    config: DriverConfig,
    dsn: String,
    migration_dsn: String,
    pool: Mutex<Option<SqlitePool>>,
}

impl SqliteDriver {
    /// Build a driver from config. Resolves the database file path once here.
    pub fn new(config: &DriverConfig) -> Result<Self> {
        let config = config.clone().resolved()?;
        let (dsn, migration_dsn) = match config.kind {
            BackendKind::Memory => (
                "sqlite::memory:".to_string(),
                "sqlite3://:memory:".to_string(),
            ),
            _ => (
                format!("sqlite://{}?mode=rwc", config.path.display()),
                format!("sqlite3://{}", config.path.display()),
            ),
        };
        Ok(Self {
            kind: config.kind,
            config,
            dsn,
            migration_dsn,
            pool: Mutex::new(None),
        })
    }

    /// Pool handle, connecting lazily if needed
    async fn pool(&self) -> Result<SqlitePool> {
        if let Some(pool) = self.pool.lock().await.clone() {
            return Ok(pool);
        }
        self.connect().await?;
        self.pool
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::connection("sqlite", "pool closed during connect"))
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn connect(&self) -> Result<()> {
        // The slot lock is held across pool construction so concurrent
        // connects cannot each build a pool and drop all but one.
        let mut slot = self.pool.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let connect_options = SqliteConnectOptions::from_str(&self.dsn)
            .map_err(|e| Error::connection("sqlite", e))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(self.config.max_open)
            .min_connections(self.config.max_idle.min(self.config.max_open));

        // An in-memory database lives inside its single connection; recycling
        // it would drop the schema.
        if self.kind == BackendKind::Memory {
            pool_options = pool_options
                .max_lifetime(None)
                .idle_timeout(None)
                .min_connections(1);
        } else {
            pool_options = pool_options.max_lifetime(self.config.max_lifetime());
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::connection("sqlite", e))?;

        tracing::debug!(dsn = %self.dsn, "Connected to SQLite database");
        *slot = Some(pool);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::debug!(dsn = %self.dsn, "Closed SQLite database");
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| Error::query("sqlite", "ping", e))?;
        Ok(())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let pool = self.pool().await?;
        let result = bind_values(sqlx::query(sql), args)
            .execute(&pool)
            .await
            .map_err(|e| Error::query("sqlite", "execute", e))?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let pool = self.pool().await?;
        sqlx::raw_sql(sql)
            .execute(&pool)
            .await
            .map_err(|e| Error::query("sqlite", "execute_batch", e))?;
        Ok(())
    }

    async fn query_one(&self, sql: &str, args: &[Value]) -> Result<Option<Row>> {
        let pool = self.pool().await?;
        let row = bind_values(sqlx::query(sql), args)
            .fetch_optional(&pool)
            .await
            .map_err(|e| Error::query("sqlite", "query_one", e))?;
        row.map(decode_row).transpose()
    }

    async fn query_many(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let pool = self.pool().await?;
        let rows = bind_values(sqlx::query(sql), args)
            .fetch_all(&pool)
            .await
            .map_err(|e| Error::query("sqlite", "query_many", e))?;
        rows.into_iter().map(decode_row).collect()
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let pool = self.pool().await?;
        let tx = pool
            .begin()
            .await
            .map_err(|e| Error::query("sqlite", "begin", e))?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    fn dsn(&self) -> &str {
        &self.dsn
    }

    fn migration_dsn(&self) -> &str {
        &self.migration_dsn
    }
}

struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let result = bind_values(sqlx::query(sql), args)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| Error::query("sqlite", "execute", e))?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| Error::query("sqlite", "commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| Error::query("sqlite", "rollback", e))
    }
}

fn bind_values<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    args: &'q [Value],
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Integer(i) => query.bind(*i),
            Value::Real(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Bool(b) => query.bind(*b),
            Value::Blob(b) => query.bind(b.as_slice()),
        };
    }
    query
}

fn decode_row(row: SqliteRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        let raw = row
            .try_get_raw(i)
            .map_err(|e| Error::query("sqlite", "decode", e))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::Integer(
                    row.try_get::<i64, _>(i)
                        .map_err(|e| Error::query("sqlite", "decode", e))?,
                ),
                "REAL" => Value::Real(
                    row.try_get::<f64, _>(i)
                        .map_err(|e| Error::query("sqlite", "decode", e))?,
                ),
                "BLOB" => Value::Blob(
                    row.try_get::<Vec<u8>, _>(i)
                        .map_err(|e| Error::query("sqlite", "decode", e))?,
                ),
                _ => Value::Text(
                    row.try_get::<String, _>(i)
                        .map_err(|e| Error::query("sqlite", "decode", e))?,
                ),
            }
        };
        values.push(value);
    }
    Ok(Row::new(columns, values))
}

//! Backend-agnostic driver capability surface
//!
//! [`Driver`] is the one interface the rest of the application talks to a
//! database through. Concrete implementations live in [`crate::storage::sqlite`]
//! and [`crate::storage::postgres`]; [`crate::storage::compat`] bridges the old
//! blocking interface onto it.

use crate::config::BackendKind;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A database value, independent of any backend's native representation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl Value {
    /// Text contents, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Boolean contents. SQLite surfaces booleans as 0/1 integers, so those
    /// are accepted too.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(0) => Some(false),
            Self::Integer(1) => Some(true),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One result row with named column access
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Value of a column by name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecResult {
    /// Rows affected by the statement
    pub rows_affected: u64,
    /// Last insert rowid, where the backend reports one (SQLite)
    pub last_insert_id: Option<i64>,
}

/// An open transaction on a driver's connection.
///
/// Dropped without [`commit`](Transaction::commit), the transaction rolls back.
#[async_trait]
pub trait Transaction: Send {
    /// Execute a single statement inside the transaction
    async fn execute(&mut self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll the transaction back
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A live handle to one backend, owning one connection pool.
///
/// Lifetime runs from a successful [`connect`](Driver::connect) to
/// [`close`](Driver::close). `connect` is idempotent and `close` is a benign
/// no-op when called twice.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend kind tag
    fn kind(&self) -> BackendKind;

    /// Open the underlying connection pool. Idempotent; no automatic retry.
    async fn connect(&self) -> Result<()>;

    /// Release the underlying connection pool
    async fn close(&self) -> Result<()>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Execute a statement that returns no rows
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult>;

    /// Execute a raw multi-statement batch (migration scripts).
    ///
    /// The whole batch runs on a single connection, so a batch carrying its
    /// own BEGIN/COMMIT executes atomically.
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Fetch the first matching row, if any. Extra rows are discarded.
    async fn query_one(&self, sql: &str, args: &[Value]) -> Result<Option<Row>>;

    /// Fetch all matching rows.
    ///
    /// Rows are materialized before returning, so the pooled connection is
    /// released on every exit path.
    async fn query_many(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// Begin a transaction. Backends without transaction support fail with
    /// [`Error::UnsupportedOperation`].
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Native connection string, derived from the driver's config
    fn dsn(&self) -> &str;

    /// Migration-tool connection string, derived from the driver's config
    fn migration_dsn(&self) -> &str;

    /// [`execute`](Driver::execute) racing a cancellation token
    async fn execute_with(
        &self,
        token: &CancellationToken,
        sql: &str,
        args: &[Value],
    ) -> Result<ExecResult> {
        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            result = self.execute(sql, args) => result,
        }
    }

    /// [`query_one`](Driver::query_one) racing a cancellation token
    async fn query_one_with(
        &self,
        token: &CancellationToken,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Row>> {
        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            result = self.query_one(sql, args) => result,
        }
    }

    /// [`query_many`](Driver::query_many) racing a cancellation token
    async fn query_many_with(
        &self,
        token: &CancellationToken,
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<Row>> {
        tokio::select! {
            _ = token.cancelled() => Err(Error::Cancelled),
            result = self.query_many(sql, args) => result,
        }
    }
}

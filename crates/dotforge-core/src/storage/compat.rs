//! Backward-compatibility adapter for the old blocking storage interface
//!
//! Earlier Dotforge releases exposed a synchronous connection handle. This
//! adapter bridges such a handle onto [`Driver`] so legacy integrations keep
//! working while the rest of the application moves to the async surface.
//! Capabilities the old interface never had fail closed instead of silently
//! degrading.

use crate::config::BackendKind;
use crate::error::{Error, Result};
use crate::storage::driver::{Driver, ExecResult, Row, Transaction, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// The old blocking connection interface.
///
/// Implementations must be cheap to call from a blocking thread; the adapter
/// moves every call off the async runtime with `spawn_blocking`.
pub trait LegacyConn: Send + Sync {
    /// Execute a statement, returning rows affected
    fn execute(&self, sql: &str, args: &[Value]) -> Result<u64>;

    /// Execute a multi-statement batch
    fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Run a query and materialize all rows
    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

    /// Release the connection
    fn close(&self) -> Result<()>;
}

/// Adapter implementing [`Driver`] in terms of a [`LegacyConn`]
pub struct LegacyDriver {
    kind: BackendKind,
    conn: Arc<dyn LegacyConn>,
    dsn: String,
    migration_dsn: String,
}

impl LegacyDriver {
    pub fn new(
        kind: BackendKind,
        conn: Arc<dyn LegacyConn>,
        dsn: impl Into<String>,
        migration_dsn: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            conn,
            dsn: dsn.into(),
            migration_dsn: migration_dsn.into(),
        }
    }

    async fn run_blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn LegacyConn>) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(conn))
            .await
            .map_err(|e| Error::query("legacy", op, e))?
    }
}

#[async_trait]
impl Driver for LegacyDriver {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn connect(&self) -> Result<()> {
        // Legacy handles are constructed already connected
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.run_blocking("close", |conn| conn.close()).await
    }

    async fn ping(&self) -> Result<()> {
        self.run_blocking("ping", |conn| conn.query("SELECT 1", &[]).map(|_| ()))
            .await
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        let sql = sql.to_string();
        let args = args.to_vec();
        let rows_affected = self
            .run_blocking("execute", move |conn| conn.execute(&sql, &args))
            .await?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.run_blocking("execute_batch", move |conn| conn.execute_batch(&sql))
            .await
    }

    async fn query_one(&self, sql: &str, args: &[Value]) -> Result<Option<Row>> {
        // Same contract as the sqlx drivers: first row wins, extras discarded
        let mut rows = self.query_many(sql, args).await?;
        rows.truncate(1);
        Ok(rows.pop())
    }

    async fn query_many(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let args = args.to_vec();
        self.run_blocking("query_many", move |conn| conn.query(&sql, &args))
            .await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        // The old interface never exposed transactions; fail closed.
        Err(Error::UnsupportedOperation("transactions"))
    }

    fn dsn(&self) -> &str {
        &self.dsn
    }

    fn migration_dsn(&self) -> &str {
        &self.migration_dsn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Blocking in-memory table of (key, value) pairs, standing in for an
    /// old-style connection in tests.
    #[derive(Default)]
    struct FakeConn {
        rows: Mutex<Vec<(String, String)>>,
        closed: Mutex<bool>,
    }

    impl LegacyConn for FakeConn {
        fn execute(&self, _sql: &str, args: &[Value]) -> Result<u64> {
            let key = args[0].as_str().unwrap_or_default().to_string();
            let value = args[1].as_str().unwrap_or_default().to_string();
            self.rows.lock().unwrap().push((key, value));
            Ok(1)
        }

        fn execute_batch(&self, _sql: &str) -> Result<()> {
            Ok(())
        }

        fn query(&self, _sql: &str, _args: &[Value]) -> Result<Vec<Row>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .map(|(k, v)| {
                    Row::new(
                        vec!["key".to_string(), "value".to_string()],
                        vec![Value::from(k.as_str()), Value::from(v.as_str())],
                    )
                })
                .collect())
        }

        fn close(&self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn adapter() -> (Arc<FakeConn>, LegacyDriver) {
        let conn = Arc::new(FakeConn::default());
        let driver = LegacyDriver::new(
            BackendKind::Sqlite,
            Arc::clone(&conn) as Arc<dyn LegacyConn>,
            "legacy://fake",
            "legacy://fake",
        );
        (conn, driver)
    }

    #[tokio::test]
    async fn test_execute_and_query_through_adapter() {
        let (_conn, driver) = adapter();
        let result = driver
            .execute(
                "INSERT INTO kv (key, value) VALUES (?, ?)",
                &[Value::from("editor"), Value::from("nvim")],
            )
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);

        let rows = driver.query_many("SELECT * FROM kv", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("value"), Some("nvim"));
    }

    #[tokio::test]
    async fn test_query_one_takes_first_of_many() {
        let (_conn, driver) = adapter();
        for value in ["nvim", "emacs"] {
            driver
                .execute(
                    "INSERT INTO kv (key, value) VALUES (?, ?)",
                    &[Value::from("editor"), Value::from(value)],
                )
                .await
                .unwrap();
        }

        let row = driver
            .query_one("SELECT * FROM kv", &[])
            .await
            .unwrap()
            .expect("row should exist");
        assert_eq!(row.get_str("value"), Some("nvim"));
    }

    #[tokio::test]
    async fn test_transactions_fail_closed() {
        let (_conn, driver) = adapter();
        match driver.begin().await {
            Err(Error::UnsupportedOperation("transactions")) => {}
            Err(_) => panic!("wrong error variant"),
            Ok(_) => panic!("transactions must be unsupported"),
        }
    }

    #[tokio::test]
    async fn test_close_reaches_legacy_handle() {
        let (conn, driver) = adapter();
        driver.close().await.unwrap();
        assert!(*conn.closed.lock().unwrap());
    }
}

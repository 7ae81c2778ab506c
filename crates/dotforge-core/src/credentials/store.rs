//! Credential persistence on top of the driver and dialect layers
//!
//! SQL is built from an explicit column descriptor table instead of runtime
//! field reflection: each column names its accessor, and an accessor
//! returning `None` omits the column from INSERT. That makes the
//! zero-value-omission rule a reviewable, per-field decision. One
//! consequence is deliberate: a field can never be set to its empty value
//! through INSERT omission; updates write every column explicitly instead.

use crate::credentials::{Credential, CredentialScope, validate};
use crate::error::{Error, Result};
use crate::storage::dialect::{Dialect, dialect_for};
use crate::storage::driver::{Driver, Row, Value};

const TABLE: &str = "credentials";

/// One writable column and how to read it from a record
struct ColumnSpec {
    name: &'static str,
    get: fn(&Credential) -> Option<Value>,
}

/// Writable columns, in stable order. The legacy `value` column is absent on
/// purpose: nothing in this crate ever writes it.
const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "scope",
        get: |c| Some(Value::from(c.scope.as_str())),
    },
    ColumnSpec {
        name: "scope_id",
        get: |c| Some(Value::from(c.scope_id.as_str())),
    },
    ColumnSpec {
        name: "name",
        get: |c| Some(Value::from(c.name.as_str())),
    },
    ColumnSpec {
        name: "source",
        get: |c| Some(Value::from(c.source.as_str())),
    },
    ColumnSpec {
        name: "service",
        get: |c| c.service.as_deref().filter(|s| !s.is_empty()).map(Value::from),
    },
    ColumnSpec {
        name: "env_var",
        get: |c| c.env_var.as_deref().filter(|s| !s.is_empty()).map(Value::from),
    },
];

/// Columns an upsert overwrites on conflict
const UPSERT_UPDATE_COLUMNS: &[&str] = &["source", "service", "env_var", "updated_at"];

/// CRUD surface for credential records over one driver
pub struct CredentialStore<'a> {
    driver: &'a dyn Driver,
    dialect: &'static dyn Dialect,
}

impl<'a> CredentialStore<'a> {
    pub fn new(driver: &'a dyn Driver) -> Self {
        let dialect = dialect_for(driver.kind());
        Self { driver, dialect }
    }

    /// Insert a new credential record. Validates first.
    pub async fn create(&self, credential: &Credential) -> Result<()> {
        validate(credential)?;
        let (sql, args) = self.insert_statement(credential, false);
        self.driver.execute(&sql, &args).await?;
        tracing::debug!(
            scope = %credential.scope,
            name = %credential.name,
            source = %credential.source,
            "Stored credential reference"
        );
        Ok(())
    }

    /// Insert or overwrite a credential record. Validates first.
    pub async fn upsert(&self, credential: &Credential) -> Result<()> {
        validate(credential)?;
        let (sql, args) = self.insert_statement(credential, true);
        self.driver.execute(&sql, &args).await?;
        Ok(())
    }

    /// Overwrite an existing record with `credential`.
    ///
    /// The whole resulting record is validated, not just the changed fields,
    /// so clearing a required companion field is rejected even when the
    /// source is untouched.
    pub async fn update(&self, credential: &Credential) -> Result<()> {
        validate(credential)?;

        let sql = format!(
            "UPDATE {TABLE} SET source = {}, service = {}, env_var = {}, \
             value = NULL, updated_at = {} \
             WHERE scope = {} AND scope_id = {} AND name = {}",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
            self.dialect.now(),
            self.dialect.placeholder(4),
            self.dialect.placeholder(5),
            self.dialect.placeholder(6),
        );
        let args = [
            Value::from(credential.source.as_str()),
            Value::from(credential.service.clone()),
            Value::from(credential.env_var.clone()),
            Value::from(credential.scope.as_str()),
            Value::from(credential.scope_id.as_str()),
            Value::from(credential.name.as_str()),
        ];
        let result = self.driver.execute(&sql, &args).await?;
        if result.rows_affected == 0 {
            return Err(Error::CredentialNotFound {
                scope: credential.scope.as_str(),
                scope_id: credential.scope_id.clone(),
                name: credential.name.clone(),
            });
        }
        Ok(())
    }

    /// Fetch one credential record by its identity
    pub async fn get(
        &self,
        scope: CredentialScope,
        scope_id: &str,
        name: &str,
    ) -> Result<Option<Credential>> {
        let sql = format!(
            "SELECT scope, scope_id, name, source, service, env_var, value \
             FROM {TABLE} WHERE scope = {} AND scope_id = {} AND name = {}",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
        );
        let args = [
            Value::from(scope.as_str()),
            Value::from(scope_id),
            Value::from(name),
        ];
        let row = self.driver.query_one(&sql, &args).await?;
        row.map(decode_credential).transpose()
    }

    /// List credential records for one scope instance, name-ordered
    pub async fn list(
        &self,
        scope: CredentialScope,
        scope_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Credential>> {
        let mut sql = format!(
            "SELECT scope, scope_id, name, source, service, env_var, value \
             FROM {TABLE} WHERE scope = {} AND scope_id = {} ORDER BY name",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
        );
        let paging = self.dialect.limit_offset(limit, offset);
        if !paging.is_empty() {
            sql.push(' ');
            sql.push_str(&paging);
        }
        let args = [Value::from(scope.as_str()), Value::from(scope_id)];
        let rows = self.driver.query_many(&sql, &args).await?;
        rows.into_iter().map(decode_credential).collect()
    }

    /// Delete one credential record; returns whether it existed
    pub async fn delete(
        &self,
        scope: CredentialScope,
        scope_id: &str,
        name: &str,
    ) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {TABLE} WHERE scope = {} AND scope_id = {} AND name = {}",
            self.dialect.placeholder(1),
            self.dialect.placeholder(2),
            self.dialect.placeholder(3),
        );
        let args = [
            Value::from(scope.as_str()),
            Value::from(scope_id),
            Value::from(name),
        ];
        let result = self.driver.execute(&sql, &args).await?;
        Ok(result.rows_affected > 0)
    }

    /// Build an INSERT (optionally upserting) from the column descriptors
    fn insert_statement(&self, credential: &Credential, upsert: bool) -> (String, Vec<Value>) {
        let mut columns: Vec<&str> = Vec::new();
        let mut placeholders: Vec<String> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        for spec in COLUMNS {
            if let Some(value) = (spec.get)(credential) {
                columns.push(spec.name);
                placeholders.push(self.dialect.placeholder(args.len() + 1));
                args.push(value);
            }
        }
        columns.push("created_at");
        placeholders.push(self.dialect.now().to_string());
        columns.push("updated_at");
        placeholders.push(self.dialect.now().to_string());

        let mut sql = format!(
            "INSERT INTO {TABLE} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", "),
        );
        if upsert {
            let clause = self
                .dialect
                .upsert_clause(&["scope", "scope_id", "name"], UPSERT_UPDATE_COLUMNS);
            if !clause.is_empty() {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }
        (sql, args)
    }
}

fn decode_credential(row: Row) -> Result<Credential> {
    let scope = row
        .get_str("scope")
        .unwrap_or_default()
        .parse::<CredentialScope>()?;
    let non_empty = |column: &str| {
        row.get_str(column)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Ok(Credential {
        scope,
        scope_id: row.get_str("scope_id").unwrap_or_default().to_string(),
        name: row.get_str("name").unwrap_or_default().to_string(),
        source: row.get_str("source").unwrap_or_default().to_string(),
        service: non_empty("service"),
        env_var: non_empty("env_var"),
        value: non_empty("value"),
    })
}

//! Record store subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint handler
//!     → Store::with_session (locks the shared connection)
//!     → Session::fetch_all / count / execute (named, bound parameters)
//!     → Record (ordered column → JSON value map)
//! ```
//!
//! # Design Decisions
//! - One SQLite connection, shared behind a mutex; statements run serially
//! - Values are always bound as named parameters, never spliced into SQL
//! - Rows come back as JSON maps so handlers can attach links directly
//! - Multi-statement work runs inside `Session::transaction`

pub mod import;
pub mod request_log;
pub mod schema;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::{Number, Value};
use thiserror::Error;

pub use request_log::{RequestLog, SqliteRequestLog};

/// One result row: column name → value, in select order.
pub type Record = serde_json::Map<String, Value>;

/// Placeholder (including the `:` marker) → bound value.
pub type BoundValues = BTreeMap<String, Value>;

/// Errors raised by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite engine rejected a statement.
    #[error("{}", sqlite_message(.0))]
    Sqlite(#[from] rusqlite::Error),

    /// A previous holder of the connection panicked.
    #[error("database connection lock poisoned")]
    Poisoned,
}

fn sqlite_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        other => other.to_string(),
    }
}

impl StoreError {
    /// The SQLite extended result code, when the engine produced one.
    pub fn code(&self) -> Option<i32> {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => Some(err.extended_code),
            _ => None,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Cloneable handle to the shared SQLite connection.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path`. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        tracing::debug!(path = %path.display(), "Opened record store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a fresh in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(":memory:")
    }

    /// Run `f` with exclusive use of the connection.
    pub fn with_session<T, E>(&self, f: impl FnOnce(&Session<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let session = Session { conn: &conn };
        f(&session)
    }
}

/// A locked connection for the duration of one unit of work.
pub struct Session<'a> {
    conn: &'a Connection,
}

impl Session<'_> {
    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Session<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let tx = self.conn.unchecked_transaction().map_err(StoreError::from)?;
        let result = f(&Session { conn: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(result)
    }

    /// Execute a statement and collect every row.
    pub fn fetch_all(&self, sql: &str, values: &BoundValues) -> StoreResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let bound = to_sql_values(values);
        let params = as_params(&bound);

        let mut rows = stmt.query(params.as_slice())?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), json_from_sql(row.get_ref(i)?));
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Execute a statement and return its first row, if any.
    pub fn fetch_one(&self, sql: &str, values: &BoundValues) -> StoreResult<Option<Record>> {
        Ok(self.fetch_all(sql, values)?.into_iter().next())
    }

    /// Execute a single-value query such as `SELECT COUNT(*) ...`.
    pub fn count(&self, sql: &str, values: &BoundValues) -> StoreResult<i64> {
        let mut stmt = self.conn.prepare(sql)?;
        let bound = to_sql_values(values);
        let params = as_params(&bound);
        let count = stmt.query_row(params.as_slice(), |row| row.get::<_, i64>(0))?;
        Ok(count)
    }

    /// Execute a write statement, returning the number of changed rows.
    pub fn execute(&self, sql: &str, values: &BoundValues) -> StoreResult<usize> {
        let mut stmt = self.conn.prepare(sql)?;
        let bound = to_sql_values(values);
        let params = as_params(&bound);
        Ok(stmt.execute(params.as_slice())?)
    }

    /// Execute several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Row id of the most recent successful INSERT.
    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

fn to_sql_values(values: &BoundValues) -> Vec<(&str, SqlValue)> {
    values
        .iter()
        .map(|(placeholder, value)| (placeholder.as_str(), sql_from_json(value)))
        .collect()
}

fn as_params<'a>(bound: &'a [(&'a str, SqlValue)]) -> Vec<(&'a str, &'a dyn ToSql)> {
    bound
        .iter()
        .map(|(placeholder, value)| (*placeholder, value as &dyn ToSql))
        .collect()
}

fn sql_from_json(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn json_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Build a `BoundValues` map from `(placeholder, value)` pairs.
pub fn bind<K, I>(pairs: I) -> BoundValues
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Query Execution Module
///
/// This module runs the dashboards' fixed queries and returns the rows
/// verbatim, as untyped values, for the normalizer to type.

use crate::core::{DashError, Result};
use rusqlite::{types::ValueRef, Connection};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// An untyped value as returned by the query engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Rows exactly as the query engine returned them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names, in result order
    pub columns: Vec<String>,
    /// One value per column for every row
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        RawTable { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Looks up a single value by row number and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }
}

/// A live database session that can run read-only queries.
///
/// Handles are shared between dashboards and threads, so implementations
/// must be `Send + Sync` and must not require re-authentication per query.
pub trait Database: Send + Sync {
    /// Executes `sql` and returns every row, or fails without partial rows
    fn query(&self, sql: &str) -> Result<RawTable>;
}

/// SQLite-backed handle; the connection is serialized behind a mutex
#[derive(Debug)]
pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn new(conn: Connection) -> Self {
        SqliteDatabase {
            conn: Mutex::new(conn),
        }
    }
}

impl Database for SqliteDatabase {
    fn query(&self, sql: &str) -> Result<RawTable> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DashError::QueryFailed("database lock poisoned".to_string()))?;
        execute_query_on_connection(&conn, sql)
    }
}

/// Executes a SQL query on a connection and collects the untyped rows
///
/// # Errors
///
/// Returns `DashError::QueryFailed` if the statement cannot be prepared or
/// any row fails to decode. No rows are returned in that case.
pub fn execute_query_on_connection(conn: &Connection, sql: &str) -> Result<RawTable> {
    let started = Instant::now();
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DashError::QueryFailed(format!("Failed to prepare statement: {}", e)))?;

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = stmt.column_count();

    let rows = stmt
        .query_map([], |row| {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(Value::from(row.get_ref(i)?));
            }
            Ok(values)
        })
        .map_err(|e| DashError::QueryFailed(format!("Query execution failed: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DashError::QueryFailed(format!("Result processing failed: {}", e)))?;

    debug!(
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "query executed"
    );
    Ok(RawTable::new(columns, rows))
}

/// True when `sql` is a single SELECT statement.
///
/// Only the leading keyword is inspected; a trailing semicolon is allowed
/// but a second statement after it is not.
pub fn is_read_only(sql: &str) -> bool {
    let sql = sql.trim();
    let body = sql.strip_suffix(';').unwrap_or(sql);
    let starts_with_select = body
        .split_whitespace()
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("select"));
    starts_with_select && !body.contains(';')
}

/// A fixed, parameterless, read-only query.
///
/// The `name` is the query identity used as the cache key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDef {
    pub name: &'static str,
    pub sql: &'static str,
}

impl QueryDef {
    /// Creates a query definition, rejecting anything that is not a SELECT
    pub fn new(name: &'static str, sql: &'static str) -> Result<Self> {
        if !is_read_only(sql) {
            return Err(DashError::QueryFailed(format!(
                "query '{}' is not a read-only SELECT",
                name
            )));
        }
        Ok(QueryDef { name, sql })
    }
}

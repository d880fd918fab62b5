// ABOUTME: In-memory SQLite engine with whole-database byte serialization.
// ABOUTME: Snapshots move through the backup API so bytes always form a loadable database file.

use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use datastash_core::StoreError;

/// Errors from the embedded engine and snapshot path.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no database loaded")]
    NotLoaded,

    #[error("username already taken")]
    UsernameTaken,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of one executed statement. Statements that return no rows carry
/// an affected-row count instead.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: usize,
}

/// One table in the loaded database, with its current row count.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub row_count: i64,
}

/// The embedded relational engine. The whole database lives in memory;
/// persistence happens only through `export_bytes`, which serializes the
/// complete current state — never a partial update.
#[derive(Debug)]
pub struct SqlEngine {
    conn: Connection,
}

impl SqlEngine {
    /// A fresh empty database.
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Load a database wholesale from serialized file bytes. Invalid bytes
    /// surface as a deserialization failure, never a panic.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        let tmp = tempfile::NamedTempFile::new()?;
        std::fs::write(tmp.path(), bytes)?;

        let src = Connection::open(tmp.path())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        // SQLite opens lazily; force a read so corrupt bytes fail here.
        src.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;

        let mut conn = Connection::open_in_memory()?;
        {
            let backup = Backup::new(&src, &mut conn)?;
            backup.run_to_completion(64, Duration::from_millis(5), None)?;
        }
        Ok(Self { conn })
    }

    /// Serialize the complete current state to database file bytes.
    pub fn export_bytes(&self) -> Result<Vec<u8>, EngineError> {
        let tmp = tempfile::NamedTempFile::new()?;
        {
            let mut dst = Connection::open(tmp.path())?;
            let backup = Backup::new(&self.conn, &mut dst)?;
            backup.run_to_completion(64, Duration::from_millis(5), None)?;
        }
        Ok(std::fs::read(tmp.path())?)
    }

    /// Run one SQL statement. Row-returning statements yield columns and
    /// rows; everything else yields an affected-row count.
    pub fn execute(&mut self, sql: &str) -> Result<QueryOutput, EngineError> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();

        if column_count == 0 {
            let rows_affected = stmt.execute([])?;
            return Ok(QueryOutput {
                columns: Vec::new(),
                rows: Vec::new(),
                rows_affected,
            });
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = Vec::new();
        let mut result_rows = stmt.query([])?;
        while let Some(row) = result_rows.next()? {
            let mut out = Vec::with_capacity(column_count);
            for i in 0..column_count {
                out.push(value_to_json(row.get_ref(i)?));
            }
            rows.push(out);
        }

        Ok(QueryOutput {
            columns,
            rows,
            rows_affected: 0,
        })
    }

    /// List user tables with their row counts.
    pub fn tables(&self) -> Result<Vec<TableInfo>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let row_count = self.conn.query_row(
                &format!("SELECT count(*) FROM \"{}\"", name.replace('"', "\"\"")),
                [],
                |row| row.get(0),
            )?;
            tables.push(TableInfo { name, row_count });
        }
        Ok(tables)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => {
            use base64::{Engine as _, engine::general_purpose::STANDARD};
            Value::String(STANDARD.encode(b))
        }
    }
}

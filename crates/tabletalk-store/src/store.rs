//! SQLite query execution
//!
//! Each call opens its own read-only connection and closes it on
//! every exit path, so one store value can serve concurrent
//! questions. Queries are whatever the model generated; the engine
//! only cares whether they execute, so syntax and semantic errors
//! bubble straight out as retryable failures.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use tabletalk_core::engine::TabularStore;
use tabletalk_core::error::StoreError;
use tabletalk_core::types::{Scalar, TabularResult};

/// Store executing queries against a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn execute_blocking(db_path: &Path, query: &str) -> Result<TabularResult, StoreError> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    let mut stmt = conn
        .prepare(query)
        .map_err(|e| StoreError::Query(e.to_string()))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let column_count = columns.len();

    let mut rows = stmt
        .query([])
        .map_err(|e| StoreError::Query(e.to_string()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| StoreError::Query(e.to_string()))? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            let value = match row
                .get_ref(i)
                .map_err(|e| StoreError::Query(e.to_string()))?
            {
                ValueRef::Null => Scalar::Null,
                ValueRef::Integer(n) => Scalar::Integer(n),
                ValueRef::Real(f) => Scalar::Real(f),
                ValueRef::Text(t) => Scalar::Text(String::from_utf8_lossy(t).into_owned()),
                // The datasets carry no blobs; anything binary is
                // treated as an absent value.
                ValueRef::Blob(_) => Scalar::Null,
            };
            values.push(value);
        }
        out.push(values);
    }

    TabularResult::new(columns, out).map_err(|e| StoreError::Query(e.to_string()))
}

#[async_trait::async_trait]
impl TabularStore for SqliteStore {
    async fn execute(&self, query: &str) -> Result<TabularResult, StoreError> {
        tracing::debug!(query, "executing query");
        let db_path = self.db_path.clone();
        let query = query.to_string();

        tokio::task::spawn_blocking(move || execute_blocking(&db_path, &query))
            .await
            .map_err(|e| StoreError::Query(format!("query worker failed: {e}")))?
    }
}

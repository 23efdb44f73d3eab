//! Dataset ingestion
//!
//! One-time load of the raw CSV exports into SQLite, replacing any
//! previous load. Column types are decided by an explicit
//! classification step with declared rules evaluated over every
//! non-null value of a column:
//!
//! - all values parse as i64            -> INTEGER
//! - all values parse as f64            -> REAL
//! - all values are currency-formatted  -> REAL, cleaned during load
//! - anything else                      -> TEXT
//!
//! Currency cleanup strips a leading `$` and thousands separators.
//! Separator positions are not checked; the rule only decides whether
//! the whole column is money-shaped.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::Connection;

use tabletalk_core::error::StoreError;

/// The fixed set of datasets: (file name, table name).
pub const DATASETS: &[(&str, &str)] = &[
    ("activities-web.csv", "proyectos"),
    ("procesos_competitivos.csv", "licitaciones"),
    ("adjudicatarios_psd.csv", "adjudicaciones"),
];

/// Declared type of a loaded column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Currency,
    Text,
}

impl ColumnKind {
    fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real | ColumnKind::Currency => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }
}

/// What one `load_dir` call ingested.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// (table name, row count) per loaded table
    pub tables: Vec<(String, usize)>,
}

/// Load every dataset file found under `data_dir` into `db_path`.
///
/// Missing files are skipped with a warning, matching a partial raw
/// data drop; present files replace their table wholesale.
pub fn load_dir(data_dir: &Path, db_path: &Path) -> Result<LoadReport, StoreError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Load(e.to_string()))?;
    }
    let mut conn =
        Connection::open(db_path).map_err(|e| StoreError::Connection(e.to_string()))?;

    let mut report = LoadReport::default();
    for &(file, table) in DATASETS {
        let path = data_dir.join(file);
        if !path.exists() {
            tracing::warn!(file, "dataset file not found, skipping");
            continue;
        }
        let rows = load_csv(&mut conn, &path, table)?;
        tracing::info!(table, rows, "loaded dataset");
        report.tables.push((table.to_string(), rows));
    }
    Ok(report)
}

/// Load a single CSV file into `table`, replacing it.
pub fn load_csv(conn: &mut Connection, path: &Path, table: &str) -> Result<usize, StoreError> {
    // The raw exports are a mix of UTF-8 and Latin-1; reading bytes
    // and converting lossily keeps the loader total over both.
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::Load(e.to_string()))?;

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(|e| StoreError::Load(e.to_string()))?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim().to_string())
        .collect();

    let mut records: Vec<Vec<Option<String>>> = Vec::new();
    for result in reader.byte_records() {
        let record = result.map_err(|e| StoreError::Load(e.to_string()))?;
        let row = (0..headers.len())
            .map(|i| {
                record
                    .get(i)
                    .map(|field| String::from_utf8_lossy(field).trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .collect();
        records.push(row);
    }

    let kinds: Vec<ColumnKind> = (0..headers.len())
        .map(|i| classify_column(records.iter().map(|r| r[i].as_deref())))
        .collect();

    let column_defs: Vec<String> = headers
        .iter()
        .zip(&kinds)
        .map(|(h, k)| format!("{} {}", quote_ident(h), k.sql_type()))
        .collect();

    let tx = conn
        .transaction()
        .map_err(|e| StoreError::Load(e.to_string()))?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {quoted};\nCREATE TABLE {quoted} ({defs});",
        quoted = quote_ident(table),
        defs = column_defs.join(", ")
    ))
    .map_err(|e| StoreError::Load(e.to_string()))?;

    let placeholders: Vec<&str> = std::iter::repeat("?").take(headers.len()).collect();
    let insert = format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(table),
        placeholders.join(", ")
    );
    {
        let mut stmt = tx
            .prepare(&insert)
            .map_err(|e| StoreError::Load(e.to_string()))?;
        for record in &records {
            let params: Vec<Value> = record
                .iter()
                .zip(&kinds)
                .map(|(field, kind)| to_sql_value(field.as_deref(), *kind))
                .collect();
            stmt.execute(rusqlite::params_from_iter(params))
                .map_err(|e| StoreError::Load(e.to_string()))?;
        }
    }
    tx.commit().map_err(|e| StoreError::Load(e.to_string()))?;

    Ok(records.len())
}

/// Classify a column from all of its non-null values.
pub fn classify_column<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ColumnKind {
    let mut any = false;
    let mut all_integer = true;
    let mut all_real = true;
    let mut all_currency = true;

    for value in values.flatten() {
        any = true;
        if value.parse::<i64>().is_err() {
            all_integer = false;
        }
        if value.parse::<f64>().is_err() {
            all_real = false;
        }
        if parse_currency(value).is_none() {
            all_currency = false;
        }
    }

    if !any {
        ColumnKind::Text
    } else if all_integer {
        ColumnKind::Integer
    } else if all_real {
        ColumnKind::Real
    } else if all_currency {
        ColumnKind::Currency
    } else {
        ColumnKind::Text
    }
}

/// Parse a currency-formatted value: optional leading `$`, thousands
/// separators allowed.
pub fn parse_currency(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let without_symbol = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
    if without_symbol.is_empty() {
        return None;
    }
    without_symbol.replace(',', "").parse().ok()
}

fn to_sql_value(field: Option<&str>, kind: ColumnKind) -> Value {
    let Some(field) = field else {
        return Value::Null;
    };
    match kind {
        ColumnKind::Integer => field
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or(Value::Null),
        ColumnKind::Real => field.parse::<f64>().map(Value::Real).unwrap_or(Value::Null),
        ColumnKind::Currency => parse_currency(field)
            .map(Value::Real)
            .unwrap_or(Value::Null),
        ColumnKind::Text => Value::Text(field.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

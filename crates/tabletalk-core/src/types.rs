//! Core data model: scalars, tabular results, chart specs and the
//! result envelope returned for every question.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Symbolic classification of a question, used to select the
/// generation/execution path.
///
/// Marked non-exhaustive so downstream matches keep a fallback arm;
/// intents added later resolve to an `Unknown` envelope.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Data retrieval: lists, filtered items, simple numbers
    Data,
    /// Visualization: charts, graphs, trends
    Chart,
}

impl Intent {
    /// Map a trimmed, case-normalized classification label to an intent.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "DATA" => Some(Intent::Data),
            "CHART" => Some(Intent::Chart),
            _ => None,
        }
    }
}

/// A single table cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    /// Render the value the way it should appear in a text preview.
    pub fn display(&self) -> String {
        match self {
            Scalar::Null => "NULL".to_string(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Real(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

/// In-memory relational result set: ordered unique column names plus
/// ordered rows, each row positionally aligned with the columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularResult {
    /// Ordered column names, unique within the result
    pub columns: Vec<String>,

    /// Ordered rows; every row has exactly one scalar per column
    pub rows: Vec<Vec<Scalar>>,
}

impl TabularResult {
    /// Create a result, enforcing column uniqueness and row width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Result<Self, EngineError> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(EngineError::InvalidTable(format!(
                    "duplicate column name: {name}"
                )));
            }
        }
        if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(EngineError::InvalidTable(format!(
                "row has {} values, expected {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// An empty result with no columns and no rows.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Rows in records orientation (one JSON object per row), the shape
    /// the envelope and the chart spec carry.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let map = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| {
                        (
                            col.clone(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect();
                serde_json::Value::Object(map)
            })
            .collect()
    }

    /// Text preview of the first `n` rows, used to show a model the
    /// column names and value shapes without ever shipping the full
    /// dataset.
    pub fn sample_text(&self, n: usize) -> String {
        let mut out = self.columns.join(" | ");
        for row in self.rows.iter().take(n) {
            out.push('\n');
            let rendered: Vec<String> = row.iter().map(Scalar::display).collect();
            out.push_str(&rendered.join(" | "));
        }
        out
    }
}

/// Serializable declarative visualization document produced by the
/// chart sandbox. Opaque to the engine; the front-end renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartSpec(pub serde_json::Value);

/// The tagged output returned by the core for a single question.
///
/// Exactly one envelope is produced per question, regardless of how
/// many internal retries occur, and it is never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultEnvelope {
    /// A successful data query
    Data {
        /// Result rows in records orientation
        rows: Vec<serde_json::Value>,
        /// The query that produced them
        query: String,
        /// Human-readable summary
        summary: String,
    },

    /// A successful chart build
    Chart {
        /// The declarative chart document
        spec: ChartSpec,
        /// The generated program that built it
        code: String,
        /// Human-readable summary
        summary: String,
    },

    /// A path exhausted its retry budget
    Error { message: String },

    /// The question resolved to an intent the engine does not handle
    Unknown { message: String },
}

//! Chart program interpretation
//!
//! A generated program is a JSON document binding one chart object to
//! the fixed name `chart`. The interpreter resolves its column
//! references against the input table, applies the optional
//! aggregation, and materializes a declarative chart spec with the
//! data inlined. Nothing else is in scope for a program: no
//! filesystem, no network, no bindings beyond the table and the chart
//! capability.

use serde::Deserialize;
use serde_json::json;

use tabletalk_core::error::SandboxError;
use tabletalk_core::types::{ChartSpec, Scalar, TabularResult};

/// Chart kinds the sandbox is able to build
const SUPPORTED_KINDS: &[&str] = &["bar", "line", "scatter", "pie", "area"];

/// Top-level shape of a generated program.
#[derive(Debug, Deserialize)]
struct ChartProgram {
    #[serde(default)]
    chart: Option<ChartDirective>,
}

/// The single chart object a program binds.
#[derive(Debug, Deserialize)]
struct ChartDirective {
    kind: String,
    x: String,
    y: String,
    #[serde(default)]
    series: Option<String>,
    #[serde(default)]
    aggregate: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Interpret a program against the table binding.
pub(crate) fn interpret(code: &str, table: &TabularResult) -> Result<ChartSpec, SandboxError> {
    let program: ChartProgram = serde_json::from_str(code)
        .map_err(|e| SandboxError::Execution(format!("program parse error: {e}")))?;

    let directive = program.chart.ok_or(SandboxError::MissingChart)?;

    if !SUPPORTED_KINDS.contains(&directive.kind.as_str()) {
        return Err(SandboxError::UnsupportedKind(directive.kind));
    }

    let x_idx = column_index(table, &directive.x)?;
    let y_idx = column_index(table, &directive.y)?;
    let series_idx = match &directive.series {
        Some(name) => Some(column_index(table, name)?),
        None => None,
    };

    let values = match directive.aggregate.as_deref() {
        None => project(table, x_idx, y_idx, series_idx, &directive),
        Some(agg) => aggregate(table, x_idx, y_idx, series_idx, &directive, agg)?,
    };

    let mut encoding = json!({
        "x": {"field": directive.x},
        "y": {"field": directive.y},
    });
    if let Some(series) = &directive.series {
        encoding["series"] = json!({"field": series});
    }

    Ok(ChartSpec(json!({
        "kind": directive.kind,
        "title": directive.title,
        "encoding": encoding,
        "data": {"values": values},
    })))
}

fn column_index(table: &TabularResult, name: &str) -> Result<usize, SandboxError> {
    table
        .column_index(name)
        .ok_or_else(|| SandboxError::UnknownColumn(name.to_string()))
}

/// Numeric view of a cell. SQLite affinities sometimes hand back
/// numbers as text, so parseable text counts.
fn numeric(value: &Scalar) -> Option<f64> {
    match value {
        Scalar::Integer(i) => Some(*i as f64),
        Scalar::Real(f) => Some(*f),
        Scalar::Text(s) => s.trim().parse().ok(),
        Scalar::Null => None,
    }
}

fn scalar_value(value: &Scalar) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Rows projected to the referenced columns, no aggregation.
fn project(
    table: &TabularResult,
    x_idx: usize,
    y_idx: usize,
    series_idx: Option<usize>,
    directive: &ChartDirective,
) -> Vec<serde_json::Value> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut record = serde_json::Map::new();
            record.insert(directive.x.clone(), scalar_value(&row[x_idx]));
            record.insert(directive.y.clone(), scalar_value(&row[y_idx]));
            if let (Some(idx), Some(name)) = (series_idx, &directive.series) {
                record.insert(name.clone(), scalar_value(&row[idx]));
            }
            serde_json::Value::Object(record)
        })
        .collect()
}

/// Group rows by the x (and series) value and fold y.
///
/// Groups keep first-seen order. Null y values are skipped the way SQL
/// aggregates skip them; a y value that is neither numeric nor null
/// fails the run.
fn aggregate(
    table: &TabularResult,
    x_idx: usize,
    y_idx: usize,
    series_idx: Option<usize>,
    directive: &ChartDirective,
    agg: &str,
) -> Result<Vec<serde_json::Value>, SandboxError> {
    if !matches!(agg, "sum" | "avg" | "count" | "min" | "max") {
        return Err(SandboxError::Execution(format!(
            "unsupported aggregate: {agg}"
        )));
    }

    struct Group {
        x: Scalar,
        series: Option<Scalar>,
        count: usize,
        sum: f64,
        min: f64,
        max: f64,
        numeric_count: usize,
    }

    let mut groups: Vec<Group> = Vec::new();

    for row in &table.rows {
        let x = row[x_idx].clone();
        let series = series_idx.map(|idx| row[idx].clone());

        let idx = match groups.iter().position(|g| g.x == x && g.series == series) {
            Some(idx) => idx,
            None => {
                groups.push(Group {
                    x,
                    series,
                    count: 0,
                    sum: 0.0,
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                    numeric_count: 0,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[idx];

        group.count += 1;
        match &row[y_idx] {
            Scalar::Null => {}
            value => match numeric(value) {
                Some(n) => {
                    group.sum += n;
                    group.min = group.min.min(n);
                    group.max = group.max.max(n);
                    group.numeric_count += 1;
                }
                None => {
                    return Err(SandboxError::Execution(format!(
                        "column \"{}\" has non-numeric value \"{}\"",
                        directive.y,
                        value.display()
                    )));
                }
            },
        }
    }

    let values = groups
        .into_iter()
        .map(|group| {
            let y = match agg {
                "count" => json!(group.count),
                _ if group.numeric_count == 0 => serde_json::Value::Null,
                "sum" => json!(group.sum),
                "avg" => json!(group.sum / group.numeric_count as f64),
                "min" => json!(group.min),
                _ => json!(group.max),
            };
            let mut record = serde_json::Map::new();
            record.insert(directive.x.clone(), scalar_value(&group.x));
            record.insert(directive.y.clone(), y);
            if let (Some(series), Some(name)) = (&group.series, &directive.series) {
                record.insert(name.clone(), scalar_value(series));
            }
            serde_json::Value::Object(record)
        })
        .collect();

    Ok(values)
}

/// Quick structural check used by tests and callers that want to know
/// whether a spec binds a chart without re-parsing the program.
pub fn spec_has_chart(spec: &ChartSpec) -> bool {
    spec.0.get("kind").is_some() && spec.0.get("data").is_some()
}

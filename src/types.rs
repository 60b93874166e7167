use crate::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::Tabled;

/// Input exactly as read: header names and string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| EtlError::SchemaMismatch {
                column: name.to_string(),
            })
    }

    /// Cell `idx` of `row`; short rows read as empty.
    pub fn cell<'a>(&'a self, row: &'a [String], idx: usize) -> &'a str {
        row.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// A typed column. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Text(Vec<Option<String>>),
    Integer(Vec<Option<i32>>),
    Decimal(Vec<Option<Decimal>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Integer(v) => v.len(),
            Column::Decimal(v) => v.len(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Text(_) => "string",
            Column::Integer(_) => "integer",
            Column::Decimal(_) => "decimal",
        }
    }

    pub fn missing_count(&self) -> usize {
        match self {
            Column::Text(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Integer(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Decimal(v) => v.iter().filter(|c| c.is_none()).count(),
        }
    }

    /// Numeric value at `row` widened to a decimal. `None` for text columns
    /// and missing cells.
    pub fn decimal_at(&self, row: usize) -> Option<Decimal> {
        match self {
            Column::Integer(v) => v[row].map(Decimal::from),
            Column::Decimal(v) => v[row],
            Column::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Column::Text(_))
    }
}

/// Named, typed columns of equal length. Stages never modify a frame in
/// place; they consume it and hand back a new one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
    height: usize,
}

impl Frame {
    pub fn new(height: usize) -> Self {
        Frame {
            names: Vec::new(),
            columns: Vec::new(),
            height,
        }
    }

    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self> {
        if self.names.iter().any(|n| n == name) {
            return Err(EtlError::ColumnCollision {
                name: name.to_string(),
            });
        }
        if column.len() != self.height {
            return Err(EtlError::InvalidMeasure {
                column: name.to_string(),
                reason: format!("has {} rows, frame has {}", column.len(), self.height),
            });
        }
        self.names.push(name.to_string());
        self.columns.push(column);
        Ok(self)
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| EtlError::SchemaMismatch {
                column: name.to_string(),
            })
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// Result of one grouped aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateTable {
    pub key_columns: Vec<String>,
    pub measure_columns: Vec<String>,
    pub rows: Vec<AggregateRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub keys: Vec<Option<String>>,
    pub values: Vec<Option<Decimal>>,
}

impl AggregateTable {
    pub fn headers(&self) -> Vec<String> {
        self.key_columns
            .iter()
            .chain(self.measure_columns.iter())
            .cloned()
            .collect()
    }

    pub fn find(&self, keys: &[&str]) -> Option<&AggregateRow> {
        self.rows.iter().find(|r| {
            r.keys.len() == keys.len()
                && r.keys.iter().zip(keys).all(|(k, want)| k.as_deref() == Some(*want))
        })
    }

    pub fn measure_index(&self, name: &str) -> Option<usize> {
        self.measure_columns.iter().position(|m| m == name)
    }

    /// Sum of a measure over all rows, ignoring missing cells.
    pub fn column_total(&self, name: &str) -> Option<Decimal> {
        let idx = self.measure_index(name)?;
        self.rows
            .iter()
            .filter_map(|r| r.values[idx])
            .fold(None, |acc: Option<Decimal>, v| Some(acc.unwrap_or(Decimal::ZERO) + v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

/// Layout handed to the external renderer together with the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    /// X axis for bar/line charts, label column for pies.
    pub x: String,
    /// Value column for pies.
    pub y: Option<String>,
    pub figsize: [f32; 2],
    pub width: Option<f32>,
    pub stacked: bool,
    pub subplots: bool,
    pub sort_columns: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartManifestEntry {
    pub name: String,
    pub title: String,
    pub file: String,
    pub chart: ChartSpec,
}

/// One line of the post-cleaning schema printout.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ColumnReportRow {
    #[tabled(rename = "Column")]
    pub column: String,
    #[tabled(rename = "Type")]
    pub type_name: String,
    #[tabled(rename = "Missing")]
    pub missing: usize,
    #[tabled(rename = "Malformed")]
    pub malformed: usize,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub total_rows: usize,
    pub malformed_cells: usize,
    pub total_units: Option<Decimal>,
    pub total_sales: Option<Decimal>,
    pub total_investment: Option<Decimal>,
    pub total_profit: Option<Decimal>,
    pub zones: usize,
    pub product_types: usize,
}

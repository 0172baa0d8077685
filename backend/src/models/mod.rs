//! Domain models shared by the parsers, the combiner and the interval engine.
//!
//! - [`AgsVersion`] - Detected file format (AGS3, AGS4 or unknown)
//! - [`Table`] - Ordered columns plus rows of typed scalar cells
//! - [`ParseIssue`] - Structured parse error (rule, line, message)
//! - [`ParsedFile`] - Result of parsing one uploaded file
//! - [`DepthInterval`] - One master depth slice of a borehole
//!
//! Cells are `serde_json::Value`s. Only `Null`, `String` and `Number` are ever
//! produced: parsers emit strings, the interval engine emits numeric depths.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Provenance column stamped on every parsed and combined table.
pub const SOURCE_FILE_COLUMN: &str = "SOURCE_FILE";

/// Borehole identifier columns, in lookup order.
pub const HOLE_ID_COLUMNS: [&str; 3] = ["HOLE_ID", "LOCA_ID", "HOLEID"];

/// Joins the parts of a cell built from `<CONT>` lines.
pub const CONTINUATION_SEPARATOR: &str = " | ";

// =============================================================================
// Version
// =============================================================================

/// AGS format version of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgsVersion {
    /// Legacy `"**GROUP"` / `"*HEADING"` layout.
    #[serde(rename = "AGS3")]
    Ags3,
    /// `"GROUP"` / `"HEADING"` / `"UNIT"` / `"TYPE"` / `"DATA"` layout.
    #[serde(rename = "AGS4")]
    Ags4,
    /// Neither marker found in the first lines.
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl AgsVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ags3 => "AGS3",
            Self::Ags4 => "AGS4",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for AgsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Table
// =============================================================================

/// A named group's data: ordered unique columns and rows aligned to them.
///
/// Every row holds exactly one cell per column. `units` and `types` carry the
/// AGS `UNIT`/`TYPE` (or AGS3 `<UNITS>`) lines keyed by column name; they are
/// metadata and never appear as rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub units: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub types: BTreeMap<String, String>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Case-insensitive, whitespace-tolerant column lookup.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        let wanted = name.trim();
        self.columns
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(wanted))
    }

    /// First of the candidate names present in the table.
    pub fn find_any_column(&self, candidates: &[impl AsRef<str>]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|name| self.find_column(name.as_ref()))
    }

    /// Borehole identifier column (`HOLE_ID`, `LOCA_ID` or `HOLEID`).
    pub fn hole_id_column(&self) -> Option<usize> {
        self.find_any_column(&HOLE_ID_COLUMNS)
    }

    /// Append a row, padding with nulls or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Add a column filled with `fill`, or return the existing one's index.
    pub fn add_column(&mut self, name: impl Into<String>, fill: Value) -> usize {
        let name = name.into();
        if let Some(idx) = self.column_index(&name) {
            return idx;
        }
        self.columns.push(name);
        for row in &mut self.rows {
            row.push(fill.clone());
        }
        self.columns.len() - 1
    }

    /// Cell by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append `other`'s rows, extending the schema with any columns it adds.
    ///
    /// Columns keep first-seen order; cells a row never had become null.
    /// Units and types keep the first value seen for a column.
    pub fn append(&mut self, other: Table) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|c| self.add_column(c.clone(), Value::Null))
            .collect();

        let width = self.columns.len();
        for row in other.rows {
            let mut aligned = vec![Value::Null; width];
            for (value, &target) in row.into_iter().zip(&mapping) {
                aligned[target] = value;
            }
            self.rows.push(aligned);
        }

        for (column, unit) in other.units {
            self.units.entry(column).or_insert(unit);
        }
        for (column, kind) in other.types {
            self.types.entry(column).or_insert(kind);
        }
    }

    /// Rename a column in place, carrying its units/types along.
    pub fn rename_column(&mut self, idx: usize, new_name: impl Into<String>) {
        let new_name = new_name.into();
        let old = std::mem::replace(&mut self.columns[idx], new_name.clone());
        if let Some(unit) = self.units.remove(&old) {
            self.units.insert(new_name.clone(), unit);
        }
        if let Some(kind) = self.types.remove(&old) {
            self.types.insert(new_name, kind);
        }
    }
}

// =============================================================================
// Cell helpers
// =============================================================================

/// A cell counts as data unless it is null or a whitespace-only string.
pub fn is_informative(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Numeric view of a cell: numbers as-is, strings parsed after trimming.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Text view of a cell (null is empty).
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

// =============================================================================
// Parse results
// =============================================================================

/// A structured parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseIssue {
    /// Rule identifier (e.g. `"Parser"`).
    pub rule: String,
    /// 1-based line number, or 0 when unknown.
    pub line: usize,
    pub message: String,
}

impl ParseIssue {
    pub fn new(rule: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] line {}: {}", self.rule, self.line, self.message)
    }
}

/// Result of parsing one file.
///
/// A file is valid iff it has no issues. Invalid files keep whatever groups
/// were recovered for diagnostics but are never combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub filename: String,
    pub version: AgsVersion,
    pub groups: BTreeMap<String, Table>,
    pub errors: Vec<ParseIssue>,
    pub metadata: BTreeMap<String, String>,
}

impl ParsedFile {
    pub fn new(filename: impl Into<String>, version: AgsVersion) -> Self {
        Self {
            filename: filename.into(),
            version,
            groups: BTreeMap::new(),
            errors: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of groups holding at least one row.
    pub fn usable_group_count(&self) -> usize {
        self.groups.values().filter(|t| !t.is_empty()).count()
    }

    pub fn group(&self, name: &str) -> Option<&Table> {
        self.groups.get(name)
    }
}

// =============================================================================
// Intervals
// =============================================================================

/// One master depth slice of a borehole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DepthInterval {
    pub from: f64,
    pub to: f64,
    pub thickness: f64,
}

impl DepthInterval {
    pub fn new(from: f64, to: f64) -> Self {
        // Rounded so 0.3 - 0.1 reports 0.2
        let thickness = ((to - from) * 1e9).round() / 1e9;
        Self { from, to, thickness }
    }

    /// Half-open containment test on the interval start: `from ∈ [top, base)`.
    pub fn starts_within(&self, top: f64, base: f64) -> bool {
        self.from >= top && self.from < base
    }
}

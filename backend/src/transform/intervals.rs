//! Depth-interval reconciliation.
//!
//! Measurement groups (CORE, GEOL, WETH, ...) each log their own depth ranges
//! per borehole. Reconciliation cuts every hole into master intervals at every
//! depth any group reports, then projects each group's attributes onto the
//! slices its ranges cover.
//!
//! ```text
//! CORE  [0 ─────── 1.5)[1.5 ──────── 3)
//! GEOL  [0 ──────────────── 2)[2 ─── 3)
//!
//! master [0 ─────── 1.5)[1.5 ─ 2)[2 ─ 3)
//! ```
//!
//! A source row covering `[top, base)` projects onto every master interval
//! whose `from` lies in that range. Rows are joined per hole: master
//! intervals are sorted and each row finds its first slice by binary search.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ReconcileError, TransformError, TransformResult};
use crate::logs::log_warning;
use crate::models::{
    value_as_f64, value_text, DepthInterval, Table, HOLE_ID_COLUMNS, SOURCE_FILE_COLUMN,
};

/// Leading columns of every reconciled table.
pub const KEY_COLUMNS: [&str; 4] = ["HOLE_ID", "DEPTH_FROM", "DEPTH_TO", "THICKNESS_M"];

/// Output column holding the raw weathering grade.
pub const WEATHERING_GRADE_COLUMN: &str = "WETH_GRAD";

/// Output column holding the simplified weathering grade.
pub const SIMPLIFIED_WEATHERING_COLUMN: &str = "WETH";

/// Master intervals per hole, holes sorted, intervals ascending.
pub type HoleIntervals = BTreeMap<String, Vec<DepthInterval>>;

// =============================================================================
// Configuration
// =============================================================================

/// One attribute copied from a source group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Candidate source columns, first present wins.
    pub sources: Vec<String>,
    /// Output column name.
    pub output: String,
}

impl AttributeMapping {
    pub fn new(sources: &[&str], output: &str) -> Self {
        Self {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            output: output.to_string(),
        }
    }
}

/// A source group with its depth columns and projected attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSource {
    pub group: String,
    /// Candidate top-depth columns.
    pub top: Vec<String>,
    /// Candidate base-depth columns.
    pub base: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
}

impl IntervalSource {
    pub fn new(group: &str, top: &[&str], base: &[&str], attributes: Vec<AttributeMapping>) -> Self {
        Self {
            group: group.to_string(),
            top: top.iter().map(|s| s.to_string()).collect(),
            base: base.iter().map(|s| s.to_string()).collect(),
            attributes,
        }
    }
}

/// Ordered list of source groups used for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalConfig {
    pub sources: Vec<IntervalSource>,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                IntervalSource::new(
                    "CORE",
                    &["CORE_TOP"],
                    &["CORE_BOT", "CORE_BASE"],
                    vec![
                        AttributeMapping::new(&["CORE_PREC"], "TCR"),
                        AttributeMapping::new(&["CORE_RQD"], "RQD"),
                    ],
                ),
                IntervalSource::new(
                    "DETL",
                    &["DETL_TOP"],
                    &["DETL_BASE"],
                    vec![AttributeMapping::new(&["DETL_DESC"], "DETAILS")],
                ),
                IntervalSource::new(
                    "FRAC",
                    &["FRAC_TOP"],
                    &["FRAC_BASE"],
                    vec![AttributeMapping::new(&["FRAC_FI"], "FI")],
                ),
                IntervalSource::new(
                    "GEOL",
                    &["GEOL_TOP"],
                    &["GEOL_BASE"],
                    vec![
                        AttributeMapping::new(&["GEOL_LEG"], "GEOL"),
                        AttributeMapping::new(&["GEOL_DESC"], "GEOL_DESC"),
                    ],
                ),
                IntervalSource::new(
                    "WETH",
                    &["WETH_TOP"],
                    &["WETH_BASE"],
                    vec![AttributeMapping::new(
                        &["WETH_GRAD", "WETH_WETH"],
                        WEATHERING_GRADE_COLUMN,
                    )],
                ),
                IntervalSource::new(
                    "SAMP",
                    &["SAMP_TOP"],
                    &["SAMP_BASE"],
                    vec![
                        AttributeMapping::new(&["SAMP_REF"], "SAMP_REF"),
                        AttributeMapping::new(&["SAMP_TYPE"], "SAMP_TYPE"),
                    ],
                ),
            ],
        }
    }
}

impl IntervalConfig {
    /// Load and validate a mapping from JSON.
    pub fn from_json(json: &str) -> TransformResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> TransformResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject mappings that could not produce a table.
    pub fn validate(&self) -> TransformResult<()> {
        if self.sources.is_empty() {
            return Err(TransformError::InvalidConfig("no source groups".into()));
        }
        for source in &self.sources {
            if source.group.trim().is_empty() {
                return Err(TransformError::InvalidConfig("source with empty group name".into()));
            }
            if source.top.is_empty() || source.base.is_empty() {
                return Err(TransformError::InvalidConfig(format!(
                    "group {} needs top and base depth columns",
                    source.group
                )));
            }
            for attribute in &source.attributes {
                if attribute.sources.is_empty() || attribute.output.trim().is_empty() {
                    return Err(TransformError::InvalidConfig(format!(
                        "group {} has an attribute without sources or output",
                        source.group
                    )));
                }
                if KEY_COLUMNS.contains(&attribute.output.as_str()) {
                    return Err(TransformError::InvalidConfig(format!(
                        "output column {} is reserved",
                        attribute.output
                    )));
                }
            }
        }
        Ok(())
    }

    /// Output attribute columns in configuration order, without repeats.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for attribute in self.sources.iter().flat_map(|s| &s.attributes) {
            if !columns.contains(&attribute.output) {
                columns.push(attribute.output.clone());
            }
        }
        columns
    }
}

// =============================================================================
// Engine
// =============================================================================

/// A reconciled table plus the source groups that had to be left out.
#[derive(Debug, Clone)]
pub struct IntervalOutcome {
    pub table: Table,
    pub skipped: Vec<ReconcileError>,
}

/// Runs reconciliation for one mapping.
#[derive(Debug, Clone, Default)]
pub struct IntervalEngine {
    config: IntervalConfig,
}

impl IntervalEngine {
    pub fn new(config: IntervalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntervalConfig {
        &self.config
    }

    /// Master intervals per hole over every usable source group.
    pub fn master_intervals(&self, groups: &BTreeMap<String, Table>) -> HoleIntervals {
        let (sources, _) = self.resolve(groups);
        master_intervals_of(&sources)
    }

    /// Mapped mode: configured attributes under their output names.
    pub fn mapped(&self, groups: &BTreeMap<String, Table>) -> IntervalOutcome {
        let (sources, skipped) = self.resolve(groups);

        let mut columns = key_columns();
        columns.extend(self.config.output_columns());
        let simplify = columns.iter().any(|c| c == WEATHERING_GRADE_COLUMN)
            && !columns.iter().any(|c| c == SIMPLIFIED_WEATHERING_COLUMN);
        if simplify {
            columns.push(SIMPLIFIED_WEATHERING_COLUMN.to_string());
        }

        let mut grid = Grid::new(master_intervals_of(&sources), columns.len());
        for source in &sources {
            let projections: Vec<(usize, usize)> = source
                .spec
                .attributes
                .iter()
                .filter_map(|attribute| {
                    let from = source.table.find_any_column(&attribute.sources)?;
                    let to = columns.iter().position(|c| c == &attribute.output)?;
                    Some((from, to))
                })
                .collect();
            grid.project(source, &projections);
        }

        let mut table = grid.into_table(columns);
        if simplify {
            fill_simplified_weathering(&mut table);
        }
        IntervalOutcome { table, skipped }
    }

    /// Full mode: every non-structural column of every source group.
    pub fn full(&self, groups: &BTreeMap<String, Table>) -> IntervalOutcome {
        let (sources, skipped) = self.resolve(groups);

        let mut columns = key_columns();
        let mut plans: Vec<Vec<(usize, usize)>> = Vec::with_capacity(sources.len());
        for source in &sources {
            let mut projections = Vec::new();
            for (idx, name) in source.table.columns.iter().enumerate() {
                if source.is_structural(idx) {
                    continue;
                }
                let to = match columns.iter().position(|c| c == name) {
                    Some(to) => to,
                    None => {
                        columns.push(name.clone());
                        columns.len() - 1
                    }
                };
                projections.push((idx, to));
            }
            plans.push(projections);
        }

        let mut grid = Grid::new(master_intervals_of(&sources), columns.len());
        for (source, projections) in sources.iter().zip(&plans) {
            grid.project(source, projections);
        }

        IntervalOutcome {
            table: grid.into_table(columns),
            skipped,
        }
    }

    fn resolve<'a>(
        &'a self,
        groups: &'a BTreeMap<String, Table>,
    ) -> (Vec<ResolvedSource<'a>>, Vec<ReconcileError>) {
        let mut sources = Vec::new();
        let mut skipped = Vec::new();

        for spec in &self.config.sources {
            match ResolvedSource::resolve(spec, groups) {
                Ok(Some(source)) => sources.push(source),
                Ok(None) => {}
                Err(err) => {
                    log_warning(format!("Skipping {} for intervals: {}", spec.group, err));
                    skipped.push(err);
                }
            }
        }
        (sources, skipped)
    }
}

/// Master intervals per hole for the given source groups.
pub fn calculate_master_intervals(
    groups: &BTreeMap<String, Table>,
    sources: &[IntervalSource],
) -> HoleIntervals {
    IntervalEngine::new(IntervalConfig {
        sources: sources.to_vec(),
    })
    .master_intervals(groups)
}

/// Reconcile with the default mapping, mapped output columns.
pub fn reconcile_intervals_mapped(groups: &BTreeMap<String, Table>) -> Table {
    IntervalEngine::default().mapped(groups).table
}

/// Reconcile with the default mapping, every source column copied.
pub fn reconcile_intervals_full(groups: &BTreeMap<String, Table>) -> Table {
    IntervalEngine::default().full(groups).table
}

fn key_columns() -> Vec<String> {
    KEY_COLUMNS.iter().map(|c| c.to_string()).collect()
}

// =============================================================================
// Join internals
// =============================================================================

/// A source group with its identifier and depth columns located.
struct ResolvedSource<'a> {
    spec: &'a IntervalSource,
    table: &'a Table,
    hole: usize,
    top: usize,
    base: usize,
}

impl<'a> ResolvedSource<'a> {
    /// `Ok(None)` when the group is absent.
    fn resolve(
        spec: &'a IntervalSource,
        groups: &'a BTreeMap<String, Table>,
    ) -> Result<Option<Self>, ReconcileError> {
        let table = groups.get(&spec.group).or_else(|| {
            groups
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&spec.group))
                .map(|(_, table)| table)
        });
        let Some(table) = table else {
            return Ok(None);
        };

        let missing = |column: String| ReconcileError::MissingRequiredColumn {
            group: spec.group.clone(),
            column,
        };
        let hole = table
            .hole_id_column()
            .ok_or_else(|| missing(HOLE_ID_COLUMNS.join("/")))?;
        let top = table
            .find_any_column(&spec.top)
            .ok_or_else(|| missing(spec.top.join("/")))?;
        let base = table
            .find_any_column(&spec.base)
            .ok_or_else(|| missing(spec.base.join("/")))?;

        Ok(Some(Self {
            spec,
            table,
            hole,
            top,
            base,
        }))
    }

    fn hole_of(&self, row: &[Value]) -> Option<String> {
        let id = value_text(row.get(self.hole)?).trim().to_string();
        (!id.is_empty()).then_some(id)
    }

    fn depths_of(&self, row: &[Value]) -> (Option<f64>, Option<f64>) {
        let depth = |idx: usize| row.get(idx).and_then(value_as_f64);
        (depth(self.top), depth(self.base))
    }

    fn is_structural(&self, idx: usize) -> bool {
        idx == self.hole
            || idx == self.top
            || idx == self.base
            || self.table.columns[idx].eq_ignore_ascii_case(SOURCE_FILE_COLUMN)
    }
}

fn master_intervals_of(sources: &[ResolvedSource<'_>]) -> HoleIntervals {
    let mut depths: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for source in sources {
        for row in &source.table.rows {
            let Some(hole) = source.hole_of(row) else {
                continue;
            };
            let (top, base) = source.depths_of(row);
            if top.is_none() && base.is_none() {
                continue;
            }
            depths.entry(hole).or_default().extend(top.into_iter().chain(base));
        }
    }

    depths
        .into_iter()
        .filter_map(|(hole, mut values)| {
            values.sort_by(f64::total_cmp);
            values.dedup();
            if values.len() < 2 {
                return None;
            }
            let intervals = values
                .windows(2)
                .map(|pair| DepthInterval::new(pair[0], pair[1]))
                .collect();
            Some((hole, intervals))
        })
        .collect()
}

/// Output cells per master interval, grouped by hole.
struct Grid {
    holes: BTreeMap<String, HoleSlices>,
    width: usize,
}

struct HoleSlices {
    intervals: Vec<DepthInterval>,
    cells: Vec<Vec<Value>>,
}

impl Grid {
    fn new(master: HoleIntervals, width: usize) -> Self {
        let holes = master
            .into_iter()
            .map(|(hole, intervals)| {
                let cells = vec![vec![Value::Null; width]; intervals.len()];
                (hole, HoleSlices { intervals, cells })
            })
            .collect();
        Self { holes, width }
    }

    /// Copy `(source column, output column)` pairs of every source row onto
    /// the slices it covers. Later rows overwrite earlier ones.
    fn project(&mut self, source: &ResolvedSource<'_>, projections: &[(usize, usize)]) {
        if projections.is_empty() {
            return;
        }
        for row in &source.table.rows {
            let Some(hole) = source.hole_of(row) else {
                continue;
            };
            let (Some(top), Some(base)) = source.depths_of(row) else {
                continue;
            };
            let Some(HoleSlices { intervals, cells }) = self.holes.get_mut(&hole) else {
                continue;
            };

            let start = intervals.partition_point(|interval| interval.from < top);
            let covered = intervals[start..]
                .iter()
                .zip(cells[start..].iter_mut())
                .take_while(|(interval, _)| interval.starts_within(top, base));

            for (_, slice) in covered {
                for &(from, to) in projections {
                    slice[to] = row.get(from).cloned().unwrap_or(Value::Null);
                }
            }
        }
    }

    fn into_table(self, columns: Vec<String>) -> Table {
        let mut table = Table::new(columns);
        for (hole, slices) in self.holes {
            for (interval, mut cells) in slices.intervals.into_iter().zip(slices.cells) {
                cells.resize(self.width, Value::Null);
                cells[0] = Value::String(hole.clone());
                cells[1] = Value::from(interval.from);
                cells[2] = Value::from(interval.to);
                cells[3] = Value::from(interval.thickness);
                table.push_row(cells);
            }
        }
        table
    }
}

// =============================================================================
// Weathering grade
// =============================================================================

static ROMAN_GRADE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(VI|IV|V|III|II|I)\b").expect("Invalid embedded pattern")
});

fn roman_value(numeral: &str) -> u8 {
    match numeral.to_ascii_uppercase().as_str() {
        "I" => 1,
        "II" => 2,
        "III" => 3,
        "IV" => 4,
        "V" => 5,
        "VI" => 6,
        _ => 0,
    }
}

/// Reduce a compound weathering grade such as `II/III` to its highest
/// (most weathered) Roman numeral. Anything without a numeral is returned
/// trimmed.
pub fn simplify_weathering_grade(grade: &str) -> String {
    ROMAN_GRADE
        .find_iter(grade)
        .map(|m| m.as_str().to_ascii_uppercase())
        .max_by_key(|numeral| roman_value(numeral))
        .unwrap_or_else(|| grade.trim().to_string())
}

fn fill_simplified_weathering(table: &mut Table) {
    let (Some(source), Some(target)) = (
        table.column_index(WEATHERING_GRADE_COLUMN),
        table.column_index(SIMPLIFIED_WEATHERING_COLUMN),
    ) else {
        return;
    };
    for row in &mut table.rows {
        let grade = value_text(&row[source]).trim().to_string();
        row[target] = if grade.is_empty() {
            Value::Null
        } else {
            Value::String(simplify_weathering_grade(&grade))
        };
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Rows of `hole` whose interval contains `depth` (`from <= depth < to`).
pub fn query_depth(table: &Table, hole: &str, depth: f64) -> Table {
    select_intervals(table, hole, |from, to| from <= depth && depth < to)
}

/// Rows of `hole` whose interval overlaps `[from, to)`.
pub fn query_range(table: &Table, hole: &str, from: f64, to: f64) -> Table {
    select_intervals(table, hole, |start, end| start < to && end > from)
}

fn select_intervals(table: &Table, hole: &str, keep: impl Fn(f64, f64) -> bool) -> Table {
    let mut selected = Table {
        rows: Vec::new(),
        ..table.clone()
    };
    let (Some(hole_idx), Some(from_idx), Some(to_idx)) = (
        table.column_index(KEY_COLUMNS[0]),
        table.column_index(KEY_COLUMNS[1]),
        table.column_index(KEY_COLUMNS[2]),
    ) else {
        return selected;
    };

    let hole = hole.trim();
    selected.rows = table
        .rows
        .iter()
        .filter(|row| value_text(&row[hole_idx]).trim() == hole)
        .filter(|row| match (value_as_f64(&row[from_idx]), value_as_f64(&row[to_idx])) {
            (Some(from), Some(to)) => keep(from, to),
            _ => false,
        })
        .cloned()
        .collect();
    selected
}

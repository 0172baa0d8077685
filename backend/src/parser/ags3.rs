//! AGS3 parser.
//!
//! AGS3 has no explicit line descriptors: `"**GROUP"` opens a group,
//! `"*HEADING"` fields name its columns, and anything else is data. Real files
//! split heading lines, repeat headings, continue rows with `<CONT>` lines and
//! sprinkle control lines in between, so the parser is deliberately lossy:
//! it always produces tables and never reports issues.
//!
//! Parsing is a fold of [`Ags3State`] over the decoded lines.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::tokenizer::{normalize_token, split_quoted_csv};
use super::{decode_content, stamp_source, AgsParser};
use crate::models::{AgsVersion, ParsedFile, Table, CONTINUATION_SEPARATOR};

const CONTINUATION_TOKEN: &str = "<CONT>";
const CONTROL_TOKENS: [&str; 5] = ["<UNITS>", "UNIT", "<UNIT>", "PROJ", "ABBR"];
const UNIT_TOKENS: [&str; 3] = ["<UNITS>", "UNIT", "<UNIT>"];

/// AGS3 implementation of [`AgsParser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Ags3Parser;

impl AgsParser for Ags3Parser {
    fn parse(&self, bytes: &[u8], filename: &str) -> ParsedFile {
        let (text, encoding) = decode_content(bytes);

        let mut file = ParsedFile::new(filename, AgsVersion::Ags3);
        file.groups = parse_groups(&text, filename);
        file.metadata
            .insert("Encoding".to_string(), encoding.to_string());
        file
    }
}

/// Parse decoded AGS3 text into canonical, provenance-tagged tables.
pub fn parse_groups(text: &str, filename: &str) -> BTreeMap<String, Table> {
    let state = text.lines().fold(Ags3State::default(), Ags3State::step);

    let mut groups: BTreeMap<String, Table> = BTreeMap::new();
    for (name, builder) in state.groups {
        let mut table = builder.into_table();
        canonicalize_columns(&mut table);
        stamp_source(&mut table, filename);

        let name = canonical_name(&name);
        match groups.get_mut(&name) {
            Some(existing) => existing.append(table),
            None => {
                groups.insert(name, table);
            }
        }
    }
    groups
}

// =============================================================================
// Fold state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    NoGroup,
    InHeadings,
    InData,
}

/// Parser state carried from line to line.
#[derive(Debug, Default)]
struct Ags3State {
    phase: Phase,
    current: Option<String>,
    groups: BTreeMap<String, GroupBuilder>,
}

impl Ags3State {
    fn step(mut self, line: &str) -> Self {
        if line.trim().is_empty() {
            return self;
        }
        let fields = split_quoted_csv(line);
        let Some(first) = fields.first() else {
            return self;
        };
        let keyword = normalize_token(first);

        if keyword == CONTINUATION_TOKEN {
            self.continuation(&fields);
        } else if keyword.is_empty()
            && fields.len() > 1
            && normalize_token(&fields[1]) == CONTINUATION_TOKEN
        {
            // `"","<CONT>",...` puts the marker one position late
            self.continuation(&fields[1..]);
        } else if CONTROL_TOKENS.contains(&keyword.as_str()) {
            if UNIT_TOKENS.contains(&keyword.as_str()) {
                self.units(&fields);
            }
        } else if let Some(name) = keyword.strip_prefix("**") {
            self.open_group(name.trim().to_string());
        } else if keyword.starts_with('*') {
            self.headings(&fields);
        } else {
            self.data(&fields);
        }
        self
    }

    fn current_group(&mut self) -> Option<&mut GroupBuilder> {
        let name = self.current.as_ref()?;
        self.groups.get_mut(name)
    }

    fn open_group(&mut self, name: String) {
        if name.is_empty() {
            self.current = None;
            self.phase = Phase::NoGroup;
            return;
        }
        self.groups.entry(name.clone()).or_default().reset_headings();
        self.current = Some(name);
        self.phase = Phase::InHeadings;
    }

    fn headings(&mut self, fields: &[String]) {
        let extend = self.phase == Phase::InHeadings;
        let names: Vec<String> = fields
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(|f| f.strip_prefix('*').unwrap_or(f).trim().to_string())
            .collect();

        // Once data has been seen, every heading line replaces until the next group
        if let Some(group) = self.current_group() {
            group.set_headings(names, extend);
        }
    }

    fn data(&mut self, fields: &[String]) {
        let pushed = match self.current_group() {
            Some(group) if !group.headings.is_empty() => {
                group.push_row(fields);
                true
            }
            _ => false,
        };
        if pushed {
            self.phase = Phase::InData;
        }
    }

    fn continuation(&mut self, fields: &[String]) {
        if let Some(group) = self.current_group() {
            group.merge_continuation(fields);
        }
    }

    fn units(&mut self, fields: &[String]) {
        if let Some(group) = self.current_group() {
            group.record_units(fields);
        }
    }
}

// =============================================================================
// Group builder
// =============================================================================

/// Rows of one group, stored against the union of every heading set seen.
#[derive(Debug, Default)]
struct GroupBuilder {
    /// Headings as read, before duplicate renaming.
    raw_headings: Vec<String>,
    /// Active headings (unique).
    headings: Vec<String>,
    /// Union of all active heading sets, first-seen order.
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    units: BTreeMap<String, String>,
}

impl GroupBuilder {
    fn reset_headings(&mut self) {
        self.raw_headings.clear();
        self.headings.clear();
    }

    fn set_headings(&mut self, names: Vec<String>, extend: bool) {
        if extend && !self.raw_headings.is_empty() {
            self.raw_headings.extend(names);
        } else {
            self.raw_headings = names;
        }
        self.headings = unique_headings(&self.raw_headings);

        for heading in &self.headings {
            if !self.columns.contains(heading) {
                self.columns.push(heading.clone());
            }
        }
    }

    fn column_of(&self, heading_idx: usize) -> Option<usize> {
        let heading = self.headings.get(heading_idx)?;
        self.columns.iter().position(|c| c == heading)
    }

    fn push_row(&mut self, fields: &[String]) {
        let mut row = vec![Value::Null; self.columns.len()];
        for idx in 0..self.headings.len() {
            let value = fields.get(idx).cloned().unwrap_or_default();
            if let Some(col) = self.column_of(idx) {
                row[col] = Value::String(value);
            }
        }
        self.rows.push(row);
    }

    /// Merge a `<CONT>` line into the last row. Position `i` of the line
    /// belongs to heading `i`; position 0 holds the marker itself.
    fn merge_continuation(&mut self, fields: &[String]) {
        if self.headings.is_empty() || self.rows.is_empty() {
            return;
        }
        let width = self.columns.len();

        for idx in 1..self.headings.len() {
            let Some(value) = fields.get(idx).map(|v| v.trim()) else {
                break;
            };
            if value.is_empty() {
                continue;
            }
            let Some(col) = self.column_of(idx) else {
                continue;
            };
            let Some(row) = self.rows.last_mut() else {
                return;
            };
            if row.len() < width {
                row.resize(width, Value::Null);
            }

            let previous = match &row[col] {
                Value::String(s) => s.clone(),
                _ => String::new(),
            };
            let already_present = previous
                .split(CONTINUATION_SEPARATOR)
                .any(|part| part.trim() == value);
            if already_present {
                continue;
            }

            row[col] = Value::String(if previous.is_empty() {
                value.to_string()
            } else {
                format!("{previous}{CONTINUATION_SEPARATOR}{value}")
            });
        }
    }

    fn record_units(&mut self, fields: &[String]) {
        for (idx, unit) in fields.iter().enumerate().skip(1) {
            let unit = unit.trim();
            if unit.is_empty() {
                continue;
            }
            if let Some(heading) = self.headings.get(idx) {
                self.units.insert(heading.clone(), unit.to_string());
            }
        }
    }

    fn into_table(self) -> Table {
        let mut table = Table::new(self.columns);
        table.units = self.units;
        for row in self.rows {
            table.push_row(row);
        }
        table
    }
}

// =============================================================================
// Naming
// =============================================================================

/// Make headings unique by suffixing repeats with `_2`, `_3`, ...
///
/// The first occurrence keeps its name. A suffix that would clash with
/// another heading is skipped.
pub fn unique_headings(raw: &[String]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::with_capacity(raw.len());

    for name in raw {
        let count = counts.entry(name.as_str()).or_insert(0);
        *count += 1;

        let mut candidate = if *count == 1 {
            name.clone()
        } else {
            format!("{name}_{count}")
        };
        while used.contains(&candidate) {
            *count += 1;
            candidate = format!("{name}_{count}");
        }

        used.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Legacy AGS3 names: `?ETH…` is weathering (`WETH…`), any other leading `?`
/// marks a non-standard name and is dropped.
pub fn canonical_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("?ETH") {
        format!("WETH{rest}")
    } else if let Some(rest) = name.strip_prefix('?') {
        rest.to_string()
    } else {
        name.to_string()
    }
}

fn canonicalize_columns(table: &mut Table) {
    if !table.columns.iter().any(|c| c.starts_with('?')) {
        return;
    }
    let renamed: Vec<String> = table.columns.iter().map(|c| canonical_name(c)).collect();
    for (idx, name) in unique_headings(&renamed).into_iter().enumerate() {
        if table.columns[idx] != name {
            table.rename_column(idx, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SOURCE_FILE_COLUMN;
    use serde_json::json;

    fn parse(content: &str) -> ParsedFile {
        Ags3Parser.parse(content.as_bytes(), "site.ags")
    }

    fn column<'a>(table: &'a Table, name: &str) -> Vec<&'a Value> {
        let idx = table.column_index(name).unwrap();
        table.rows.iter().map(|r| &r[idx]).collect()
    }

    #[test]
    fn test_basic_group() {
        let file = parse(concat!(
            "\"**HOLE\"\n",
            "\"*HOLE_ID\",\"*HOLE_TYPE\"\n",
            "\"<UNITS>\",\"\"\n",
            "\"BH1\",\"CP\"\n",
            "\"BH2\",\"RC\"\n",
        ));

        assert!(file.is_valid());
        assert_eq!(file.version, AgsVersion::Ags3);
        let hole = file.group("HOLE").unwrap();
        assert_eq!(hole.columns, vec!["HOLE_ID", "HOLE_TYPE", SOURCE_FILE_COLUMN]);
        assert_eq!(hole.len(), 2);
        assert_eq!(hole.rows[1], vec![json!("BH2"), json!("RC"), json!("site.ags")]);
    }

    #[test]
    fn test_duplicate_headings_are_suffixed() {
        let file = parse(concat!(
            "\"**GEOL\"\n",
            "\"*HOLE_ID\",\"*GEOL_DESC\",\"*GEOL_DESC\",\"*GEOL_DESC\"\n",
            "\"BH1\",\"a\",\"b\",\"c\"\n",
        ));

        let geol = file.group("GEOL").unwrap();
        assert_eq!(
            geol.columns,
            vec!["HOLE_ID", "GEOL_DESC", "GEOL_DESC_2", "GEOL_DESC_3", SOURCE_FILE_COLUMN]
        );
        assert_eq!(geol.get(0, "GEOL_DESC_3"), Some(&json!("c")));
    }

    #[test]
    fn test_unique_headings_avoids_existing_suffix() {
        let raw: Vec<String> = ["A", "A_2", "A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_headings(&raw), vec!["A", "A_2", "A_3"]);
    }

    #[test]
    fn test_split_heading_lines_are_appended() {
        let file = parse(concat!(
            "\"**GEOL\"\n",
            "\"*HOLE_ID\",\"*GEOL_TOP\"\n",
            "\"*GEOL_BASE\",\"*GEOL_DESC\"\n",
            "\"BH1\",\"0.0\",\"1.5\",\"Clay\"\n",
        ));

        let geol = file.group("GEOL").unwrap();
        assert_eq!(
            geol.columns,
            vec!["HOLE_ID", "GEOL_TOP", "GEOL_BASE", "GEOL_DESC", SOURCE_FILE_COLUMN]
        );
        assert_eq!(geol.get(0, "GEOL_DESC"), Some(&json!("Clay")));
    }

    #[test]
    fn test_headings_after_data_replace() {
        let file = parse(concat!(
            "\"**GEOL\"\n",
            "\"*HOLE_ID\",\"*GEOL_TOP\"\n",
            "\"BH1\",\"0.0\"\n",
            "\"*HOLE_ID\",\"*GEOL_DESC\"\n",
            "\"BH2\",\"Sand\"\n",
        ));

        let geol = file.group("GEOL").unwrap();
        assert_eq!(
            geol.columns,
            vec!["HOLE_ID", "GEOL_TOP", "GEOL_DESC", SOURCE_FILE_COLUMN]
        );
        assert_eq!(geol.rows[0][2], Value::Null);
        assert_eq!(geol.rows[1], vec![json!("BH2"), Value::Null, json!("Sand"), json!("site.ags")]);
    }

    #[test]
    fn test_short_and_long_rows() {
        let file = parse(concat!(
            "\"**HOLE\"\n",
            "\"*HOLE_ID\",\"*HOLE_TYPE\",\"*HOLE_REM\"\n",
            "\"BH1\"\n",
            "\"BH2\",\"CP\",\"x\",\"extra\"\n",
        ));

        let hole = file.group("HOLE").unwrap();
        assert_eq!(hole.rows[0][..3], [json!("BH1"), json!(""), json!("")]);
        assert_eq!(hole.rows[1][..3], [json!("BH2"), json!("CP"), json!("x")]);
        assert_eq!(hole.columns.len(), 4);
    }

    #[test]
    fn test_continuation_merge() {
        let file = parse(concat!(
            "\"**GEOL\"\n",
            "\"*HOLE_ID\",\"*GEOL_DESC\",\"*GEOL_REM\"\n",
            "\"BH1\",\"Firm\",\"\"\n",
            "\"<CONT>\",\"brown CLAY\",\"\"\n",
            "\"\",\"<CONT>\",\"with gravel\"\n",
        ));

        let geol = file.group("GEOL").unwrap();
        assert_eq!(column(geol, "GEOL_DESC"), vec![&json!("Firm | brown CLAY | with gravel")]);
        assert_eq!(geol.len(), 1);
    }

    #[test]
    fn test_continuation_merge_is_idempotent() {
        let file = parse(concat!(
            "\"**GEOL\"\n",
            "\"*HOLE_ID\",\"*GEOL_DESC\"\n",
            "\"BH1\",\"Firm\"\n",
            "\"<CONT>\",\"CLAY\"\n",
            "\"<CONT>\",\"CLAY\"\n",
            "\"<CONT>\",\"Firm\"\n",
        ));

        let geol = file.group("GEOL").unwrap();
        assert_eq!(geol.get(0, "GEOL_DESC"), Some(&json!("Firm | CLAY")));
    }

    #[test]
    fn test_orphan_continuation_ignored() {
        let file = parse(concat!(
            "\"<CONT>\",\"lost\"\n",
            "\"**GEOL\"\n",
            "\"*HOLE_ID\",\"*GEOL_DESC\"\n",
            "\"<CONT>\",\"lost too\"\n",
            "\"BH1\",\"Clay\"\n",
        ));

        let geol = file.group("GEOL").unwrap();
        assert_eq!(geol.len(), 1);
        assert_eq!(geol.get(0, "GEOL_DESC"), Some(&json!("Clay")));
    }

    #[test]
    fn test_control_lines_never_become_rows() {
        let file = parse(concat!(
            "\"**SAMP\"\n",
            "\"*HOLE_ID\",\"*SAMP_TOP\"\n",
            "\"<UNITS>\",\"m\"\n",
            "\"UNIT\",\"m\"\n",
            "\"PROJ\",\"x\"\n",
            "\"ABBR\",\"y\"\n",
            "\"BH1\",\"1.0\"\n",
        ));

        let samp = file.group("SAMP").unwrap();
        assert_eq!(samp.len(), 1);
        assert_eq!(samp.units.get("SAMP_TOP").map(String::as_str), Some("m"));
    }

    #[test]
    fn test_legacy_aliases() {
        let file = parse(concat!(
            "\"**?ETH\"\n",
            "\"*HOLE_ID\",\"*?ETH_TOP\",\"*?ETH_BASE\",\"*?ETH_GRAD\"\n",
            "\"BH1\",\"0\",\"2\",\"II\"\n",
            "\"**?LEGD\"\n",
            "\"*?LEGD_CODE\"\n",
            "\"101\"\n",
        ));

        let weth = file.group("WETH").unwrap();
        assert_eq!(
            weth.columns,
            vec!["HOLE_ID", "WETH_TOP", "WETH_BASE", "WETH_GRAD", SOURCE_FILE_COLUMN]
        );
        assert!(file.group("?ETH").is_none());

        let legd = file.group("LEGD").unwrap();
        assert_eq!(legd.columns[0], "LEGD_CODE");
    }

    #[test]
    fn test_alias_collision_merges_groups() {
        let file = parse(concat!(
            "\"**WETH\"\n",
            "\"*HOLE_ID\",\"*WETH_GRAD\"\n",
            "\"BH1\",\"I\"\n",
            "\"**?ETH\"\n",
            "\"*HOLE_ID\",\"*?ETH_GRAD\"\n",
            "\"BH2\",\"III\"\n",
        ));

        assert_eq!(file.groups.len(), 1);
        let weth = file.group("WETH").unwrap();
        assert_eq!(weth.len(), 2);
        assert_eq!(column(weth, "WETH_GRAD"), vec![&json!("III"), &json!("I")]);
    }

    #[test]
    fn test_garbage_is_lossy_not_fatal() {
        let file = parse("just some text\n\"\"\n,,,\n");
        assert!(file.is_valid());
        assert!(file.groups.is_empty());
    }
}

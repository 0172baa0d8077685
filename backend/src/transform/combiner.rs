//! Cross-file combining of parsed groups.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{is_informative, ParsedFile, Table, SOURCE_FILE_COLUMN};
use crate::parser::ags3::unique_headings;

/// Rows need at least this many informative cells to survive combining.
pub const MIN_INFORMATIVE_CELLS: usize = 2;

/// Combine the groups of every valid file into one table per group.
///
/// Rows keep file order then row order. The schema of a group is the
/// first-seen union of its columns across files; cells a file never had are
/// null. Invalid files and empty tables contribute nothing.
pub fn combine<'a>(files: impl IntoIterator<Item = &'a ParsedFile>) -> BTreeMap<String, Table> {
    let mut combined: BTreeMap<String, Table> = BTreeMap::new();

    for file in files.into_iter().filter(|f| f.is_valid()) {
        for (name, table) in &file.groups {
            if table.is_empty() {
                continue;
            }
            let table = normalize_table(table.clone(), &file.filename);

            match combined.get_mut(name) {
                Some(existing) => existing.append(table),
                None => {
                    combined.insert(name.clone(), table);
                }
            }
        }
    }

    for table in combined.values_mut() {
        drop_degenerate_rows(table);
    }
    combined
}

/// Uppercase and trim column names, keeping them unique, and stamp the
/// provenance column when the table has none.
fn normalize_table(mut table: Table, filename: &str) -> Table {
    let normalized: Vec<String> = table
        .columns
        .iter()
        .map(|c| c.trim().to_uppercase())
        .collect();

    for (idx, name) in unique_headings(&normalized).into_iter().enumerate() {
        if table.columns[idx] != name {
            table.rename_column(idx, name);
        }
    }

    table.add_column(SOURCE_FILE_COLUMN, Value::String(filename.to_string()));
    table
}

/// Remove rows with fewer than two informative cells.
///
/// The provenance column counts, so a row holding only its source filename is
/// dropped while one real value plus the filename is kept.
pub fn drop_degenerate_rows(table: &mut Table) {
    table
        .rows
        .retain(|row| row.iter().filter(|v| is_informative(v)).count() >= MIN_INFORMATIVE_CELLS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgsVersion;
    use serde_json::json;

    fn file(name: &str, groups: Vec<(&str, Table)>) -> ParsedFile {
        let mut file = ParsedFile::new(name, AgsVersion::Ags4);
        for (group, table) in groups {
            file.groups.insert(group.to_string(), table);
        }
        file
    }

    fn geol(rows: &[(&str, &str)]) -> Table {
        let mut table = Table::new(["LOCA_ID", "GEOL_DESC"]);
        for (hole, desc) in rows {
            table.push_row(vec![json!(hole), json!(desc)]);
        }
        table
    }

    fn sorted_rows(table: &Table) -> Vec<String> {
        let mut rows: Vec<String> = table
            .rows
            .iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn test_combine_stamps_source_and_keeps_order() {
        let a = file("a.ags", vec![("GEOL", geol(&[("BH1", "Clay"), ("BH1", "Sand")]))]);
        let b = file("b.ags", vec![("GEOL", geol(&[("BH9", "Rock")]))]);

        let combined = combine([&a, &b]);
        let table = &combined["GEOL"];

        assert_eq!(table.columns, vec!["LOCA_ID", "GEOL_DESC", SOURCE_FILE_COLUMN]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[2], vec![json!("BH9"), json!("Rock"), json!("b.ags")]);
        assert_eq!(table.get(0, SOURCE_FILE_COLUMN), Some(&json!("a.ags")));
    }

    #[test]
    fn test_combine_existing_source_column_kept() {
        let mut table = geol(&[("BH1", "Clay")]);
        table.add_column(SOURCE_FILE_COLUMN, json!("original.ags"));
        let a = file("renamed.ags", vec![("GEOL", table)]);

        let combined = combine([&a]);
        assert_eq!(combined["GEOL"].get(0, SOURCE_FILE_COLUMN), Some(&json!("original.ags")));
    }

    #[test]
    fn test_combine_is_order_independent() {
        let a = file("a.ags", vec![("GEOL", geol(&[("BH1", "Clay")]))]);
        let b = file("b.ags", vec![("GEOL", geol(&[("BH2", "Sand"), ("BH3", "Silt")]))]);

        let ab = combine([&a, &b]);
        let ba = combine([&b, &a]);
        assert_eq!(sorted_rows(&ab["GEOL"]), sorted_rows(&ba["GEOL"]));
    }

    #[test]
    fn test_combine_normalizes_columns() {
        let mut table = Table::new([" loca_id ", "Geol_Desc", "GEOL_DESC"]);
        table.push_row(vec![json!("BH1"), json!("a"), json!("b")]);
        let a = file("a.ags", vec![("GEOL", table)]);

        let combined = combine([&a]);
        assert_eq!(
            combined["GEOL"].columns,
            vec!["LOCA_ID", "GEOL_DESC", "GEOL_DESC_2", SOURCE_FILE_COLUMN]
        );
    }

    #[test]
    fn test_combine_skips_invalid_and_empty() {
        let mut bad = file("bad.ags", vec![("GEOL", geol(&[("BH1", "Clay")]))]);
        bad.errors.push(crate::models::ParseIssue::new("Parser", 0, "broken"));
        let empty = file("empty.ags", vec![("GEOL", geol(&[])), ("LOCA", Table::new(["LOCA_ID"]))]);

        let combined = combine([&bad, &empty]);
        assert!(combined.is_empty());
    }

    #[test]
    fn test_combine_unions_schemas() {
        let mut core = Table::new(["LOCA_ID", "CORE_TOP"]);
        core.push_row(vec![json!("BH1"), json!("0")]);
        let mut other = Table::new(["LOCA_ID", "CORE_RQD"]);
        other.push_row(vec![json!("BH2"), json!("80")]);

        let a = file("a.ags", vec![("CORE", core)]);
        let b = file("b.ags", vec![("CORE", other)]);
        let combined = combine([&a, &b]);
        let table = &combined["CORE"];

        assert_eq!(table.columns, vec!["LOCA_ID", "CORE_TOP", SOURCE_FILE_COLUMN, "CORE_RQD"]);
        assert_eq!(table.rows[0][3], Value::Null);
        assert_eq!(table.rows[1][1], Value::Null);
    }

    #[test]
    fn test_degenerate_filter() {
        let mut table = Table::new(["LOCA_ID", "GEOL_DESC", SOURCE_FILE_COLUMN]);
        table.push_row(vec![json!(""), Value::Null, json!("a.ags")]);
        table.push_row(vec![json!("BH1"), json!("  "), json!("a.ags")]);
        table.push_row(vec![Value::Null, json!(2.5), Value::Null]);

        drop_degenerate_rows(&mut table);

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0][0], json!("BH1"));
    }
}

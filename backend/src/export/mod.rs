//! Table output.
//!
//! Workbook assembly happens outside this crate; this module hands tables
//! over either as one CSV per group or as a JSON document.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ExportResult;
use crate::models::{value_text, Table};

/// Write each table to `<dir>/<prefix><GROUP>.csv`.
///
/// Returns the written paths in group order. Null cells are written empty,
/// numbers in their shortest form.
pub fn write_tables_csv(
    dir: &Path,
    tables: &BTreeMap<String, Table>,
    prefix: &str,
) -> ExportResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(tables.len());
    for (group, table) in tables {
        let path = dir.join(format!("{}{}.csv", prefix, group));
        write_table_csv(&path, table)?;
        written.push(path);
    }
    Ok(written)
}

/// Write one table as CSV with a header row.
pub fn write_table_csv(path: &Path, table: &Table) -> ExportResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    write_records(&mut writer, table)?;
    writer.flush()?;
    Ok(())
}

/// Render one table as CSV text.
pub fn table_to_csv_string(table: &Table) -> ExportResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_records(&mut writer, table)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_records<W: std::io::Write>(writer: &mut csv::Writer<W>, table: &Table) -> ExportResult<()> {
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| value_text(v).into_owned()))?;
    }
    Ok(())
}

/// Tables as a JSON object: group → `{columns, rows}`.
pub fn tables_to_json(tables: &BTreeMap<String, Table>) -> Value {
    let groups: Map<String, Value> = tables
        .iter()
        .map(|(group, table)| {
            (
                group.clone(),
                json!({
                    "columns": table.columns,
                    "rows": table.rows,
                }),
            )
        })
        .collect();
    Value::Object(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> BTreeMap<String, Table> {
        let mut geol = Table::new(["HOLE_ID", "DEPTH_FROM", "GEOL_DESC"]);
        geol.push_row(vec![json!("BH1"), json!(1.5), json!("Clay, firm")]);
        geol.push_row(vec![json!("BH2"), json!(2.0), Value::Null]);
        BTreeMap::from([("GEOL".to_string(), geol)])
    }

    #[test]
    fn test_csv_text() {
        let csv = table_to_csv_string(&sample()["GEOL"]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "HOLE_ID,DEPTH_FROM,GEOL_DESC");
        assert_eq!(lines[1], "BH1,1.5,\"Clay, firm\"");
        assert_eq!(lines[2], "BH2,2.0,");
    }

    #[test]
    fn test_write_tables_csv() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_tables_csv(dir.path(), &sample(), "site_").unwrap();

        assert_eq!(paths, vec![dir.path().join("site_GEOL.csv")]);
        let content = std::fs::read_to_string(&paths[0]).unwrap();
        assert!(content.starts_with("HOLE_ID,DEPTH_FROM,GEOL_DESC"));
    }

    #[test]
    fn test_tables_to_json() {
        let json = tables_to_json(&sample());
        assert_eq!(json["GEOL"]["columns"][2], "GEOL_DESC");
        assert_eq!(json["GEOL"]["rows"][0][1], 1.5);
        assert!(json["GEOL"]["rows"][1][2].is_null());
    }
}

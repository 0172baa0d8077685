//! Continuation expansion.
//!
//! AGS3 `<CONT>` lines are merged into a single cell joined with `" | "`.
//! Expansion turns those cells back into rows:
//!
//! ```text
//! HOLE_ID | SAMP_REF        SAMP_TYPE            HOLE_ID | SAMP_REF | SAMP_TYPE
//! BH1     | "A | B | C"     "U | D"         →    BH1     | A        | U
//!                                                        | B        | D
//!                                                        | C        |
//! ```
//!
//! A row whose multi-valued cells only repeat one value collapses back to a
//! single row instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TransformError, TransformResult};
use crate::models::{Table, CONTINUATION_SEPARATOR};

/// How unequal continuation lists are exploded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandPolicy {
    /// Pad shorter lists, singletons included, with empty strings.
    #[default]
    Pad,
    /// Require equal list lengths and repeat singletons on every row.
    Strict,
}

/// Expand continuation cells with [`ExpandPolicy::Pad`].
pub fn expand_continuations(table: Table) -> Table {
    if !has_continuations(&table) {
        return table;
    }
    let (mut out, rows) = split_off_rows(table);
    for row in rows {
        out.rows.extend(pad_row(row));
    }
    out
}

/// Expand continuation cells with an explicit policy.
pub fn expand_continuations_with(table: Table, policy: ExpandPolicy) -> TransformResult<Table> {
    match policy {
        ExpandPolicy::Pad => Ok(expand_continuations(table)),
        ExpandPolicy::Strict => {
            if !has_continuations(&table) {
                return Ok(table);
            }
            let (mut out, rows) = split_off_rows(table);
            for (idx, row) in rows.into_iter().enumerate() {
                let expanded = strict_row(idx, row, &out.columns)?;
                out.rows.extend(expanded);
            }
            Ok(out)
        }
    }
}

/// Whether any string cell holds joined continuation values.
pub fn has_continuations(table: &Table) -> bool {
    table.rows.iter().flatten().any(|v| match v {
        Value::String(s) => s.contains(CONTINUATION_SEPARATOR),
        _ => false,
    })
}

fn split_off_rows(mut table: Table) -> (Table, Vec<Vec<Value>>) {
    let rows = std::mem::take(&mut table.rows);
    (table, rows)
}

fn split_cell(value: Value) -> Vec<Value> {
    match value {
        Value::String(s) if s.contains(CONTINUATION_SEPARATOR) => s
            .split(CONTINUATION_SEPARATOR)
            .map(|part| Value::String(part.trim().to_string()))
            .collect(),
        other => vec![other],
    }
}

enum SplitRow {
    /// Nothing varies; the row collapses to the first value of each cell.
    Single(Vec<Value>),
    /// Per-cell value lists to explode.
    Lists(Vec<Vec<Value>>),
}

fn split_row(row: Vec<Value>) -> SplitRow {
    let cells: Vec<Vec<Value>> = row.into_iter().map(split_cell).collect();

    let varies = cells
        .iter()
        .filter(|list| list.len() > 1)
        .any(|list| list.iter().any(|v| v != &list[0]));

    if varies {
        SplitRow::Lists(cells)
    } else {
        SplitRow::Single(
            cells
                .into_iter()
                .map(|list| list.into_iter().next().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

fn pad_row(row: Vec<Value>) -> Vec<Vec<Value>> {
    let cells = match split_row(row) {
        SplitRow::Lists(cells) => cells,
        SplitRow::Single(row) => return vec![row],
    };
    let height = cells.iter().map(Vec::len).max().unwrap_or(1);

    (0..height)
        .map(|k| {
            cells
                .iter()
                .map(|list| list.get(k).cloned().unwrap_or_else(|| Value::String(String::new())))
                .collect()
        })
        .collect()
}

fn strict_row(idx: usize, row: Vec<Value>, columns: &[String]) -> TransformResult<Vec<Vec<Value>>> {
    let cells = match split_row(row) {
        SplitRow::Lists(cells) => cells,
        SplitRow::Single(row) => return Ok(vec![row]),
    };

    let mut height: Option<usize> = None;
    for (col, list) in cells.iter().enumerate().filter(|(_, l)| l.len() > 1) {
        match height {
            None => height = Some(list.len()),
            Some(expected) if expected != list.len() => {
                return Err(TransformError::ContinuationMismatch {
                    row: idx,
                    column: columns.get(col).cloned().unwrap_or_default(),
                    expected,
                    found: list.len(),
                });
            }
            Some(_) => {}
        }
    }
    let height = height.unwrap_or(1);

    Ok((0..height)
        .map(|k| {
            cells
                .iter()
                .map(|list| match list.len() {
                    1 => list[0].clone(),
                    _ => list[k].clone(),
                })
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn samp(rows: Vec<Vec<Value>>) -> Table {
        let mut table = Table::new(["HOLE_ID", "SAMP_REF", "SAMP_TYPE"]);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    #[test]
    fn test_no_separator_is_noop() {
        let table = samp(vec![vec![json!("BH1"), json!("A"), json!(1.5)]]);
        assert_eq!(expand_continuations(table.clone()), table);
    }

    #[test]
    fn test_identical_values_collapse() {
        let table = samp(vec![vec![json!("BH1"), json!("A | A"), json!("U")]]);
        let out = expand_continuations(table);

        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0], vec![json!("BH1"), json!("A"), json!("U")]);
    }

    #[test]
    fn test_explode_pads_shorter_lists() {
        let table = samp(vec![vec![json!("BH1"), json!("A | B | C"), json!("U | D")]]);
        let out = expand_continuations(table);

        assert_eq!(out.len(), 3);
        assert_eq!(out.rows[0], vec![json!("BH1"), json!("A"), json!("U")]);
        assert_eq!(out.rows[1], vec![json!(""), json!("B"), json!("D")]);
        assert_eq!(out.rows[2], vec![json!(""), json!("C"), json!("")]);
    }

    #[test]
    fn test_plain_rows_pass_through() {
        let table = samp(vec![
            vec![json!("BH1"), json!("A | B"), json!("U")],
            vec![json!("BH2"), json!("C"), Value::Null],
        ]);
        let out = expand_continuations(table);

        assert_eq!(out.len(), 3);
        assert_eq!(out.rows[2], vec![json!("BH2"), json!("C"), Value::Null]);
    }

    #[test]
    fn test_strict_repeats_singletons() {
        let table = samp(vec![vec![json!("BH1"), json!("A | B"), json!("U | D")]]);
        let out = expand_continuations_with(table, ExpandPolicy::Strict).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out.rows[1], vec![json!("BH1"), json!("B"), json!("D")]);
    }

    #[test]
    fn test_strict_rejects_unequal_lengths() {
        let table = samp(vec![
            vec![json!("BH0"), json!("X"), json!("Y")],
            vec![json!("BH1"), json!("A | B | C"), json!("U | D")],
        ]);
        let err = expand_continuations_with(table, ExpandPolicy::Strict).unwrap_err();

        match err {
            TransformError::ContinuationMismatch { row, column, expected, found } => {
                assert_eq!(row, 1);
                assert_eq!(column, "SAMP_TYPE");
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_policy_serde() {
        assert_eq!(serde_json::to_value(ExpandPolicy::Strict).unwrap(), json!("strict"));
        assert_eq!(ExpandPolicy::default(), ExpandPolicy::Pad);
    }
}

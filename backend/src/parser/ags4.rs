//! AGS4 parser.
//!
//! Two layers:
//! - [`read_tables`] - strict reader over the `GROUP`/`HEADING`/`UNIT`/`TYPE`/`DATA`
//!   line taxonomy, stopping at the first structural error
//! - [`Ags4Parser`] - wrapper that never fails; a reader error becomes a single
//!   [`ParseIssue`] on an otherwise empty [`ParsedFile`]

use serde_json::Value;
use std::collections::btree_map::Entry;
use thiserror::Error;

use super::ags3::unique_headings;
use super::tokenizer::{normalize_token, split_quoted_csv};
use super::{decode_content, stamp_source, AgsParser};
use crate::models::{AgsVersion, ParseIssue, ParsedFile, Table};

/// Rule id used for reader failures.
pub const PARSER_RULE: &str = "Parser";

/// Structural failures of the strict reader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ags4ReadError {
    #[error("Line {line}: {descriptor} row found before any GROUP row")]
    OutsideGroup { line: usize, descriptor: String },

    #[error("Line {line}: GROUP row has no group name")]
    MissingGroupName { line: usize },

    #[error("Line {line}: {descriptor} row in group {group} found before its HEADING row")]
    MissingHeading {
        line: usize,
        group: String,
        descriptor: String,
    },

    #[error(
        "Line {line}: {descriptor} row in group {group} has {found} entries, HEADING row has {expected}"
    )]
    FieldCountMismatch {
        line: usize,
        group: String,
        descriptor: String,
        expected: usize,
        found: usize,
    },
}

/// One group as read, before conversion to a [`Table`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGroup {
    pub name: String,
    /// Line of the `GROUP` row.
    pub line: usize,
    pub headings: Vec<String>,
    pub units: Option<Vec<String>>,
    pub types: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl RawGroup {
    fn new(name: String, line: usize) -> Self {
        Self {
            name,
            line,
            ..Self::default()
        }
    }

    /// Convert to a table; `UNIT`/`TYPE` rows become column metadata.
    pub fn into_table(self) -> Table {
        let mut table = Table::new(self.headings);
        if let Some(units) = self.units {
            table.units = zip_metadata(&table.columns, units);
        }
        if let Some(types) = self.types {
            table.types = zip_metadata(&table.columns, types);
        }
        for row in self.rows {
            table.push_row(row.into_iter().map(Value::String).collect());
        }
        table
    }
}

fn zip_metadata(
    columns: &[String],
    values: Vec<String>,
) -> std::collections::BTreeMap<String, String> {
    columns
        .iter()
        .cloned()
        .zip(values)
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
}

/// Read every group of an AGS4 document.
///
/// Line numbers in errors are 1-based and count blank lines. Descriptors
/// other than the five structural ones are skipped.
pub fn read_tables(text: &str) -> Result<Vec<RawGroup>, Ags4ReadError> {
    let mut groups: Vec<RawGroup> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_quoted_csv(line);
        let Some(first) = fields.first() else {
            continue;
        };
        let descriptor = normalize_token(first);
        let values = &fields[1..];

        match descriptor.as_str() {
            "GROUP" => {
                let name = values
                    .first()
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default();
                if name.is_empty() {
                    return Err(Ags4ReadError::MissingGroupName { line: line_no });
                }
                groups.push(RawGroup::new(name, line_no));
            }
            "HEADING" => {
                let group = groups.last_mut().ok_or_else(|| Ags4ReadError::OutsideGroup {
                    line: line_no,
                    descriptor: descriptor.clone(),
                })?;
                let raw: Vec<String> = values.iter().map(|v| v.trim().to_string()).collect();
                group.headings = unique_headings(&raw);
            }
            "UNIT" | "TYPE" | "DATA" => {
                let group = groups.last_mut().ok_or_else(|| Ags4ReadError::OutsideGroup {
                    line: line_no,
                    descriptor: descriptor.clone(),
                })?;
                if group.headings.is_empty() {
                    return Err(Ags4ReadError::MissingHeading {
                        line: line_no,
                        group: group.name.clone(),
                        descriptor,
                    });
                }
                if values.len() != group.headings.len() {
                    return Err(Ags4ReadError::FieldCountMismatch {
                        line: line_no,
                        group: group.name.clone(),
                        descriptor,
                        expected: group.headings.len(),
                        found: values.len(),
                    });
                }

                let values = values.to_vec();
                match descriptor.as_str() {
                    "UNIT" => group.units = Some(values),
                    "TYPE" => group.types = Some(values),
                    _ => group.rows.push(values),
                }
            }
            _ => {}
        }
    }

    Ok(groups)
}

/// AGS4 implementation of [`AgsParser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Ags4Parser;

impl AgsParser for Ags4Parser {
    fn parse(&self, bytes: &[u8], filename: &str) -> ParsedFile {
        let (text, encoding) = decode_content(bytes);

        let mut file = ParsedFile::new(filename, AgsVersion::Ags4);
        file.metadata
            .insert("Encoding".to_string(), encoding.to_string());

        match read_tables(&text) {
            Ok(raw_groups) => {
                for raw in raw_groups {
                    let name = raw.name.clone();
                    let mut table = raw.into_table();
                    stamp_source(&mut table, filename);

                    // A repeated GROUP row continues the same group
                    match file.groups.entry(name) {
                        Entry::Occupied(mut entry) => entry.get_mut().append(table),
                        Entry::Vacant(entry) => {
                            entry.insert(table);
                        }
                    }
                }
            }
            Err(err) => {
                file.errors
                    .push(ParseIssue::new(PARSER_RULE, 0, err.to_string()));
            }
        }

        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SOURCE_FILE_COLUMN;
    use serde_json::json;

    const SAMPLE: &str = concat!(
        "\"GROUP\",\"LOCA\"\n",
        "\"HEADING\",\"LOCA_ID\",\"LOCA_TYPE\",\"LOCA_FDEP\"\n",
        "\"UNIT\",\"\",\"\",\"m\"\n",
        "\"TYPE\",\"ID\",\"PA\",\"2DP\"\n",
        "\"DATA\",\"BH1\",\"CP\",\"12.50\"\n",
        "\"DATA\",\"BH2\",\"RC\",\"30.00\"\n",
        "\n",
        "\"GROUP\",\"GEOL\"\n",
        "\"HEADING\",\"LOCA_ID\",\"GEOL_TOP\",\"GEOL_BASE\"\n",
        "\"UNIT\",\"\",\"m\",\"m\"\n",
        "\"TYPE\",\"ID\",\"2DP\",\"2DP\"\n",
        "\"DATA\",\"BH1\",\"0.00\",\"1.20\"\n",
    );

    #[test]
    fn test_read_tables() {
        let groups = read_tables(SAMPLE).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "LOCA");
        assert_eq!(groups[0].rows.len(), 2);
        assert_eq!(groups[1].line, 8);
        assert_eq!(
            groups[1].units.as_deref(),
            Some(&["".to_string(), "m".to_string(), "m".to_string()][..])
        );
    }

    #[test]
    fn test_parse_sample() {
        let file = Ags4Parser.parse(SAMPLE.as_bytes(), "a.ags");
        assert!(file.is_valid());
        assert_eq!(file.version, AgsVersion::Ags4);

        let loca = file.group("LOCA").unwrap();
        assert_eq!(
            loca.columns,
            vec!["LOCA_ID", "LOCA_TYPE", "LOCA_FDEP", SOURCE_FILE_COLUMN]
        );
        assert_eq!(loca.rows[0], vec![json!("BH1"), json!("CP"), json!("12.50"), json!("a.ags")]);
        assert_eq!(loca.units.get("LOCA_FDEP").map(String::as_str), Some("m"));
        assert!(!loca.units.contains_key("LOCA_ID"));
        assert_eq!(loca.types.get("LOCA_ID").map(String::as_str), Some("ID"));
    }

    #[test]
    fn test_duplicate_headings() {
        let text = concat!(
            "\"GROUP\",\"SAMP\"\n",
            "\"HEADING\",\"LOCA_ID\",\"SAMP_REF\",\"SAMP_REF\"\n",
            "\"DATA\",\"BH1\",\"A\",\"B\"\n",
        );
        let groups = read_tables(text).unwrap();
        assert_eq!(groups[0].headings, vec!["LOCA_ID", "SAMP_REF", "SAMP_REF_2"]);
    }

    #[test]
    fn test_data_before_group() {
        let err = read_tables("\"DATA\",\"BH1\"\n").unwrap_err();
        assert!(matches!(err, Ags4ReadError::OutsideGroup { line: 1, .. }));
    }

    #[test]
    fn test_data_before_heading() {
        let err = read_tables("\"GROUP\",\"LOCA\"\n\"DATA\",\"BH1\"\n").unwrap_err();
        assert_eq!(
            err,
            Ags4ReadError::MissingHeading {
                line: 2,
                group: "LOCA".into(),
                descriptor: "DATA".into(),
            }
        );
    }

    #[test]
    fn test_group_without_name() {
        let err = read_tables("\"GROUP\"\n").unwrap_err();
        assert_eq!(err, Ags4ReadError::MissingGroupName { line: 1 });
    }

    #[test]
    fn test_field_count_mismatch() {
        let text = concat!(
            "\"GROUP\",\"LOCA\"\n",
            "\"HEADING\",\"LOCA_ID\",\"LOCA_TYPE\"\n",
            "\n",
            "\"DATA\",\"BH1\"\n",
        );
        let err = read_tables(text).unwrap_err();
        assert_eq!(
            err,
            Ags4ReadError::FieldCountMismatch {
                line: 4,
                group: "LOCA".into(),
                descriptor: "DATA".into(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn test_unknown_descriptors_skipped() {
        let text = concat!(
            "\"COMMENT\",\"hello\"\n",
            "\"GROUP\",\"LOCA\"\n",
            "\"HEADING\",\"LOCA_ID\"\n",
            "\"NOTE\",\"x\",\"y\",\"z\"\n",
            "\"DATA\",\"BH1\"\n",
        );
        let groups = read_tables(text).unwrap();
        assert_eq!(groups[0].rows, vec![vec!["BH1".to_string()]]);
    }

    #[test]
    fn test_reader_error_becomes_single_issue() {
        let file = Ags4Parser.parse(b"\"GROUP\",\"LOCA\"\n\"DATA\",\"BH1\"\n", "bad.ags");

        assert!(!file.is_valid());
        assert!(file.groups.is_empty());
        assert_eq!(file.errors.len(), 1);
        assert_eq!(file.errors[0].rule, PARSER_RULE);
        assert_eq!(file.errors[0].line, 0);
        assert!(file.errors[0].message.contains("before its HEADING"));
    }

    #[test]
    fn test_repeated_group_is_appended() {
        let text = concat!(
            "\"GROUP\",\"LOCA\"\n",
            "\"HEADING\",\"LOCA_ID\"\n",
            "\"DATA\",\"BH1\"\n",
            "\"GROUP\",\"LOCA\"\n",
            "\"HEADING\",\"LOCA_ID\"\n",
            "\"DATA\",\"BH2\"\n",
        );
        let file = Ags4Parser.parse(text.as_bytes(), "a.ags");
        assert_eq!(file.group("LOCA").unwrap().len(), 2);
    }
}

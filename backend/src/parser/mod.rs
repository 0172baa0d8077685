//! AGS file parsing: decoding, version detection and the two group parsers.
//!
//! Parsers never fail. Whatever goes wrong ends up as
//! [`crate::models::ParseIssue`]s on the returned [`ParsedFile`].

pub mod ags3;
pub mod ags4;
pub mod detect;
pub mod tokenizer;

use serde_json::Value;

use crate::models::{AgsVersion, ParseIssue, ParsedFile, Table, SOURCE_FILE_COLUMN};

pub use ags3::Ags3Parser;
pub use ags4::{Ags4Parser, Ags4ReadError};
pub use detect::{analyze_content, detect_version};
pub use tokenizer::{normalize_token, split_quoted_csv};

/// A parser for one AGS dialect.
pub trait AgsParser {
    /// Parse raw file bytes. Always returns a file; problems are recorded in
    /// [`ParsedFile::errors`].
    fn parse(&self, bytes: &[u8], filename: &str) -> ParsedFile;
}

/// Parser chosen for a detected version.
#[derive(Debug, Clone, Copy)]
pub enum Parser {
    Ags3(Ags3Parser),
    Ags4(Ags4Parser),
    /// No version markers found; nothing is read.
    Unrecognized,
}

impl Parser {
    pub fn for_version(version: AgsVersion) -> Self {
        match version {
            AgsVersion::Ags3 => Self::Ags3(Ags3Parser),
            AgsVersion::Ags4 => Self::Ags4(Ags4Parser),
            AgsVersion::Unknown => Self::Unrecognized,
        }
    }
}

impl AgsParser for Parser {
    fn parse(&self, bytes: &[u8], filename: &str) -> ParsedFile {
        match self {
            Self::Ags3(parser) => parser.parse(bytes, filename),
            Self::Ags4(parser) => parser.parse(bytes, filename),
            Self::Unrecognized => {
                let mut file = ParsedFile::new(filename, AgsVersion::Unknown);
                file.errors.push(ParseIssue::new(
                    "Detection",
                    0,
                    "No AGS3 or AGS4 markers found",
                ));
                file
            }
        }
    }
}

/// Parse a file as the given version, attaching content diagnostics.
pub fn parse(bytes: &[u8], filename: &str, version: AgsVersion) -> ParsedFile {
    let mut file = Parser::for_version(version).parse(bytes, filename);
    file.metadata.extend(analyze_content(bytes));
    file
}

/// Detect the version, then [`parse`].
pub fn parse_auto(bytes: &[u8], filename: &str) -> ParsedFile {
    parse(bytes, filename, detect_version(bytes))
}

/// Decode file bytes to text.
///
/// Strict UTF-8 first (a BOM is dropped), Windows-1252 otherwise. Never fails.
/// Returns the text and the name of the encoding used.
pub fn decode_content(bytes: &[u8]) -> (String, &'static str) {
    let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
    if !had_errors {
        return (text.into_owned(), encoding_rs::UTF_8.name());
    }

    let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
    (text.into_owned(), encoding_rs::WINDOWS_1252.name())
}

/// Set the provenance column of every row to `filename`.
pub(crate) fn stamp_source(table: &mut Table, filename: &str) {
    let idx = table.add_column(SOURCE_FILE_COLUMN, Value::Null);
    for row in &mut table.rows {
        row[idx] = Value::String(filename.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGS3: &str = "\"**HOLE\"\n\"*HOLE_ID\",\"*HOLE_TYPE\"\n\"BH1\",\"CP\"\n";
    const AGS4: &str = "\"GROUP\",\"LOCA\"\n\"HEADING\",\"LOCA_ID\"\n\"DATA\",\"BH1\"\n";

    #[test]
    fn test_factory() {
        assert!(matches!(Parser::for_version(AgsVersion::Ags3), Parser::Ags3(_)));
        assert!(matches!(Parser::for_version(AgsVersion::Ags4), Parser::Ags4(_)));
        assert!(matches!(Parser::for_version(AgsVersion::Unknown), Parser::Unrecognized));
    }

    #[test]
    fn test_parse_auto_both_versions() {
        let file = parse_auto(AGS3.as_bytes(), "a.ags");
        assert_eq!(file.version, AgsVersion::Ags3);
        assert_eq!(file.group("HOLE").unwrap().len(), 1);
        assert_eq!(file.metadata["AGS3"], "Yes");

        let file = parse_auto(AGS4.as_bytes(), "b.ags");
        assert_eq!(file.version, AgsVersion::Ags4);
        assert_eq!(file.group("LOCA").unwrap().len(), 1);
        assert_eq!(file.metadata["Lines"], "3");
    }

    #[test]
    fn test_unknown_content_yields_no_groups() {
        let file = parse(b"hello,world\n", "x.txt", AgsVersion::Unknown);
        assert!(file.groups.is_empty());
    }

    #[test]
    fn test_unknown_content_reported_as_unknown() {
        let file = parse(b"hello,world\n", "x.txt", AgsVersion::Unknown);
        assert_eq!(file.version, AgsVersion::Unknown);
        assert!(!file.is_valid());
        assert_eq!(file.errors[0].rule, "Detection");
        assert_eq!(file.errors[0].line, 0);
        assert_eq!(file.metadata["AGS3"], "No");
    }

    #[test]
    fn test_parse_auto_unknown_content() {
        let file = parse_auto(b"just some text\n", "notes.txt");
        assert_eq!(file.version, AgsVersion::Unknown);
        assert_eq!(file.errors.len(), 1);
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        let (text, encoding) = decode_content(b"\xEF\xBB\xBFGROUP");
        assert_eq!(text, "GROUP");
        assert_eq!(encoding, "UTF-8");
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        // "Société" in Windows-1252
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let (text, encoding) = decode_content(bytes);
        assert_eq!(text, "Société");
        assert_eq!(encoding, "windows-1252");
    }

    #[test]
    fn test_stamp_source_overwrites() {
        let mut table = Table::new(["A", SOURCE_FILE_COLUMN]);
        table.push_row(vec![Value::from("1"), Value::from("old.ags")]);
        stamp_source(&mut table, "new.ags");
        assert_eq!(table.rows[0][1], Value::from("new.ags"));
    }
}

//! Line tokenizer shared by both AGS parsers.
//!
//! AGS lines are double-quoted, comma-separated fields. Splitting goes through
//! the `csv` reader (flexible width, no header row) so embedded commas and
//! doubled quotes are handled; anything the reader cannot make sense of gives
//! an empty field list instead of an error.

use csv::{ReaderBuilder, StringRecord};

/// Split one line into its fields.
///
/// Blank lines give an empty list. A space before an opening quote is
/// tolerated (`"A", "B"`).
pub fn split_quoted_csv(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.iter().map(clean_field).collect(),
        Ok(false) | Err(_) => Vec::new(),
    }
}

/// Undo quoting the reader leaves in place when a quote follows whitespace.
fn clean_field(field: &str) -> String {
    let field = field.trim_start();
    match field
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => field.to_string(),
    }
}

/// Keyword view of a field: no BOM, no surrounding whitespace or quotes,
/// uppercased.
pub fn normalize_token(token: &str) -> String {
    token
        .trim_start_matches('\u{feff}')
        .trim()
        .trim_matches('"')
        .trim_start_matches('\u{feff}')
        .trim()
        .to_uppercase()
}

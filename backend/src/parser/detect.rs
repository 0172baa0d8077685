//! Version detection and content diagnostics.

use std::collections::BTreeMap;

use super::decode_content;
use super::tokenizer::{normalize_token, split_quoted_csv};
use crate::models::AgsVersion;

/// Detection looks no further than this many non-blank lines.
pub const DETECTION_LINE_LIMIT: usize = 50;

const CONTINUATION_TOKEN: &str = "<CONT>";
const UNIT_TOKENS: [&str; 3] = ["<UNITS>", "<UNIT>", "UNIT"];

/// Detect the AGS version of raw file bytes. Never fails.
pub fn detect_version(bytes: &[u8]) -> AgsVersion {
    let (text, _) = decode_content(bytes);
    detect_version_text(&text)
}

/// Detect the AGS version of already decoded text.
///
/// The first line whose leading token is `GROUP` means AGS4; one whose leading
/// token starts with `**` means AGS3.
pub fn detect_version_text(text: &str) -> AgsVersion {
    for line in non_blank_lines(text).take(DETECTION_LINE_LIMIT) {
        let Some(first) = split_quoted_csv(line).into_iter().next() else {
            continue;
        };
        let token = normalize_token(&first);
        if token == "GROUP" {
            return AgsVersion::Ags4;
        }
        if token.starts_with("**") {
            return AgsVersion::Ags3;
        }
    }
    AgsVersion::Unknown
}

/// Diagnostic flags for a file, stored as parse metadata.
///
/// Keys: `AGS3`, `AGS4` (`Yes`/`No`), `Encoding`, `Lines`, `Continuations`,
/// `Units`.
pub fn analyze_content(bytes: &[u8]) -> BTreeMap<String, String> {
    let (text, encoding) = decode_content(bytes);
    let version = detect_version_text(&text);

    let mut lines = 0usize;
    let mut continuations = 0usize;
    let mut units = 0usize;

    for line in non_blank_lines(&text) {
        lines += 1;
        let tokens: Vec<String> = split_quoted_csv(line)
            .iter()
            .take(2)
            .map(|t| normalize_token(t))
            .collect();

        let first = tokens.first().map(String::as_str).unwrap_or_default();
        let second = tokens.get(1).map(String::as_str).unwrap_or_default();

        if first == CONTINUATION_TOKEN || (first.is_empty() && second == CONTINUATION_TOKEN) {
            continuations += 1;
        } else if UNIT_TOKENS.contains(&first) {
            units += 1;
        }
    }

    let yes_no = |flag: bool| String::from(if flag { "Yes" } else { "No" });

    BTreeMap::from([
        ("AGS3".to_string(), yes_no(version == AgsVersion::Ags3)),
        ("AGS4".to_string(), yes_no(version == AgsVersion::Ags4)),
        ("Encoding".to_string(), encoding.to_string()),
        ("Lines".to_string(), lines.to_string()),
        ("Continuations".to_string(), continuations.to_string()),
        ("Units".to_string(), units.to_string()),
    ])
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| !line.trim().is_empty())
}

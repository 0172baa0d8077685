//! Borehole identifier prefixing.
//!
//! Files from different contractors often reuse hole names (`BH1`). Prefixing
//! identifiers with a short tag derived from the filename keeps them apart
//! once files are combined.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::Table;

const PREFIX_LENGTH: usize = 5;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Z0-9]").expect("Invalid embedded pattern"));

/// Prefix for a filename: stem before the first `.`, uppercased, reduced to
/// `[A-Z0-9]`, first five characters, plus `_`.
///
/// `None` when nothing alphanumeric is left.
pub fn derive_prefix(filename: &str) -> Option<String> {
    let stem = filename.split('.').next().unwrap_or_default().to_uppercase();
    let cleaned = NON_ALPHANUMERIC.replace_all(&stem, "");
    if cleaned.is_empty() {
        return None;
    }
    let short: String = cleaned.chars().take(PREFIX_LENGTH).collect();
    Some(format!("{short}_"))
}

/// Prefix the identifier column of every table in place.
///
/// The identifier column is the first of `HOLE_ID`, `LOCA_ID`, `HOLEID`
/// present. Empty values stay empty; tables without an identifier column are
/// left alone.
pub fn apply_prefix(groups: &mut BTreeMap<String, Table>, prefix: &str) {
    for table in groups.values_mut() {
        let Some(idx) = table.hole_id_column() else {
            continue;
        };
        for row in &mut table.rows {
            let Some(cell) = row.get_mut(idx) else {
                continue;
            };
            let prefixed = match cell {
                Value::String(s) if !s.trim().is_empty() => format!("{prefix}{}", s.trim()),
                Value::Number(n) => format!("{prefix}{n}"),
                _ => continue,
            };
            *cell = Value::String(prefixed);
        }
    }
}

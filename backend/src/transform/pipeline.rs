//! Batch pipeline: many uploaded files in, one combined table set out.
//!
//! Each file goes through detect → mode check → parse → validity check →
//! optional identifier prefixing. Files are independent: a failure is
//! recorded and the batch moves on. Only a batch where nothing was accepted
//! is an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use agsmerge::{process_batch, BatchOptions, FileInput};
//!
//! let inputs = vec![
//!     FileInput::from_path("site_a.ags")?.with_prefix(true),
//!     FileInput::from_path("site_b.ags")?.with_prefix(true),
//! ];
//! let result = process_batch(&inputs, &BatchOptions::default())?;
//! for failure in &result.failures {
//!     eprintln!("{}: {}", failure.filename, failure.reason);
//! }
//! println!("{} groups", result.combined.len());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::broadcast;

use super::combiner::{combine, drop_degenerate_rows};
use super::expand::{expand_continuations_with, ExpandPolicy};
use super::prefix::{apply_prefix, derive_prefix};
use crate::error::{ParseError, PipelineError, PipelineResult};
use crate::logs::{
    log_error, log_info, log_info_indent, log_success, log_warning, log_warning_indent,
    LogEntry, LOG_BROADCASTER,
};
use crate::models::{AgsVersion, ParsedFile, Table};
use crate::parser::{analyze_content, detect_version, AgsParser, Parser};

/// Environment variable holding the default [`VersionMode`].
pub const MODE_ENV: &str = "AGSMERGE_MODE";

/// Environment variable enabling continuation expansion.
pub const EXPAND_ENV: &str = "AGSMERGE_EXPAND";

// =============================================================================
// Options
// =============================================================================

/// Which AGS versions a batch accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionMode {
    Ags3,
    Ags4,
    /// Accept either version; reject files where none is detected.
    #[default]
    Auto,
}

impl VersionMode {
    /// Check a detected version against this mode.
    pub fn check(&self, filename: &str, detected: AgsVersion) -> Result<(), ParseError> {
        let expected = match self {
            Self::Ags3 => AgsVersion::Ags3,
            Self::Ags4 => AgsVersion::Ags4,
            Self::Auto if detected == AgsVersion::Unknown => {
                return Err(ParseError::FormatDetectionFailure {
                    filename: filename.to_string(),
                })
            }
            Self::Auto => return Ok(()),
        };
        if detected == expected {
            Ok(())
        } else {
            Err(ParseError::VersionMismatch {
                filename: filename.to_string(),
                mode: expected,
                detected,
            })
        }
    }
}

impl FromStr for VersionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ags3" | "3" => Ok(Self::Ags3),
            "ags4" | "4" => Ok(Self::Ags4),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown mode '{}' (expected ags3, ags4 or auto)", other)),
        }
    }
}

impl fmt::Display for VersionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ags3 => "ags3",
            Self::Ags4 => "ags4",
            Self::Auto => "auto",
        })
    }
}

/// Options for a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Accepted AGS versions
    pub mode: VersionMode,

    /// Expand `<CONT>` values into rows after combining
    pub expand: bool,

    /// How expansion treats unequal continuation lists
    pub expand_policy: ExpandPolicy,
}

impl BatchOptions {
    /// Defaults overridden by `AGSMERGE_MODE` / `AGSMERGE_EXPAND`.
    ///
    /// Unreadable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Ok(mode) = std::env::var(MODE_ENV) {
            match mode.parse() {
                Ok(mode) => options.mode = mode,
                Err(e) => log_warning(format!("Ignoring {}: {}", MODE_ENV, e)),
            }
        }
        if let Ok(expand) = std::env::var(EXPAND_ENV) {
            options.expand = matches!(
                expand.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        options
    }
}

// =============================================================================
// Inputs and results
// =============================================================================

/// One uploaded file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInput {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Prefix hole identifiers with a tag derived from the filename.
    #[serde(default)]
    pub prefix: bool,
}

impl FileInput {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            prefix: false,
        }
    }

    pub fn with_prefix(mut self, prefix: bool) -> Self {
        self.prefix = prefix;
        self
    }

    /// Read a file from disk; the filename is the path's final component.
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(filename, bytes))
    }
}

/// A file the batch did not accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub filename: String,
    pub reason: String,
}

impl From<&ParseError> for FileFailure {
    fn from(err: &ParseError) -> Self {
        Self {
            filename: err.filename().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Result of a finished batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// One table per group across all accepted files
    pub combined: BTreeMap<String, Table>,

    /// Accepted filenames, arrival order
    pub accepted: Vec<String>,

    /// Rejected files with reasons
    pub failures: Vec<FileFailure>,

    /// Content diagnostics per filename
    pub diagnostics: BTreeMap<String, BTreeMap<String, String>>,
}

// =============================================================================
// Batch
// =============================================================================

/// A batch in progress. Feed files with [`Batch::process`], then
/// [`Batch::finish`].
#[derive(Debug, Default)]
pub struct Batch {
    options: BatchOptions,
    accepted: Vec<ParsedFile>,
    failures: Vec<FileFailure>,
    diagnostics: BTreeMap<String, BTreeMap<String, String>>,
}

impl Batch {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Files accepted so far.
    pub fn accepted(&self) -> &[ParsedFile] {
        &self.accepted
    }

    /// Files rejected so far.
    pub fn failures(&self) -> &[FileFailure] {
        &self.failures
    }

    /// Progress feed for an outer UI: every run log entry sent after this
    /// call, from this batch and any other running in the process.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        LOG_BROADCASTER.subscribe()
    }

    /// Process one file. A rejection is recorded as a [`FileFailure`] and
    /// also returned; it never poisons the batch.
    pub fn process(&mut self, input: &FileInput) -> Result<(), ParseError> {
        log_info(format!("📄 {}", input.filename));

        let flags = analyze_content(&input.bytes);
        self.diagnostics
            .insert(input.filename.clone(), flags.clone());

        match load_file(input, self.options.mode, flags) {
            Ok(file) => {
                log_info_indent(
                    format!(
                        "{} as {}: {} groups",
                        file.filename,
                        file.version,
                        file.usable_group_count()
                    ),
                    1,
                );
                self.accepted.push(file);
                Ok(())
            }
            Err(err) => {
                log_warning_indent(format!("Skipped {}: {}", input.filename, err), 1);
                self.failures.push(FileFailure::from(&err));
                Err(err)
            }
        }
    }

    /// Combine everything accepted.
    pub fn finish(self) -> PipelineResult<BatchResult> {
        if self.accepted.is_empty() {
            log_error(format!(
                "Nothing to show: {} files, none accepted",
                self.failures.len()
            ));
            return Err(PipelineError::EmptyInput);
        }

        let mut combined = combine(&self.accepted);
        if self.options.expand {
            // Padding can leave exploded rows with a single value
            for table in combined.values_mut() {
                let mut expanded =
                    expand_continuations_with(std::mem::take(table), self.options.expand_policy)
                        .map_err(|e| {
                            log_error(format!("Expansion failed: {}", e));
                            e
                        })?;
                drop_degenerate_rows(&mut expanded);
                *table = expanded;
            }
        }

        let rows: usize = combined.values().map(Table::len).sum();
        log_success(format!(
            "Combined {} groups ({} rows) from {} files, {} skipped",
            combined.len(),
            rows,
            self.accepted.len(),
            self.failures.len()
        ));

        Ok(BatchResult {
            combined,
            accepted: self.accepted.into_iter().map(|f| f.filename).collect(),
            failures: self.failures,
            diagnostics: self.diagnostics,
        })
    }
}

/// Run a whole batch.
pub fn process_batch(inputs: &[FileInput], options: &BatchOptions) -> PipelineResult<BatchResult> {
    let mut batch = Batch::new(options.clone());
    for input in inputs {
        // Rejections are already recorded on the batch
        let _ = batch.process(input);
    }
    batch.finish()
}

fn load_file(
    input: &FileInput,
    mode: VersionMode,
    flags: BTreeMap<String, String>,
) -> Result<ParsedFile, ParseError> {
    let detected = detect_version(&input.bytes);
    mode.check(&input.filename, detected)?;

    let mut file = Parser::for_version(detected).parse(&input.bytes, &input.filename);
    file.metadata.extend(flags);

    if !file.is_valid() {
        return Err(ParseError::Invalid {
            filename: input.filename.clone(),
            issues: file.errors,
        });
    }
    if file.usable_group_count() == 0 {
        return Err(ParseError::NoGroupsParsed {
            filename: input.filename.clone(),
        });
    }

    if input.prefix {
        match derive_prefix(&input.filename) {
            Some(prefix) => apply_prefix(&mut file.groups, &prefix),
            None => log_warning_indent(
                format!("No prefix can be derived from {}", input.filename),
                1,
            ),
        }
    }
    Ok(file)
}

//! Error types for the AGS processing pipeline.
//!
//! - [`ParseError`] - File-level parse failures (one per rejected file)
//! - [`TransformError`] - Continuation expansion and mapping configuration errors
//! - [`ReconcileError`] - Interval reconciliation source problems
//! - [`ExportError`] - Table serialization errors
//! - [`PipelineError`] - Top-level batch errors
//!
//! Parsers themselves never fail: malformed content is recovered locally or
//! reported as [`crate::models::ParseIssue`] data. The variants here describe
//! what happens to a whole file or a whole computation.

use thiserror::Error;

use crate::models::{AgsVersion, ParseIssue};

// =============================================================================
// Parse Errors
// =============================================================================

/// Reasons a file is rejected from a batch.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// Neither AGS3 nor AGS4 markers found.
    #[error("{filename}: could not detect AGS version")]
    FormatDetectionFailure { filename: String },

    /// Detected version does not match the active mode.
    #[error("File detected as {detected} — mode is {mode}.")]
    VersionMismatch {
        filename: String,
        mode: AgsVersion,
        detected: AgsVersion,
    },

    /// The parser reported structured issues.
    #[error("{filename}: {}", join_issues(.issues))]
    Invalid {
        filename: String,
        issues: Vec<ParseIssue>,
    },

    /// Valid format but no table holds any row.
    #[error("No valid groups parsed.")]
    NoGroupsParsed { filename: String },
}

impl ParseError {
    pub fn filename(&self) -> &str {
        match self {
            Self::FormatDetectionFailure { filename }
            | Self::VersionMismatch { filename, .. }
            | Self::Invalid { filename, .. }
            | Self::NoGroupsParsed { filename } => filename,
        }
    }
}

fn join_issues(issues: &[ParseIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Transformation Errors
// =============================================================================

/// Errors during table transformation.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Strict expansion found continuation lists of different lengths.
    #[error("Row {row}: column '{column}' has {found} continuation values, expected {expected}")]
    ContinuationMismatch {
        row: usize,
        column: String,
        expected: usize,
        found: usize,
    },

    /// Interval mapping configuration is unusable.
    #[error("Invalid interval configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Reconciliation Errors
// =============================================================================

/// A source group that had to be left out of an interval computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// None of the configured candidate columns is present.
    #[error("Group {group} is missing required column {column}")]
    MissingRequiredColumn { group: String, column: String },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing tables out.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level batch errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// No file in the batch was accepted.
    #[error("No files were successfully parsed. Check mode/version match.")]
    EmptyInput,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type TransformResult<T> = Result<T, TransformError>;

pub type ExportResult<T> = Result<T, ExportError>;

pub type PipelineResult<T> = Result<T, PipelineError>;

//! # agsmerge - AGS geotechnical file parsing and reconciliation
//!
//! agsmerge reads borehole records in the AGS3 and AGS4 transfer formats,
//! combines files from different contributors into one table per group and
//! reconciles depth intervals across measurement groups.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  AGS files  │────▶│   Parser    │────▶│  Combiner   │────▶│  Intervals  │
//! │ (AGS3/AGS4) │     │ (per file)  │     │ (per group) │     │ (per hole)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agsmerge::{process_batch, reconcile_intervals_mapped, BatchOptions, FileInput};
//!
//! let inputs = vec![FileInput::from_path("site.ags")?];
//! let result = process_batch(&inputs, &BatchOptions::default())?;
//! let intervals = reconcile_intervals_mapped(&result.combined);
//! println!("{} master intervals", intervals.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (Table, ParsedFile, DepthInterval)
//! - [`parser`] - Decoding, version detection, AGS3/AGS4 parsers
//! - [`transform`] - Prefixing, combining, expansion, intervals, pipeline
//! - [`export`] - CSV / JSON output
//! - [`logs`] - Run log broadcaster

// Core modules
pub mod error;
pub mod logs;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Output
pub mod export;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ExportError,
    ParseError,
    PipelineError,
    ReconcileError,
    TransformError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AgsVersion,
    DepthInterval,
    ParseIssue,
    ParsedFile,
    Table,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    analyze_content,
    decode_content,
    detect_version,
    parse,
    parse_auto,
    AgsParser,
    Ags3Parser,
    Ags4Parser,
    Ags4ReadError,
    Parser,
};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    apply_prefix,
    calculate_master_intervals,
    combine,
    derive_prefix,
    expand_continuations,
    expand_continuations_with,
    query_depth,
    query_range,
    reconcile_intervals_full,
    reconcile_intervals_mapped,
    simplify_weathering_grade,
    ExpandPolicy,
    IntervalConfig,
    IntervalEngine,
    IntervalOutcome,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    process_batch,
    Batch,
    BatchOptions,
    BatchResult,
    FileFailure,
    FileInput,
    VersionMode,
};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{tables_to_json, write_tables_csv};

//! Transformation module.
//!
//! Everything that happens after a file is parsed:
//! - Prefix: Borehole identifier prefixing per file
//! - Combiner: Cross-file union of groups
//! - Expand: `<CONT>` values back into rows
//! - Intervals: Depth-interval reconciliation across groups
//! - Pipeline: Batch processing of uploaded files

pub mod combiner;
pub mod expand;
pub mod intervals;
pub mod pipeline;
pub mod prefix;

pub use combiner::{combine, drop_degenerate_rows};
pub use expand::{expand_continuations, expand_continuations_with, ExpandPolicy};
pub use intervals::{
    calculate_master_intervals, query_depth, query_range, reconcile_intervals_full,
    reconcile_intervals_mapped, simplify_weathering_grade, AttributeMapping, IntervalConfig,
    IntervalEngine, IntervalOutcome, IntervalSource,
};
pub use pipeline::*;
pub use prefix::{apply_prefix, derive_prefix};

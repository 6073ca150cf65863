//! SQL preparation
//!
//! Statement splitting, comment stripping and source-offset mapping. No SQL is
//! parsed beyond what is needed to find statement boundaries.

mod position;
mod splitter;

pub use position::{engine_position_to_line_col, offset_to_line_col};
pub use splitter::{
    split, split_script, split_variants, strip_comments, PrepareError, Statement, StatementBounds,
    VARIANT_SEPARATOR,
};

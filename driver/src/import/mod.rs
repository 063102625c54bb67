//! Moving rows from a source table, view or filtered select into a destination table.
//!
//! [`import_table`] resolves the source and the destination, picks a [`LoadStrategy`], loads a
//! staging table when one is needed and merges it into the destination.

mod destination;
mod merge;
mod orchestrator;
mod source;
mod staging;

pub use destination::{
    ResolvedDestination, resolve_destination, validate_columns_exist,
    validate_incremental_destination,
};
pub use merge::MergeEngine;
pub use orchestrator::import_table;
pub use source::{ImportSource, SourceContext, SourceResolver};
pub use staging::{
    LoadStrategy, StagingTable, choose_load_strategy, load_staging, run_with_staging,
    shapes_identical,
};

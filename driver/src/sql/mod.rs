//! SQL generation for BigQuery.
//!
//! Builders emit `:name` placeholders internally; [`rewrite_placeholders`] turns them into the
//! `@name` form BigQuery expects as their final step.

mod cast;
pub mod ddl;
mod filter;
mod import_query;
mod placeholders;
pub mod quote;

pub use cast::{SUPPORTED_CAST_TYPES, cast_expression, cast_value, column_reference};
pub use filter::{QueryMode, SampleRequest, TableQueryBuilder, validate_change_window};
pub use import_query::{ImportSelect, LoadSelect, dedup_select};
pub use placeholders::rewrite_placeholders;

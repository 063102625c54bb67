//! BigQuery storage driver.
//!
//! Maps storage commands onto BigQuery: filtered selects and deletes, table imports through
//! staging tables and merges, previews and exports. All statements go through an
//! [`client::ExecutionClient`], so the import engine can be exercised without a warehouse.

pub mod client;
pub mod commands;
pub mod driver;
pub mod error;
pub mod import;
mod macros;
pub mod sql;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

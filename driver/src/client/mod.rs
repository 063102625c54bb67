//! Remote execution of SQL and catalog operations.

mod base;
pub mod bigquery;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use base::ExecutionClient;

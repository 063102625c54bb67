use std::future::Future;

use crate::error::DriverResult;
use crate::types::{BoundQuery, RowSet, TableDefinition, TableRef, TableStats};

/// Executes statements and catalog lookups against the warehouse.
///
/// One client is created per command and passed by reference through the import engine. Retrying
/// throttled requests is the client's concern, callers see [`crate::error::ErrorKind::TooManyRequests`]
/// only once the client gave up.
pub trait ExecutionClient {
    /// Runs a statement and waits until the job completes.
    fn submit_query(&self, query: &BoundQuery) -> impl Future<Output = DriverResult<RowSet>> + Send;

    /// Reads the current definition of a table or view.
    ///
    /// Fails with [`crate::error::ErrorKind::ObjectNotFound`] when it does not exist.
    fn reflect_table(
        &self,
        table: &TableRef,
    ) -> impl Future<Output = DriverResult<TableDefinition>> + Send;

    fn table_exists(&self, table: &TableRef) -> impl Future<Output = DriverResult<bool>> + Send;

    /// Drops a table or view. Dropping a missing object is not an error.
    fn drop_table(&self, table: &TableRef) -> impl Future<Output = DriverResult<()>> + Send;

    /// Creates a table with the columns of `definition`.
    fn create_table(
        &self,
        definition: &TableDefinition,
    ) -> impl Future<Output = DriverResult<()>> + Send;

    fn table_stats(&self, table: &TableRef)
    -> impl Future<Output = DriverResult<TableStats>> + Send;
}

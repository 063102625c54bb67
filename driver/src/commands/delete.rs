use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::ExecutionClient;
use crate::error::DriverResult;
use crate::sql::{QueryMode, TableQueryBuilder, validate_change_window};
use crate::types::{TableFilters, TableRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTableRowsCommand {
    pub table: TableRef,
    /// Rows to delete, every row when no filter is set.
    #[serde(default)]
    pub filters: TableFilters,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTableRowsResponse {
    pub deleted_rows_count: u64,
    pub table_rows_count: u64,
    pub table_size_bytes: u64,
}

/// Deletes the rows matching the filters.
pub async fn delete_table_rows<C>(
    client: &C,
    command: &DeleteTableRowsCommand,
) -> DriverResult<DeleteTableRowsResponse>
where
    C: ExecutionClient,
{
    validate_change_window(&command.filters)?;

    let definition = client.reflect_table(&command.table).await?;
    let delete = TableQueryBuilder::new(&definition).build(
        QueryMode::Delete,
        &[],
        &[],
        Some(&command.filters),
        0,
        None,
    )?;

    let result = client.submit_query(&delete).await?;
    let deleted_rows_count = result.affected_rows.unwrap_or_default();
    info!(table = %command.table, deleted_rows = deleted_rows_count, "deleted table rows");

    let stats = client.table_stats(&command.table).await?;

    Ok(DeleteTableRowsResponse {
        deleted_rows_count,
        table_rows_count: stats.num_rows,
        table_size_bytes: stats.num_bytes,
    })
}

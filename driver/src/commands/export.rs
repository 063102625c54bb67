use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bail;
use crate::client::ExecutionClient;
use crate::driver_error;
use crate::error::{DriverResult, ErrorKind};
use crate::sql::quote::quote_literal;
use crate::sql::{QueryMode, TableQueryBuilder, validate_change_window};
use crate::types::{BoundQuery, OrderBy, TableFilters, TableRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportCompression {
    #[default]
    None,
    Gzip,
}

/// Location the exported CSV files are written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTarget {
    /// Cloud storage URI of the file, or of the file prefix when sliced.
    pub uri: String,
    #[serde(default)]
    pub compression: ExportCompression,
    /// Splits the export into several files sharing the URI as prefix.
    #[serde(default)]
    pub sliced: bool,
}

impl ExportTarget {
    /// Returns the URI passed to the engine.
    pub fn export_uri(&self) -> String {
        if self.sliced && !self.uri.contains('*') {
            format!("{}*", self.uri)
        } else {
            self.uri.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTableCommand {
    pub table: TableRef,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub filters: TableFilters,
    #[serde(default)]
    pub limit: Option<u64>,
    pub target: ExportTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTableResponse {
    pub uri: String,
    pub exported_columns: Vec<String>,
    pub table_rows_count: u64,
    pub table_size_bytes: u64,
}

/// Exports the selected rows of a table as headerless CSV to cloud storage.
pub async fn export_table<C>(
    client: &C,
    command: &ExportTableCommand,
) -> DriverResult<ExportTableResponse>
where
    C: ExecutionClient,
{
    validate_change_window(&command.filters)?;

    if command.target.uri.trim().is_empty() {
        bail!(
            ErrorKind::InvalidArgument,
            "Invalid export target",
            "export uri must not be empty"
        );
    }

    let limit = match command.limit {
        Some(limit) => i64::try_from(limit).map_err(|_| {
            driver_error!(
                ErrorKind::InvalidArgument,
                "Invalid export limit",
                format!("limit {limit} is too large")
            )
        })?,
        None => 0,
    };

    let definition = client.reflect_table(&command.table).await?;
    let select = TableQueryBuilder::new(&definition).build(
        QueryMode::Select,
        &command.columns,
        &command.order_by,
        Some(&command.filters),
        limit,
        None,
    )?;

    let uri = command.target.export_uri();
    let mut options = vec![
        format!("uri={}", quote_literal(&uri)),
        "format='CSV'".to_string(),
        "overwrite=true".to_string(),
        "header=false".to_string(),
    ];
    if command.target.compression == ExportCompression::Gzip {
        options.push("compression='GZIP'".to_string());
    }

    let export = BoundQuery::with_parameters(
        format!("EXPORT DATA OPTIONS({}) AS {}", options.join(", "), select.sql),
        select.parameters,
    );
    client.submit_query(&export).await?;
    info!(table = %command.table, %uri, "exported table");

    let stats = client.table_stats(&command.table).await?;
    let exported_columns = if command.columns.is_empty() {
        definition.column_names()
    } else {
        command.columns.clone()
    };

    Ok(ExportTableResponse {
        uri,
        exported_columns,
        table_rows_count: stats.num_rows,
        table_size_bytes: stats.num_bytes,
    })
}

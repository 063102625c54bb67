use driver_config::shared::PreviewConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bail;
use crate::client::ExecutionClient;
use crate::error::{DriverResult, ErrorKind};
use crate::sql::{QueryMode, SampleRequest, TableQueryBuilder, validate_change_window};
use crate::types::{OrderBy, TableFilters, TableRef};

/// Number of rows returned when a preview does not ask for a limit.
pub const DEFAULT_PREVIEW_LIMIT: u32 = 100;

/// Largest number of rows a preview returns.
pub const MAX_PREVIEW_LIMIT: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewTableCommand {
    pub table: TableRef,
    /// Columns to return, all of them when empty.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub filters: TableFilters,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl PreviewTableCommand {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
            order_by: Vec::new(),
            filters: TableFilters::default(),
            limit: None,
        }
    }
}

/// One previewed value, cut to the configured maximum length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewCell {
    pub column_name: String,
    pub value: Option<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewTableResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<PreviewCell>>,
}

/// Returns the first rows of a table.
///
/// Unfiltered previews of tables above [`PreviewConfig::large_table_threshold`] rows read a
/// sample instead of scanning the whole table.
pub async fn preview_table<C>(
    client: &C,
    config: &PreviewConfig,
    command: &PreviewTableCommand,
) -> DriverResult<PreviewTableResponse>
where
    C: ExecutionClient,
{
    validate_change_window(&command.filters)?;

    let limit = command.limit.unwrap_or(DEFAULT_PREVIEW_LIMIT);
    if limit == 0 || limit > MAX_PREVIEW_LIMIT {
        bail!(
            ErrorKind::InvalidArgument,
            "Invalid preview limit",
            format!("limit must be between 1 and {MAX_PREVIEW_LIMIT}, got {limit}")
        );
    }

    let definition = client.reflect_table(&command.table).await?;
    let stats = client.table_stats(&command.table).await?;

    let sample = SampleRequest {
        row_count: stats.num_rows,
        large_table_threshold: config.large_table_threshold,
        default_percent: config.default_sample_percent,
        min_percent: config.min_sample_percent,
    };
    let query = TableQueryBuilder::new(&definition).build(
        QueryMode::Select,
        &command.columns,
        &command.order_by,
        Some(&command.filters),
        i64::from(limit),
        Some(&sample),
    )?;

    let result = client.submit_query(&query).await?;

    let columns = if !result.columns.is_empty() {
        result.columns
    } else if !command.columns.is_empty() {
        command.columns.clone()
    } else {
        definition.column_names()
    };

    let rows: Vec<Vec<PreviewCell>> = result
        .rows
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, value)| preview_cell(column, value, config.max_cell_length))
                .collect()
        })
        .collect();

    info!(table = %command.table, rows = rows.len(), "previewed table");

    Ok(PreviewTableResponse { columns, rows })
}

fn preview_cell(column: &str, value: Option<String>, max_length: usize) -> PreviewCell {
    let (value, truncated) = match value {
        Some(value) if value.chars().count() > max_length => {
            (Some(value.chars().take(max_length).collect()), true)
        }
        value => (value, false),
    };

    PreviewCell {
        column_name: column.to_string(),
        value,
        truncated,
    }
}

use tracing::info;

use crate::bail;
use crate::client::ExecutionClient;
use crate::error::{DriverResult, ErrorKind};
use crate::types::{
    BigQueryType, ColumnDefinition, ImportOptions, ImportType, TIMESTAMP_COLUMN, TableDefinition,
    TableRef,
};

/// Destination of a full or incremental import.
#[derive(Debug, Clone)]
pub struct ResolvedDestination {
    pub definition: TableDefinition,
    /// `true` when the table was created by this import.
    pub created: bool,
}

/// Reflects the destination, creating it from `expected_columns` when it is missing.
///
/// View and clone imports never materialize the expected columns and resolve to `None`.
pub async fn resolve_destination<C>(
    client: &C,
    destination: &TableRef,
    options: &ImportOptions,
    expected_columns: &[ColumnDefinition],
) -> DriverResult<Option<ResolvedDestination>>
where
    C: ExecutionClient,
{
    if matches!(options.import_type, ImportType::View | ImportType::Clone) {
        return Ok(None);
    }

    if client.table_exists(destination).await? {
        let definition = client.reflect_table(destination).await?;
        return Ok(Some(ResolvedDestination {
            definition,
            created: false,
        }));
    }

    let mut columns = expected_columns.to_vec();
    if let Some(timestamp_column) = &options.timestamp_column
        && !columns.iter().any(|column| column.is_named(timestamp_column))
    {
        columns.push(ColumnDefinition::new(
            timestamp_column.clone(),
            BigQueryType::Timestamp,
            true,
        ));
    }

    let definition = TableDefinition::new(
        destination.dataset.clone(),
        destination.table.clone(),
        columns,
        vec![],
    )?;

    info!(table = %destination, "creating import destination");
    client.create_table(&definition).await?;

    Ok(Some(ResolvedDestination {
        definition,
        created: true,
    }))
}

fn is_system_column(name: &str, timestamp_column: Option<&str>) -> bool {
    name.eq_ignore_ascii_case(TIMESTAMP_COLUMN)
        || timestamp_column.is_some_and(|column| name.eq_ignore_ascii_case(column))
}

/// Checks that an upserting import matches the destination shape.
///
/// Every destination column except the timestamp column must be imported. Every imported
/// column, timestamps included, must exist in the destination with a compatible type. Any type loads into a `STRING`
/// column and nullability is left to the destination.
pub fn validate_incremental_destination(
    destination: &TableDefinition,
    expected: &TableDefinition,
    timestamp_column: Option<&str>,
) -> DriverResult<()> {
    let mut mismatches = Vec::new();

    for column in destination.columns() {
        if is_system_column(&column.name, timestamp_column) {
            continue;
        }

        match expected.column(&column.name) {
            None => mismatches.push(format!("`{}` is missing in the source", column.name)),
            Some(source) if !column.typ.is_string() && source.typ != column.typ => {
                mismatches.push(format!(
                    "`{}` has type {} in the source and {} in the destination",
                    column.name, source.typ, column.typ
                ));
            }
            Some(_) => {}
        }
    }

    for column in expected.columns() {
        if !destination.has_column(&column.name) {
            mismatches.push(format!("`{}` is missing in the destination", column.name));
        }
    }

    if !mismatches.is_empty() {
        bail!(
            ErrorKind::ColumnsMismatch,
            "Source and destination columns do not match",
            format!(
                "columns of `{}` do not match the source: {}",
                destination.table_ref(),
                mismatches.join(", ")
            )
        );
    }

    Ok(())
}

/// Checks that every imported column exists in the destination.
pub fn validate_columns_exist(
    destination: &TableDefinition,
    expected: &TableDefinition,
) -> DriverResult<()> {
    let missing: Vec<&str> = expected
        .columns()
        .iter()
        .filter(|column| !destination.has_column(&column.name))
        .map(|column| column.name.as_str())
        .collect();

    if !missing.is_empty() {
        bail!(
            ErrorKind::ColumnsMismatch,
            "Columns missing in destination",
            format!(
                "columns missing in destination `{}`: {}",
                destination.table_ref(),
                missing.join(", ")
            )
        );
    }

    Ok(())
}

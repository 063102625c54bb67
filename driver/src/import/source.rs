use tracing::debug;

use crate::bail;
use crate::client::ExecutionClient;
use crate::error::{DriverResult, ErrorKind};
use crate::sql::ImportSelect;
use crate::sql::quote::qualified_table;
use crate::types::{
    BoundQuery, ColumnMapping, SourceMapping, TIMESTAMP_COLUMN, TableDefinition, TableRef,
};

/// Rows an import reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportSource {
    /// The whole table, eligible for engine side copies.
    Table(TableRef),
    /// A parameterized select over the source table.
    Select(BoundQuery),
}

impl ImportSource {
    pub fn is_table(&self) -> bool {
        matches!(self, ImportSource::Table(_))
    }

    /// Returns a select producing the source rows.
    pub fn select(&self) -> DriverResult<BoundQuery> {
        match self {
            ImportSource::Table(table) => Ok(BoundQuery::new(format!(
                "SELECT * FROM {}",
                qualified_table(table)?
            ))),
            ImportSource::Select(query) => Ok(query.clone()),
        }
    }
}

/// Resolved source of one import.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub source: ImportSource,
    /// Imported columns under their destination names, in mapping order.
    pub effective_definition: TableDefinition,
    /// The source table as it is in the catalog.
    pub full_definition: TableDefinition,
    /// Source names of the imported columns.
    pub selected_columns: Vec<String>,
}

pub struct SourceResolver<'a, C> {
    client: &'a C,
}

impl<'a, C> SourceResolver<'a, C>
where
    C: ExecutionClient,
{
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn create_from_command(&self, mapping: &SourceMapping) -> DriverResult<SourceContext> {
        let full_definition = self.client.reflect_table(&mapping.table).await?;

        let columns = if mapping.column_mappings.is_empty() {
            full_definition
                .columns()
                .iter()
                .map(|column| ColumnMapping::new(column.name.clone(), column.name.clone()))
                .collect()
        } else {
            resolve_mappings(&full_definition, &mapping.column_mappings)?
        };

        for filter in &mapping.where_filters {
            if !full_definition.has_column(&filter.column) {
                bail!(
                    ErrorKind::ColumnNotFound,
                    "Column not found",
                    format!(
                        "filter column `{}` does not exist in source `{}`",
                        filter.column, mapping.table
                    )
                );
            }
        }

        if mapping.seconds.is_some() && !full_definition.has_column(TIMESTAMP_COLUMN) {
            bail!(
                ErrorKind::ColumnNotFound,
                "Column not found",
                format!(
                    "source `{}` has no `{TIMESTAMP_COLUMN}` column to filter recent rows by",
                    mapping.table
                )
            );
        }

        let projects =
            !mapping.column_mappings.is_empty() && !is_identity(&full_definition, &columns);
        let needs_select = projects
            || !mapping.where_filters.is_empty()
            || mapping.limit.is_some()
            || mapping.seconds.is_some();

        let source = if needs_select {
            let projection: &[ColumnMapping] = if projects { &columns } else { &[] };

            ImportSource::Select(
                ImportSelect {
                    source: &mapping.table,
                    columns: projection,
                    where_filters: &mapping.where_filters,
                    seconds: mapping.seconds,
                    limit: mapping.limit,
                }
                .build()?,
            )
        } else {
            ImportSource::Table(mapping.table.clone())
        };

        let mut effective_columns = Vec::with_capacity(columns.len());
        for column in &columns {
            if let Some(definition) = full_definition.column(&column.source_column_name) {
                effective_columns.push(definition.renamed(column.destination_column_name.clone()));
            }
        }

        let effective_definition = TableDefinition::new(
            mapping.table.dataset.clone(),
            mapping.table.table.clone(),
            effective_columns,
            vec![],
        )?;
        let selected_columns = columns
            .into_iter()
            .map(|column| column.source_column_name)
            .collect();

        debug!(
            source = %mapping.table,
            select = needs_select,
            "resolved import source"
        );

        Ok(SourceContext {
            source,
            effective_definition,
            full_definition,
            selected_columns,
        })
    }
}

/// Returns `true` if `columns` keeps every source column, unrenamed and in catalog order.
fn is_identity(definition: &TableDefinition, columns: &[ColumnMapping]) -> bool {
    columns.len() == definition.columns().len()
        && columns
            .iter()
            .zip(definition.columns())
            .all(|(mapping, column)| {
                mapping.source_column_name == column.name
                    && mapping.destination_column_name == column.name
            })
}

/// Resolves mapped source names against the catalog, reporting every unknown name at once.
fn resolve_mappings(
    definition: &TableDefinition,
    mappings: &[ColumnMapping],
) -> DriverResult<Vec<ColumnMapping>> {
    let mut resolved = Vec::with_capacity(mappings.len());
    let mut missing = Vec::new();

    for mapping in mappings {
        match definition.column(&mapping.source_column_name) {
            Some(column) => resolved.push(ColumnMapping::new(
                column.name.clone(),
                mapping.destination_column_name.clone(),
            )),
            None => missing.push(mapping.source_column_name.as_str()),
        }
    }

    if !missing.is_empty() {
        bail!(
            ErrorKind::ColumnsMismatch,
            "Source columns not found",
            format!(
                "columns not found in source `{}`: {}",
                definition.table_ref(),
                missing.join(", ")
            )
        );
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryExecutionClient;
    use crate::types::{BigQueryType, ColumnDefinition, Operator, TableStats, WhereFilter};

    async fn client() -> MemoryExecutionClient {
        let client = MemoryExecutionClient::new();
        let definition = TableDefinition::new(
            "in_c",
            "src",
            vec![
                ColumnDefinition::new("Id", BigQueryType::Int64, false),
                ColumnDefinition::new("name", BigQueryType::String, true),
                ColumnDefinition::new("_timestamp", BigQueryType::Timestamp, true),
            ],
            vec![],
        )
        .unwrap();
        client.add_table(definition, TableStats::default()).await;
        client
    }

    #[tokio::test]
    async fn plain_sources_stay_table_references() {
        let client = client().await;

        let context = SourceResolver::new(&client)
            .create_from_command(&SourceMapping::table(TableRef::new("in_c", "src")))
            .await
            .unwrap();

        assert_eq!(context.source, ImportSource::Table(TableRef::new("in_c", "src")));
        assert_eq!(
            context.effective_definition.column_names(),
            vec!["Id", "name", "_timestamp"]
        );
        assert_eq!(context.selected_columns, vec!["Id", "name", "_timestamp"]);
    }

    #[tokio::test]
    async fn mappings_rename_in_mapping_order() {
        let client = client().await;
        let mut mapping = SourceMapping::table(TableRef::new("in_c", "src"));
        mapping.column_mappings = vec![
            ColumnMapping::new("NAME", "full_name"),
            ColumnMapping::new("id", "id"),
        ];

        let context = SourceResolver::new(&client)
            .create_from_command(&mapping)
            .await
            .unwrap();

        assert_eq!(
            context.effective_definition.column_names(),
            vec!["full_name", "id"]
        );
        assert_eq!(context.selected_columns, vec!["name", "Id"]);
        assert_eq!(context.full_definition.columns().len(), 3);
        let ImportSource::Select(query) = context.source else {
            panic!("expected a select source");
        };
        assert_eq!(
            query.sql,
            "SELECT `name` AS `full_name`, `Id` AS `id` FROM `in_c`.`src`"
        );
    }

    #[tokio::test]
    async fn identity_mappings_keep_table_references() {
        let client = client().await;
        let mut mapping = SourceMapping::table(TableRef::new("in_c", "src"));
        mapping.column_mappings = vec![
            ColumnMapping::new("Id", "Id"),
            ColumnMapping::new("name", "name"),
            ColumnMapping::new("_timestamp", "_timestamp"),
        ];

        let context = SourceResolver::new(&client)
            .create_from_command(&mapping)
            .await
            .unwrap();

        assert_eq!(context.source, ImportSource::Table(TableRef::new("in_c", "src")));

        mapping.column_mappings.swap(0, 1);
        let context = SourceResolver::new(&client)
            .create_from_command(&mapping)
            .await
            .unwrap();

        assert!(matches!(context.source, ImportSource::Select(_)));
    }

    #[tokio::test]
    async fn every_missing_mapped_column_is_reported() {
        let client = client().await;
        let mut mapping = SourceMapping::table(TableRef::new("in_c", "src"));
        mapping.column_mappings = vec![
            ColumnMapping::new("nope", "a"),
            ColumnMapping::new("id", "id"),
            ColumnMapping::new("gone", "b"),
        ];

        let err = SourceResolver::new(&client)
            .create_from_command(&mapping)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ColumnsMismatch);
        assert_eq!(
            err.detail(),
            Some("columns not found in source `in_c.src`: nope, gone")
        );
    }

    #[tokio::test]
    async fn filters_limits_and_time_travel_require_a_select() {
        let client = client().await;
        let mut mapping = SourceMapping::table(TableRef::new("in_c", "src"));
        mapping.where_filters = vec![WhereFilter::new(
            "name",
            Operator::Eq,
            vec!["x".to_string()],
        )];
        mapping.seconds = Some(60);
        mapping.limit = Some(10);

        let context = SourceResolver::new(&client)
            .create_from_command(&mapping)
            .await
            .unwrap();

        let ImportSource::Select(query) = context.source else {
            panic!("expected a select source");
        };
        assert_eq!(
            query.sql,
            "SELECT * FROM `in_c`.`src` WHERE `_timestamp` >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 60 SECOND) AND `name` = @filter_0 LIMIT 10"
        );
        assert_eq!(context.effective_definition.columns().len(), 3);
    }

    #[tokio::test]
    async fn unknown_filter_columns_are_rejected() {
        let client = client().await;
        let mut mapping = SourceMapping::table(TableRef::new("in_c", "src"));
        mapping.where_filters = vec![WhereFilter::new(
            "missing",
            Operator::Eq,
            vec!["x".to_string()],
        )];

        let err = SourceResolver::new(&client)
            .create_from_command(&mapping)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    }
}

use std::future::Future;

use tracing::{info, warn};
use uuid::Uuid;

use crate::bail;
use crate::client::ExecutionClient;
use crate::error::{DriverResult, ErrorKind};
use crate::import::source::{ImportSource, SourceContext};
use crate::sql::LoadSelect;
use crate::sql::ddl;
use crate::sql::quote::{qualified_table, quote_identifier_list};
use crate::types::{
    BoundQuery, ColumnDefinition, DedupType, ImportOptions, ImportType, TableDefinition, TableRef,
};

/// Prefix of staging table names.
pub const STAGING_TABLE_PREFIX: &str = "__temp_";

/// How rows reach the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Replace the destination straight from the source, without staging.
    DirectLoad,
    /// Copy the source table into staging on the engine side.
    NativeCopyToStaging,
    /// Create staging and fill it with `INSERT .. SELECT`.
    SqlStagedLoad,
}

/// Decides how an import loads its rows.
///
/// `shapes_identical` tells whether the staging table would have exactly the columns and types of
/// the source table, see [`shapes_identical`].
pub fn choose_load_strategy(
    options: &ImportOptions,
    source_is_table: bool,
    shapes_identical: bool,
) -> LoadStrategy {
    if options.import_type == ImportType::Full
        && options.dedup_type == DedupType::InsertDuplicates
        && options.timestamp_column.is_none()
    {
        return LoadStrategy::DirectLoad;
    }

    let dedup_on_load = options.import_type == ImportType::Incremental && options.upserts();
    if source_is_table && shapes_identical && !dedup_on_load && options.import_as_null.is_empty() {
        return LoadStrategy::NativeCopyToStaging;
    }

    LoadStrategy::SqlStagedLoad
}

/// Returns `true` if both definitions have the same column names, in order, with equal types.
pub fn shapes_identical(staging: &TableDefinition, source: &TableDefinition) -> bool {
    staging.columns().len() == source.columns().len()
        && staging
            .columns()
            .iter()
            .zip(source.columns())
            .all(|(staging, source)| staging.is_named(&source.name) && staging.typ == source.typ)
}

/// Temporary table holding the rows of one import.
#[derive(Debug, Clone)]
pub struct StagingTable {
    definition: TableDefinition,
}

impl StagingTable {
    /// Shapes a staging table in `dataset` like the imported columns, typed after the destination.
    ///
    /// All staging columns are nullable. Upsert keys are carried as the dedup columns.
    pub fn new(
        dataset: &str,
        effective: &TableDefinition,
        destination: &TableDefinition,
        options: &ImportOptions,
    ) -> DriverResult<Self> {
        let columns = effective
            .columns()
            .iter()
            .map(|column| match destination.column(&column.name) {
                Some(target) => ColumnDefinition {
                    name: column.name.clone(),
                    typ: target.typ.clone(),
                    nullable: true,
                    length: target.length.clone(),
                    default: None,
                },
                None => ColumnDefinition {
                    nullable: true,
                    default: None,
                    ..column.clone()
                },
            })
            .collect();

        let dedup_columns = if options.upserts() {
            options.dedup_columns.clone()
        } else {
            Vec::new()
        };

        let name = format!("{STAGING_TABLE_PREFIX}{}", Uuid::new_v4().simple());
        let definition =
            TableDefinition::new(dataset, name, columns, dedup_columns)?.with_temporary(true);

        Ok(Self { definition })
    }

    pub fn table_ref(&self) -> TableRef {
        self.definition.table_ref()
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    /// Creates the empty staging table.
    pub async fn create<C>(&self, client: &C) -> DriverResult<()>
    where
        C: ExecutionClient,
    {
        info!(staging = %self.table_ref(), "creating staging table");
        client.create_table(&self.definition).await
    }

    /// Drops the staging table, logging failures before returning them.
    pub async fn drop<C>(&self, client: &C) -> DriverResult<()>
    where
        C: ExecutionClient,
    {
        let table = self.table_ref();
        let result = client.drop_table(&table).await;
        if let Err(err) = &result {
            warn!(%table, error = %err, "failed to drop staging table");
        }

        result
    }
}

/// Runs `work` and drops the staging table afterwards, whatever the outcome.
///
/// A failing drop never replaces the error of `work`; it is attached to it as suppressed. When
/// `work` succeeds, a failing drop is only logged.
pub async fn run_with_staging<C, F, T>(
    client: &C,
    staging: &StagingTable,
    work: F,
) -> DriverResult<T>
where
    C: ExecutionClient,
    F: Future<Output = DriverResult<T>>,
{
    let result = work.await;
    let cleanup = staging.drop(client).await;

    match (result, cleanup) {
        (Ok(value), _) => Ok(value),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup)) => Err(err.with_suppressed(cleanup)),
    }
}

/// Creates and fills the staging table, returning the number of staged rows.
pub async fn load_staging<C>(
    client: &C,
    staging: &StagingTable,
    strategy: LoadStrategy,
    source: &SourceContext,
    options: &ImportOptions,
) -> DriverResult<u64>
where
    C: ExecutionClient,
{
    let staging_ref = staging.table_ref();

    match (strategy, &source.source) {
        (LoadStrategy::NativeCopyToStaging, ImportSource::Table(table)) => {
            info!(source = %table, staging = %staging_ref, "copying source into staging table");
            let copy = ddl::create_table_copy(&staging_ref, table)?;
            client.submit_query(&BoundQuery::new(copy)).await?;
        }
        (LoadStrategy::SqlStagedLoad, _) => {
            staging.create(client).await?;

            let dedup_keys: &[String] = if options.import_type == ImportType::Incremental {
                staging.definition().dedup_columns()
            } else {
                &[]
            };
            let select = LoadSelect {
                source: &source.source.select()?,
                columns: source.effective_definition.columns(),
                target: staging.definition(),
                import_as_null: &options.import_as_null,
                dedup_keys,
                latest_by: options
                    .latest_by(|column| source.effective_definition.has_column(column)),
            }
            .build()?;

            let insert = BoundQuery::with_parameters(
                format!(
                    "INSERT INTO {} ({}) {}",
                    qualified_table(&staging_ref)?,
                    quote_identifier_list(&staging.definition().column_names())?,
                    select.sql
                ),
                select.parameters,
            );
            client.submit_query(&insert).await?;
        }
        (strategy, _) => bail!(
            ErrorKind::InvalidState,
            "Invalid staging strategy",
            format!("strategy {strategy:?} cannot load a staging table from this source")
        ),
    }

    Ok(client.table_stats(&staging_ref).await?.num_rows)
}

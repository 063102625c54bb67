use tracing::{info, warn};

use crate::bail;
use crate::client::ExecutionClient;
use crate::driver_error;
use crate::error::{DriverError, DriverResult, ErrorKind};
use crate::import::source::SourceContext;
use crate::import::staging::StagingTable;
use crate::sql::ddl;
use crate::sql::quote::{qualified_table, quote_identifier, quote_identifier_list};
use crate::sql::{LoadSelect, dedup_select};
use crate::types::{BoundQuery, ImportOptions, TableDefinition, TimestampMode};

/// Writes loaded rows into the import destination.
///
/// Every statement the engine submits is a single script, so the destination either receives
/// all rows or keeps its previous content.
#[derive(Debug)]
pub struct MergeEngine<'a, C> {
    client: &'a C,
    destination: &'a TableDefinition,
    options: &'a ImportOptions,
    data_columns: Vec<String>,
}

impl<'a, C> MergeEngine<'a, C>
where
    C: ExecutionClient,
{
    /// Prepares a merge of the `effective` source columns into `destination`.
    pub fn new(
        client: &'a C,
        destination: &'a TableDefinition,
        effective: &TableDefinition,
        options: &'a ImportOptions,
    ) -> DriverResult<Self> {
        if let Some(timestamp_column) = &options.timestamp_column {
            if !destination.has_column(timestamp_column) {
                bail!(
                    ErrorKind::ColumnNotFound,
                    "Timestamp column not found",
                    format!(
                        "timestamp column `{timestamp_column}` does not exist in `{}`",
                        destination.table_ref()
                    )
                );
            }

            if options.timestamp_mode == TimestampMode::FromSource
                && !effective.has_column(timestamp_column)
            {
                bail!(
                    ErrorKind::ColumnNotFound,
                    "Timestamp column not found",
                    format!("timestamp column `{timestamp_column}` is not imported from the source")
                );
            }
        }

        let missing_keys: Vec<&str> = options
            .dedup_columns
            .iter()
            .filter(|key| !effective.has_column(key) || !destination.has_column(key))
            .map(String::as_str)
            .collect();
        if options.upserts() && !missing_keys.is_empty() {
            bail!(
                ErrorKind::ColumnsMismatch,
                "Dedup columns not found",
                format!(
                    "dedup columns must be imported into `{}`: {}",
                    destination.table_ref(),
                    missing_keys.join(", ")
                )
            );
        }

        let data_columns = effective
            .column_names()
            .into_iter()
            .filter(|name| {
                options
                    .timestamp_column
                    .as_deref()
                    .is_none_or(|timestamp_column| !name.eq_ignore_ascii_case(timestamp_column))
            })
            .collect();

        Ok(Self {
            client,
            destination,
            options,
            data_columns,
        })
    }

    /// Replaces the destination content straight from the source.
    pub async fn direct_load(&self, source: &SourceContext) -> DriverResult<u64> {
        let destination = self.destination.table_ref();
        info!(%destination, "loading destination directly from source");

        let select = LoadSelect {
            source: &source.source.select()?,
            columns: source.effective_definition.columns(),
            target: self.destination,
            import_as_null: &self.options.import_as_null,
            dedup_keys: &[],
            latest_by: None,
        }
        .build()?;

        let statements = [
            ddl::truncate_table(&destination)?,
            format!(
                "INSERT INTO {} ({}) {}",
                qualified_table(&destination)?,
                quote_identifier_list(&self.data_columns)?,
                select.sql
            ),
        ];

        self.submit(BoundQuery::with_parameters(
            ddl::transaction(&statements),
            select.parameters,
        ))
        .await
    }

    /// Replaces the destination content with the staged rows.
    pub async fn merge_full(&self, staging: &StagingTable) -> DriverResult<u64> {
        let destination = self.destination.table_ref();
        info!(%destination, staging = %staging.table_ref(), "replacing destination with staged rows");

        let statements = [
            ddl::truncate_table(&destination)?,
            self.insert_from_staging(staging)?,
        ];

        self.submit(BoundQuery::new(ddl::transaction(&statements)))
            .await
    }

    /// Adds the staged rows to the destination, updating rows with matching keys when upserting.
    pub async fn merge_incremental(&self, staging: &StagingTable) -> DriverResult<u64> {
        let destination = self.destination.table_ref();

        if !self.options.upserts() {
            info!(%destination, staging = %staging.table_ref(), "appending staged rows");
            let insert = self.insert_from_staging(staging)?;
            return self.submit(BoundQuery::new(insert)).await;
        }

        info!(%destination, staging = %staging.table_ref(), "merging staged rows");
        let keys = &self.options.dedup_columns;

        let conditions = keys
            .iter()
            .map(|key| {
                let key = quote_identifier(key)?;
                Ok(format!("target.{key} = source.{key}"))
            })
            .collect::<DriverResult<Vec<_>>>()?;

        let mut updates = Vec::new();
        for column in &self.data_columns {
            if keys.iter().any(|key| key.eq_ignore_ascii_case(column)) {
                continue;
            }
            let column = quote_identifier(column)?;
            updates.push(format!("{column} = source.{column}"));
        }

        let mut insert_columns = self.data_columns.clone();
        let mut insert_values = self
            .data_columns
            .iter()
            .map(|column| Ok(format!("source.{}", quote_identifier(column)?)))
            .collect::<DriverResult<Vec<_>>>()?;

        if let Some(timestamp_column) = &self.options.timestamp_column {
            let value = match self.options.timestamp_mode {
                TimestampMode::Now => "CURRENT_TIMESTAMP()".to_string(),
                TimestampMode::FromSource => format!("source.{}", quote_identifier(timestamp_column)?),
            };
            updates.push(format!("{} = {value}", quote_identifier(timestamp_column)?));
            insert_columns.push(timestamp_column.clone());
            insert_values.push(value);
        }

        let mut sql = format!(
            "MERGE {} AS target USING ({}) AS source ON {}",
            qualified_table(&destination)?,
            self.staged_rows(staging)?,
            conditions.join(" AND ")
        );
        if !updates.is_empty() {
            sql.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", updates.join(", ")));
        }
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
            quote_identifier_list(&insert_columns)?,
            insert_values.join(", ")
        ));

        self.submit(BoundQuery::new(sql)).await
    }

    /// Rows of the staging table, one per key when upserting.
    fn staged_rows(&self, staging: &StagingTable) -> DriverResult<String> {
        let select = format!("SELECT * FROM {}", qualified_table(&staging.table_ref())?);
        if !self.options.upserts() {
            return Ok(select);
        }

        let latest_by = self
            .options
            .latest_by(|column| staging.definition().has_column(column));
        dedup_select(&select, &self.options.dedup_columns, latest_by)
    }

    fn insert_from_staging(&self, staging: &StagingTable) -> DriverResult<String> {
        let mut columns = self.data_columns.clone();
        let mut values = self
            .data_columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<DriverResult<Vec<_>>>()?;

        if let Some(timestamp_column) = &self.options.timestamp_column {
            columns.push(timestamp_column.clone());
            values.push(match self.options.timestamp_mode {
                TimestampMode::Now => "CURRENT_TIMESTAMP()".to_string(),
                TimestampMode::FromSource => quote_identifier(timestamp_column)?,
            });
        }

        Ok(format!(
            "INSERT INTO {} ({}) SELECT {} FROM ({})",
            qualified_table(&self.destination.table_ref())?,
            quote_identifier_list(&columns)?,
            values.join(", "),
            self.staged_rows(staging)?
        ))
    }

    async fn submit(&self, query: BoundQuery) -> DriverResult<u64> {
        match self.client.submit_query(&query).await {
            Ok(rows) => Ok(rows.affected_rows.unwrap_or_default()),
            Err(err) => Err(self.classify_null_violation(err)),
        }
    }

    /// Turns an engine error about a NULL in a required column into [`ErrorKind::ImportValidation`].
    fn classify_null_violation(&self, err: DriverError) -> DriverError {
        let message = format!("{} {}", err.description(), err.detail().unwrap_or_default())
            .to_lowercase();
        if !message.contains("null") {
            return err;
        }

        let column = self
            .destination
            .columns()
            .iter()
            .filter(|column| !column.nullable)
            .filter(|column| message.contains(&column.name.to_lowercase()))
            .max_by_key(|column| column.name.len());

        match column {
            Some(column) => {
                let table = self.destination.table_ref();
                warn!(%table, column = %column.name, "required column received null values");
                driver_error!(
                    ErrorKind::ImportValidation,
                    "Required column is null",
                    format!("column `{}` of `{table}` does not accept NULL values", column.name),
                    source: err
                )
            }
            None => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::client::memory::MemoryExecutionClient;
    use crate::import::source::ImportSource;
    use crate::types::{BigQueryType, ColumnDefinition, DedupType, ImportType, TableRef, TableStats};

    fn table(name: &str, columns: Vec<ColumnDefinition>) -> TableDefinition {
        TableDefinition::new("out_c", name, columns, vec![]).unwrap()
    }

    fn effective() -> TableDefinition {
        table(
            "src",
            vec![
                ColumnDefinition::new("id", BigQueryType::Int64, true),
                ColumnDefinition::new("name", BigQueryType::String, true),
            ],
        )
    }

    fn destination() -> TableDefinition {
        table(
            "dst",
            vec![
                ColumnDefinition::new("id", BigQueryType::Int64, false),
                ColumnDefinition::new("name", BigQueryType::String, true),
                ColumnDefinition::new("_timestamp", BigQueryType::Timestamp, true),
            ],
        )
    }

    fn staging(options: &ImportOptions) -> StagingTable {
        StagingTable::new("out_c", &effective(), &destination(), options).unwrap()
    }

    async fn register(
        client: &MemoryExecutionClient,
        destination: &TableDefinition,
        staging: &StagingTable,
    ) {
        client
            .add_table(destination.clone(), TableStats::default())
            .await;
        client
            .add_table(
                staging.definition().clone(),
                TableStats {
                    num_rows: 2,
                    num_bytes: 16,
                },
            )
            .await;
    }

    fn upserts() -> ImportOptions {
        ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
            .with_dedup_columns(vec!["id".to_string()])
            .with_timestamp_column("_timestamp", TimestampMode::Now)
    }

    #[tokio::test]
    async fn upserts_merge_on_keys() {
        let client = MemoryExecutionClient::new();
        let destination = destination();
        let options = upserts();
        let staging = staging(&options);
        let engine = MergeEngine::new(&client, &destination, &effective(), &options).unwrap();
        register(&client, &destination, &staging).await;

        engine.merge_incremental(&staging).await.unwrap();

        let sql = client.executed_sql().await.remove(0);
        let sql = sql.replace(&staging.definition().name, "__temp");
        assert_snapshot!(
            sql,
            @"MERGE `out_c`.`dst` AS target USING (SELECT * FROM (SELECT * FROM `out_c`.`__temp`) WHERE TRUE QUALIFY ROW_NUMBER() OVER (PARTITION BY `id` ORDER BY `id`) = 1) AS source ON target.`id` = source.`id` WHEN MATCHED THEN UPDATE SET `name` = source.`name`, `_timestamp` = CURRENT_TIMESTAMP() WHEN NOT MATCHED THEN INSERT (`id`, `name`, `_timestamp`) VALUES (source.`id`, source.`name`, CURRENT_TIMESTAMP())"
        );
    }

    #[tokio::test]
    async fn key_only_merges_skip_updates() {
        let client = MemoryExecutionClient::new();
        let key_only = table(
            "src",
            vec![ColumnDefinition::new("id", BigQueryType::Int64, true)],
        );
        let destination = table(
            "dst",
            vec![ColumnDefinition::new("id", BigQueryType::Int64, true)],
        );
        let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
            .with_dedup_columns(vec!["id".to_string()]);
        let staging = StagingTable::new("out_c", &key_only, &destination, &options).unwrap();
        let engine = MergeEngine::new(&client, &destination, &key_only, &options).unwrap();
        register(&client, &destination, &staging).await;

        engine.merge_incremental(&staging).await.unwrap();

        let sql = client.executed_sql().await.remove(0);
        assert!(!sql.contains("WHEN MATCHED"));
        assert!(sql.ends_with("WHEN NOT MATCHED THEN INSERT (`id`) VALUES (source.`id`)"));
    }

    #[tokio::test]
    async fn appends_without_upserts() {
        let client = MemoryExecutionClient::new();
        let destination = destination();
        let options = ImportOptions::new(ImportType::Incremental, DedupType::InsertDuplicates)
            .with_timestamp_column("_timestamp", TimestampMode::Now);
        let staging = staging(&options);
        let engine = MergeEngine::new(&client, &destination, &effective(), &options).unwrap();
        register(&client, &destination, &staging).await;

        engine.merge_incremental(&staging).await.unwrap();

        let sql = client.executed_sql().await.remove(0);
        let sql = sql.replace(&staging.definition().name, "__temp");
        assert_snapshot!(
            sql,
            @"INSERT INTO `out_c`.`dst` (`id`, `name`, `_timestamp`) SELECT `id`, `name`, CURRENT_TIMESTAMP() FROM (SELECT * FROM `out_c`.`__temp`)"
        );
    }

    #[tokio::test]
    async fn full_merge_replaces_in_one_transaction() {
        let client = MemoryExecutionClient::new();
        let destination = destination();
        let options = ImportOptions::new(ImportType::Full, DedupType::InsertDuplicates)
            .with_timestamp_column("_timestamp", TimestampMode::Now);
        let staging = staging(&options);
        let engine = MergeEngine::new(&client, &destination, &effective(), &options).unwrap();
        register(&client, &destination, &staging).await;

        engine.merge_full(&staging).await.unwrap();

        let sql = client.executed_sql().await.remove(0);
        let sql = sql.replace(&staging.definition().name, "__temp");
        assert_snapshot!(sql, @r"
        BEGIN TRANSACTION;
        TRUNCATE TABLE `out_c`.`dst`;
        INSERT INTO `out_c`.`dst` (`id`, `name`, `_timestamp`) SELECT `id`, `name`, CURRENT_TIMESTAMP() FROM (SELECT * FROM `out_c`.`__temp`);
        COMMIT TRANSACTION;
        ");
    }

    #[tokio::test]
    async fn source_timestamps_are_copied() {
        let client = MemoryExecutionClient::new();
        let effective = table(
            "src",
            vec![
                ColumnDefinition::new("id", BigQueryType::Int64, true),
                ColumnDefinition::new("changed_at", BigQueryType::Timestamp, true),
            ],
        );
        let destination = table(
            "dst",
            vec![
                ColumnDefinition::new("id", BigQueryType::Int64, true),
                ColumnDefinition::new("changed_at", BigQueryType::Timestamp, true),
            ],
        );
        let options = ImportOptions::new(ImportType::Incremental, DedupType::InsertDuplicates)
            .with_timestamp_column("changed_at", TimestampMode::FromSource);
        let staging = StagingTable::new("out_c", &effective, &destination, &options).unwrap();
        let engine = MergeEngine::new(&client, &destination, &effective, &options).unwrap();
        register(&client, &destination, &staging).await;

        engine.merge_incremental(&staging).await.unwrap();

        let sql = client.executed_sql().await.remove(0);
        assert!(sql.contains("(`id`, `changed_at`) SELECT `id`, `changed_at` FROM"));
    }

    #[tokio::test]
    async fn upserts_keep_latest_source_timestamp() {
        let client = MemoryExecutionClient::new();
        let columns = vec![
            ColumnDefinition::new("id", BigQueryType::Int64, true),
            ColumnDefinition::new("name", BigQueryType::String, true),
            ColumnDefinition::new("changed_at", BigQueryType::Timestamp, true),
        ];
        let effective = table("src", columns.clone());
        let destination = table("dst", columns);
        let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
            .with_dedup_columns(vec!["id".to_string()])
            .with_timestamp_column("changed_at", TimestampMode::FromSource);
        let staging = StagingTable::new("out_c", &effective, &destination, &options).unwrap();
        let engine = MergeEngine::new(&client, &destination, &effective, &options).unwrap();
        register(&client, &destination, &staging).await;

        engine.merge_incremental(&staging).await.unwrap();

        let sql = client.executed_sql().await.remove(0);
        assert!(sql.contains("PARTITION BY `id` ORDER BY `changed_at` DESC"));
        assert!(sql.contains("UPDATE SET `name` = source.`name`, `changed_at` = source.`changed_at`"));
    }

    #[tokio::test]
    async fn direct_load_truncates_and_inserts() {
        let client = MemoryExecutionClient::new();
        let source = effective();
        client
            .add_table(
                source.clone(),
                TableStats {
                    num_rows: 3,
                    num_bytes: 24,
                },
            )
            .await;
        let destination = table(
            "dst",
            vec![
                ColumnDefinition::new("id", BigQueryType::String, true),
                ColumnDefinition::new("name", BigQueryType::String, true),
            ],
        );
        client
            .add_table(destination.clone(), TableStats::default())
            .await;
        let context = SourceContext {
            source: ImportSource::Table(source.table_ref()),
            effective_definition: source.clone(),
            full_definition: source.clone(),
            selected_columns: source.column_names(),
        };
        let options = ImportOptions::new(ImportType::Full, DedupType::InsertDuplicates);
        let engine = MergeEngine::new(&client, &destination, &source, &options).unwrap();

        let rows = engine.direct_load(&context).await.unwrap();

        assert_eq!(rows, 3);
        assert_snapshot!(client.executed_sql().await.remove(0), @r"
        BEGIN TRANSACTION;
        TRUNCATE TABLE `out_c`.`dst`;
        INSERT INTO `out_c`.`dst` (`id`, `name`) SELECT CAST(`id` AS STRING) AS `id`, `name` FROM (SELECT * FROM `out_c`.`src`);
        COMMIT TRANSACTION;
        ");
    }

    #[test]
    fn missing_timestamp_column_is_rejected() {
        let client = MemoryExecutionClient::new();
        let destination = table(
            "dst",
            vec![ColumnDefinition::new("id", BigQueryType::Int64, true)],
        );
        let options = ImportOptions::new(ImportType::Full, DedupType::InsertDuplicates)
            .with_timestamp_column("_timestamp", TimestampMode::Now);

        let err = MergeEngine::new(&client, &destination, &effective(), &options).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
    }

    #[tokio::test]
    async fn null_violations_name_the_longest_matching_column() {
        let client = MemoryExecutionClient::new();
        let destination = table(
            "dst",
            vec![
                ColumnDefinition::new("id", BigQueryType::Int64, false),
                ColumnDefinition::new("user_id", BigQueryType::Int64, false),
            ],
        );
        let effective = table(
            "src",
            vec![
                ColumnDefinition::new("id", BigQueryType::Int64, true),
                ColumnDefinition::new("user_id", BigQueryType::Int64, true),
            ],
        );
        client
            .fail_on(
                "INSERT INTO",
                driver_error!(
                    ErrorKind::DestinationQueryFailed,
                    "BigQuery query failed",
                    "Required field user_id cannot be null"
                ),
            )
            .await;
        let options = ImportOptions::new(ImportType::Incremental, DedupType::InsertDuplicates);
        let staging = StagingTable::new("out_c", &effective, &destination, &options).unwrap();
        let engine = MergeEngine::new(&client, &destination, &effective, &options).unwrap();

        let err = engine.merge_incremental(&staging).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ImportValidation);
        assert_eq!(
            err.detail(),
            Some("column `user_id` of `out_c.dst` does not accept NULL values")
        );
        assert_eq!(destination.table_ref(), TableRef::new("out_c", "dst"));
    }
}

use driver::client::ExecutionClient;
use driver::client::memory::MemoryExecutionClient;
use driver::driver_error;
use driver::error::ErrorKind;
use driver::import::import_table;
use driver::telemetry::init_test_tracing;
use driver::test_utils::{seeded_client, stats, table};
use driver::types::{
    BigQueryType, ColumnDefinition, ColumnMapping, CreateMode, DedupType, ImportOptions,
    ImportTableCommand, ImportType, Operator, SourceMapping, TableDefinition, TableRef,
    TimestampMode, WhereFilter,
};

fn source_table() -> TableDefinition {
    table(
        "in_c",
        "src",
        &[
            ("col1", BigQueryType::String),
            ("col2", BigQueryType::String),
            ("col3", BigQueryType::String),
        ],
    )
}

fn destination() -> TableRef {
    TableRef::new("out_c", "dst")
}

fn command(options: ImportOptions) -> ImportTableCommand {
    ImportTableCommand {
        source: SourceMapping::table(TableRef::new("in_c", "src")),
        destination: destination(),
        import_options: options,
    }
}

async fn staging_tables(client: &MemoryExecutionClient) -> Vec<TableRef> {
    client
        .created_tables()
        .await
        .into_iter()
        .filter(|table| table.table.starts_with("__temp_"))
        .collect()
}

#[tokio::test]
async fn full_import_creates_destination_and_reports_rows() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 3)]).await;

    let response = import_table(
        &client,
        &command(ImportOptions::new(
            ImportType::Full,
            DedupType::InsertDuplicates,
        )),
    )
    .await
    .unwrap();

    assert_eq!(response.imported_rows_count, 3);
    assert_eq!(response.imported_columns, vec!["col1", "col2", "col3"]);
    assert_eq!(response.table_rows_count, 3);
    assert_eq!(response.table_size_bytes, 0);
    assert!(response.timer("sourceResolve").is_some());
    assert!(response.timer("merge").is_some());
    assert!(response.timer("total").is_some());

    let created = client.table(&destination()).await.unwrap();
    assert_eq!(created.column_names(), vec!["col1", "col2", "col3"]);
    assert!(staging_tables(&client).await.is_empty());
}

#[tokio::test]
async fn repeated_full_import_replaces_rows() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 3)]).await;
    let command = command(ImportOptions::new(
        ImportType::Full,
        DedupType::InsertDuplicates,
    ));

    import_table(&client, &command).await.unwrap();
    let response = import_table(&client, &command).await.unwrap();

    assert_eq!(response.imported_rows_count, 3);
    assert_eq!(response.table_rows_count, 3);
}

#[tokio::test]
async fn full_import_with_timestamp_copies_through_staging() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 3)]).await;
    let options = ImportOptions::new(ImportType::Full, DedupType::InsertDuplicates)
        .with_timestamp_column("_timestamp", TimestampMode::Now);

    let response = import_table(&client, &command(options)).await.unwrap();

    assert_eq!(response.imported_rows_count, 3);
    assert!(response.imported_columns.is_empty());
    assert_eq!(response.table_rows_count, 3);
    assert!(response.timer("stagingLoad").is_some());

    let staging = staging_tables(&client).await;
    assert_eq!(staging.len(), 1);
    assert!(client.dropped_tables().await.contains(&staging[0]));
    assert!(client.table(&staging[0]).await.is_none());

    let sql = client.executed_sql().await;
    assert!(sql[0].starts_with(&format!("CREATE TABLE `out_c`.`{}` COPY `in_c`.`src`", staging[0].table)));
    assert!(sql[1].contains("SELECT `col1`, `col2`, `col3`, CURRENT_TIMESTAMP() FROM"));

    let destination = client.table(&destination()).await.unwrap();
    assert_eq!(
        destination.column("_timestamp").map(|column| &column.typ),
        Some(&BigQueryType::Timestamp)
    );
}

#[tokio::test]
async fn incremental_upserts_merge_on_keys() {
    init_test_tracing();
    let source = table(
        "in_c",
        "src",
        &[("id", BigQueryType::Int64), ("name", BigQueryType::String)],
    );
    let existing = table(
        "out_c",
        "dst",
        &[
            ("id", BigQueryType::Int64),
            ("name", BigQueryType::String),
            ("_timestamp", BigQueryType::Timestamp),
        ],
    );
    let client = seeded_client(vec![(source, 2), (existing, 5)]).await;
    let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
        .with_dedup_columns(vec!["id".to_string()])
        .with_timestamp_column("_timestamp", TimestampMode::Now);

    let response = import_table(&client, &command(options)).await.unwrap();

    assert_eq!(response.imported_rows_count, 2);
    assert_eq!(response.imported_columns, vec!["id", "name"]);
    assert_eq!(response.table_rows_count, 5);

    let sql = client.executed_sql().await;
    let staging = &staging_tables(&client).await[0].table;
    assert_eq!(
        sql[0],
        format!(
            "INSERT INTO `out_c`.`{staging}` (`id`, `name`) SELECT * FROM (SELECT `id`, `name` FROM (SELECT * FROM `in_c`.`src`)) WHERE TRUE QUALIFY ROW_NUMBER() OVER (PARTITION BY `id` ORDER BY `id`) = 1"
        )
    );
    assert!(sql[1].starts_with("MERGE `out_c`.`dst` AS target USING"));
    assert!(sql[1].contains("ON target.`id` = source.`id`"));
    assert!(sql[1].contains(
        "WHEN MATCHED THEN UPDATE SET `name` = source.`name`, `_timestamp` = CURRENT_TIMESTAMP()"
    ));
    assert!(sql[1].ends_with(
        "WHEN NOT MATCHED THEN INSERT (`id`, `name`, `_timestamp`) VALUES (source.`id`, source.`name`, CURRENT_TIMESTAMP())"
    ));
}

#[tokio::test]
async fn filtered_incremental_import_appends_selected_rows() {
    init_test_tracing();
    let source = table(
        "in_c",
        "src",
        &[
            ("id", BigQueryType::Int64),
            ("Name", BigQueryType::String),
            ("_timestamp", BigQueryType::Timestamp),
        ],
    );
    let client = seeded_client(vec![(source, 10)]).await;
    let mut mapping = SourceMapping::table(TableRef::new("in_c", "src"));
    mapping.column_mappings = vec![
        ColumnMapping::new("id", "id"),
        ColumnMapping::new("name", "full_name"),
    ];
    mapping.where_filters = vec![WhereFilter::new("id", Operator::Ne, vec!["0".to_string()])];
    mapping.limit = Some(4);
    let command = ImportTableCommand {
        source: mapping,
        destination: destination(),
        import_options: ImportOptions::new(ImportType::Incremental, DedupType::InsertDuplicates),
    };

    let response = import_table(&client, &command).await.unwrap();

    assert_eq!(response.imported_rows_count, 4);
    assert_eq!(response.imported_columns, vec!["id", "full_name"]);
    let destination = client.table(&destination()).await.unwrap();
    assert_eq!(destination.column_names(), vec!["id", "full_name"]);
    assert_eq!(response.table_rows_count, 4);

    let load = &client.queries().await[0];
    assert!(load.sql.contains("SELECT `id`, `Name` AS `full_name` FROM `in_c`.`src` WHERE `id` <> @filter_0 LIMIT 4"));
    assert!(load.parameter("filter_0").is_some());
}

#[tokio::test]
async fn view_import_reports_no_rows() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 3)]).await;
    let options = ImportOptions::new(ImportType::View, DedupType::InsertDuplicates);

    let response = import_table(&client, &command(options.clone())).await.unwrap();

    assert_eq!(response.imported_rows_count, 0);
    assert_eq!(response.table_rows_count, 0);
    assert!(response.imported_columns.is_empty());
    assert!(client.is_view(&destination()).await);
    assert_eq!(
        client.table_stats(&destination()).await.unwrap().num_rows,
        3
    );
    assert_eq!(
        client.executed_sql().await,
        vec!["CREATE VIEW `out_c`.`dst` AS SELECT * FROM `in_c`.`src`"]
    );

    let err = import_table(&client, &command(options.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectAlreadyExists);

    import_table(&client, &command(options.with_create_mode(CreateMode::Replace)))
        .await
        .unwrap();
    assert_eq!(client.dropped_tables().await, vec![destination()]);
    assert!(client.is_view(&destination()).await);
}

#[tokio::test]
async fn clone_falls_back_to_copy_with_select() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 7)]).await;
    client
        .fail_on(
            " CLONE ",
            driver_error!(
                ErrorKind::DestinationQueryFailed,
                "BigQuery query failed",
                "Cannot clone tables across regions"
            ),
        )
        .await;
    let options = ImportOptions::new(ImportType::Clone, DedupType::InsertDuplicates);

    let response = import_table(&client, &command(options)).await.unwrap();

    assert_eq!(response.imported_rows_count, 7);
    assert_eq!(response.table_rows_count, 7);
    assert_eq!(
        client.executed_sql().await,
        vec![
            "CREATE TABLE `out_c`.`dst` CLONE `in_c`.`src`",
            "CREATE TABLE `out_c`.`dst` AS SELECT * FROM `in_c`.`src`",
        ]
    );
}

#[tokio::test]
async fn column_mismatch_names_every_offender() {
    init_test_tracing();
    let source = table(
        "in_c",
        "src",
        &[("id", BigQueryType::Int64), ("name", BigQueryType::String)],
    );
    let existing = table(
        "out_c",
        "dst",
        &[
            ("id", BigQueryType::Bool),
            ("extra", BigQueryType::String),
            ("_timestamp", BigQueryType::Timestamp),
        ],
    );
    let client = seeded_client(vec![(source, 2), (existing, 0)]).await;
    let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
        .with_dedup_columns(vec!["id".to_string()]);

    let err = import_table(&client, &command(options)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ColumnsMismatch);
    assert_eq!(
        err.detail(),
        Some(
            "columns of `out_c.dst` do not match the source: `id` has type INT64 in the source and BOOL in the destination, `extra` is missing in the source, `name` is missing in the destination"
        )
    );
    assert!(client.executed_sql().await.is_empty());
}

#[tokio::test]
async fn source_timestamp_missing_in_destination_is_a_mismatch() {
    init_test_tracing();
    let source = table(
        "in_c",
        "src",
        &[
            ("id", BigQueryType::Int64),
            ("name", BigQueryType::String),
            ("_timestamp", BigQueryType::Timestamp),
        ],
    );
    let existing = table(
        "out_c",
        "dst",
        &[("id", BigQueryType::Int64), ("name", BigQueryType::String)],
    );
    let client = seeded_client(vec![(source, 2), (existing, 0)]).await;
    let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
        .with_dedup_columns(vec!["id".to_string()]);

    let err = import_table(&client, &command(options)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ColumnsMismatch);
    assert_eq!(
        err.detail(),
        Some(
            "columns of `out_c.dst` do not match the source: `_timestamp` is missing in the destination"
        )
    );
    assert!(client.executed_sql().await.is_empty());
}

#[tokio::test]
async fn upserts_keep_the_latest_source_timestamp() {
    init_test_tracing();
    let columns = [
        ("id", BigQueryType::Int64),
        ("name", BigQueryType::String),
        ("changed_at", BigQueryType::Timestamp),
    ];
    let source = table("in_c", "src", &columns);
    let existing = table("out_c", "dst", &columns);
    let client = seeded_client(vec![(source, 2), (existing, 5)]).await;
    let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
        .with_dedup_columns(vec!["id".to_string()])
        .with_timestamp_column("changed_at", TimestampMode::FromSource);

    import_table(&client, &command(options)).await.unwrap();

    let sql = client.executed_sql().await;
    assert!(sql[0].ends_with("OVER (PARTITION BY `id` ORDER BY `changed_at` DESC) = 1"));
    assert!(sql[1].contains("OVER (PARTITION BY `id` ORDER BY `changed_at` DESC) = 1"));
    assert!(sql[1].contains("`changed_at` = source.`changed_at`"));
}

#[tokio::test]
async fn missing_source_columns_are_reported_together() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 3)]).await;
    let mut mapping = SourceMapping::table(TableRef::new("in_c", "src"));
    mapping.column_mappings = vec![
        ColumnMapping::new("col1", "col1"),
        ColumnMapping::new("a", "a"),
        ColumnMapping::new("b", "b"),
    ];
    let command = ImportTableCommand {
        source: mapping,
        destination: destination(),
        import_options: ImportOptions::new(ImportType::Full, DedupType::InsertDuplicates),
    };

    let err = import_table(&client, &command).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ColumnsMismatch);
    assert_eq!(
        err.detail(),
        Some("columns not found in source `in_c.src`: a, b")
    );
    assert!(!client.table_exists(&destination()).await.unwrap());
}

#[tokio::test]
async fn merge_failure_keeps_cleanup_error_as_suppressed() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 3)]).await;
    client
        .fail_on(
            "INSERT INTO `out_c`.`dst`",
            driver_error!(
                ErrorKind::DestinationQueryFailed,
                "BigQuery query failed",
                "Quota exceeded"
            ),
        )
        .await;
    client
        .fail_drop_on(
            "__temp_",
            driver_error!(ErrorKind::DestinationIoError, "BigQuery request failed"),
        )
        .await;
    let options = ImportOptions::new(ImportType::Incremental, DedupType::InsertDuplicates)
        .with_import_as_null(vec![String::new()]);

    let err = import_table(&client, &command(options)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    assert_eq!(err.suppressed().len(), 1);
    assert_eq!(err.suppressed()[0].kind(), ErrorKind::DestinationIoError);
    assert_eq!(staging_tables(&client).await.len(), 1);
}

#[tokio::test]
async fn null_in_required_column_is_a_validation_error() {
    init_test_tracing();
    let client = seeded_client(vec![(source_table(), 3)]).await;
    let existing = TableDefinition::new(
        "out_c",
        "dst",
        vec![
            ColumnDefinition::new("col1", BigQueryType::String, false),
            ColumnDefinition::new("col2", BigQueryType::String, true),
            ColumnDefinition::new("col3", BigQueryType::String, true),
        ],
        vec![],
    )
    .unwrap();
    client.add_table(existing, stats(1)).await;
    client
        .fail_on(
            "TRUNCATE TABLE `out_c`.`dst`",
            driver_error!(
                ErrorKind::DestinationQueryFailed,
                "BigQuery query failed",
                "Required field col1 cannot be null"
            ),
        )
        .await;

    let err = import_table(
        &client,
        &command(ImportOptions::new(
            ImportType::Full,
            DedupType::InsertDuplicates,
        )),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ImportValidation);
    assert_eq!(
        err.detail(),
        Some("column `col1` of `out_c.dst` does not accept NULL values")
    );
    assert_eq!(client.stats(&destination()).await, Some(stats(1)));
}

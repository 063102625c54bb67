use std::time::Instant;

use tracing::{info, warn};

use crate::bail;
use crate::client::ExecutionClient;
use crate::error::{DriverError, DriverResult, ErrorKind};
use crate::import::destination::{
    resolve_destination, validate_columns_exist, validate_incremental_destination,
};
use crate::import::merge::MergeEngine;
use crate::import::source::SourceResolver;
use crate::import::staging::{
    LoadStrategy, StagingTable, choose_load_strategy, load_staging, run_with_staging,
    shapes_identical,
};
use crate::sql::ddl;
use crate::types::{
    BoundQuery, CreateMode, DedupType, ImportResponse, ImportTableCommand, ImportType, PhaseTimer,
    TableRef,
};

/// Imports a source table, view or filtered select into a destination table.
///
/// Full and incremental imports go through a staging table unless the destination can be
/// replaced in a single statement. View and clone imports only create catalog objects. Nothing
/// is undone on failure besides dropping the staging table.
pub async fn import_table<C>(
    client: &C,
    command: &ImportTableCommand,
) -> DriverResult<ImportResponse>
where
    C: ExecutionClient,
{
    let start = Instant::now();
    info!(
        source = %command.source.table,
        destination = %command.destination,
        import_type = ?command.import_options.import_type,
        "starting table import"
    );

    let mut response = match command.import_options.import_type {
        ImportType::Full | ImportType::Incremental => import_rows(client, command).await?,
        ImportType::View => import_view(client, command).await?,
        ImportType::Clone => import_clone(client, command).await?,
    };
    response.timers.push(PhaseTimer::new("total", start.elapsed()));

    info!(
        destination = %command.destination,
        imported_rows = response.imported_rows_count,
        table_rows = response.table_rows_count,
        "table import finished"
    );

    Ok(response)
}

async fn import_rows<C>(client: &C, command: &ImportTableCommand) -> DriverResult<ImportResponse>
where
    C: ExecutionClient,
{
    let options = &command.import_options;

    let phase = Instant::now();
    let source = SourceResolver::new(client)
        .create_from_command(&command.source)
        .await?;
    let mut timers = vec![PhaseTimer::new("sourceResolve", phase.elapsed())];

    let Some(destination) = resolve_destination(
        client,
        &command.destination,
        options,
        source.effective_definition.columns(),
    )
    .await?
    else {
        bail!(
            ErrorKind::InvalidState,
            "Destination not resolved",
            format!("no destination table for `{}`", command.destination)
        );
    };

    if options.import_type == ImportType::Incremental
        && options.dedup_type == DedupType::UpdateDuplicates
    {
        validate_incremental_destination(
            &destination.definition,
            &source.effective_definition,
            options.timestamp_column.as_deref(),
        )?;
    } else if !destination.created {
        validate_columns_exist(&destination.definition, &source.effective_definition)?;
    }

    let merge = MergeEngine::new(
        client,
        &destination.definition,
        &source.effective_definition,
        options,
    )?;
    let staging = StagingTable::new(
        &command.destination.dataset,
        &source.effective_definition,
        &destination.definition,
        options,
    )?;
    let strategy = choose_load_strategy(
        options,
        source.source.is_table(),
        shapes_identical(staging.definition(), &source.full_definition),
    );
    info!(destination = %command.destination, ?strategy, "chose load strategy");

    let imported_rows_count = match strategy {
        LoadStrategy::DirectLoad => {
            let phase = Instant::now();
            merge.direct_load(&source).await?;
            timers.push(PhaseTimer::new("merge", phase.elapsed()));

            client.table_stats(&command.destination).await?.num_rows
        }
        LoadStrategy::NativeCopyToStaging | LoadStrategy::SqlStagedLoad => {
            let work = async {
                let phase = Instant::now();
                let rows = load_staging(client, &staging, strategy, &source, options).await?;
                let load_elapsed = phase.elapsed();

                let phase = Instant::now();
                if options.import_type == ImportType::Full {
                    merge.merge_full(&staging).await?;
                } else {
                    merge.merge_incremental(&staging).await?;
                }

                Ok::<_, DriverError>((rows, load_elapsed, phase.elapsed()))
            };

            let (rows, load_elapsed, merge_elapsed) =
                run_with_staging(client, &staging, work).await?;
            timers.push(PhaseTimer::new("stagingLoad", load_elapsed));
            timers.push(PhaseTimer::new("merge", merge_elapsed));

            rows
        }
    };

    let imported_columns = if strategy == LoadStrategy::NativeCopyToStaging {
        Vec::new()
    } else {
        source.effective_definition.column_names()
    };

    let stats = client.table_stats(&command.destination).await?;

    Ok(ImportResponse {
        imported_rows_count,
        imported_columns,
        table_rows_count: stats.num_rows,
        table_size_bytes: stats.num_bytes,
        timers,
    })
}

/// Makes room for a view or clone, dropping an existing object only when replacing.
async fn prepare_replaceable<C>(client: &C, command: &ImportTableCommand) -> DriverResult<()>
where
    C: ExecutionClient,
{
    let destination = &command.destination;
    if !client.table_exists(destination).await? {
        return Ok(());
    }

    if command.import_options.create_mode != CreateMode::Replace {
        bail!(
            ErrorKind::ObjectAlreadyExists,
            "Destination already exists",
            format!("`{destination}` already exists and the import does not replace it")
        );
    }

    info!(%destination, "dropping existing destination before replacing it");
    client.drop_table(destination).await
}

async fn import_view<C>(client: &C, command: &ImportTableCommand) -> DriverResult<ImportResponse>
where
    C: ExecutionClient,
{
    prepare_replaceable(client, command).await?;

    let phase = Instant::now();
    let view = ddl::create_view(&command.destination, &command.source.table)?;
    client.submit_query(&BoundQuery::new(view)).await?;

    Ok(ImportResponse {
        timers: vec![PhaseTimer::new("merge", phase.elapsed())],
        ..Default::default()
    })
}

async fn import_clone<C>(client: &C, command: &ImportTableCommand) -> DriverResult<ImportResponse>
where
    C: ExecutionClient,
{
    prepare_replaceable(client, command).await?;

    let phase = Instant::now();
    clone_table(client, &command.destination, &command.source.table).await?;
    let timers = vec![PhaseTimer::new("merge", phase.elapsed())];

    let stats = client.table_stats(&command.destination).await?;

    Ok(ImportResponse {
        imported_rows_count: stats.num_rows,
        imported_columns: Vec::new(),
        table_rows_count: stats.num_rows,
        table_size_bytes: stats.num_bytes,
        timers,
    })
}

/// Clones `source`, copying it with a select when the engine refuses the clone.
async fn clone_table<C>(client: &C, destination: &TableRef, source: &TableRef) -> DriverResult<()>
where
    C: ExecutionClient,
{
    let clone = ddl::create_table_clone(destination, source)?;
    match client.submit_query(&BoundQuery::new(clone)).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::DestinationQueryFailed => {
            warn!(%source, %destination, error = %err, "table clone failed, copying with a select");
            let copy = ddl::create_table_as_select(destination, source)?;
            client.submit_query(&BoundQuery::new(copy)).await?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

//! Typed command dispatch.

use driver_config::load_config;
use driver_config::shared::{DriverConfig, DriverConfigWithoutSecrets};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span};

use crate::client::ExecutionClient;
use crate::client::bigquery::BigQueryExecutionClient;
use crate::commands::{
    DeleteTableRowsCommand, DeleteTableRowsResponse, ExportTableCommand, ExportTableResponse,
    PreviewTableCommand, PreviewTableResponse, delete_table_rows, export_table, preview_table,
};
use crate::driver_error;
use crate::error::{DriverResult, ErrorKind};
use crate::import::import_table;
use crate::types::{ImportResponse, ImportTableCommand};

/// A storage command the driver executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "command", rename_all = "camelCase")]
pub enum Command {
    ImportTable(ImportTableCommand),
    PreviewTable(PreviewTableCommand),
    ExportTable(ExportTableCommand),
    DeleteTableRows(DeleteTableRowsCommand),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ImportTable(_) => "importTable",
            Command::PreviewTable(_) => "previewTable",
            Command::ExportTable(_) => "exportTable",
            Command::DeleteTableRows(_) => "deleteTableRows",
        }
    }
}

/// Response to a [`Command`], of the matching variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "response", rename_all = "camelCase")]
pub enum CommandResponse {
    ImportTable(ImportResponse),
    PreviewTable(PreviewTableResponse),
    ExportTable(ExportTableResponse),
    DeleteTableRows(DeleteTableRowsResponse),
}

/// Runs storage commands against one execution client.
#[derive(Debug, Clone)]
pub struct Driver<C> {
    client: C,
    config: DriverConfig,
}

impl Driver<BigQueryExecutionClient> {
    /// Loads [`DriverConfig`] from the configuration files and `APP_` variables, then connects.
    pub async fn from_environment() -> DriverResult<Self> {
        let config = load_config::<DriverConfig>().map_err(|err| {
            driver_error!(
                ErrorKind::ConfigError,
                "Failed to load driver configuration",
                err.to_string(),
                source: err
            )
        })?;
        info!(
            config = ?DriverConfigWithoutSecrets::from(config.clone()),
            "loaded driver configuration"
        );

        Self::connect(config).await
    }

    /// Validates `config` and connects to BigQuery with its service account key.
    pub async fn connect(config: DriverConfig) -> DriverResult<Self> {
        let client = BigQueryExecutionClient::from_config(&config).await?;

        Ok(Self { client, config })
    }
}

impl<C> Driver<C>
where
    C: ExecutionClient,
{
    pub fn new(client: C, config: DriverConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Executes `command`.
    pub async fn run(&self, command: Command) -> DriverResult<CommandResponse> {
        let span = info_span!("driver_command", command = command.name());

        async {
            match command {
                Command::ImportTable(command) => import_table(&self.client, &command)
                    .await
                    .map(CommandResponse::ImportTable),
                Command::PreviewTable(command) => {
                    preview_table(&self.client, &self.config.preview, &command)
                        .await
                        .map(CommandResponse::PreviewTable)
                }
                Command::ExportTable(command) => export_table(&self.client, &command)
                    .await
                    .map(CommandResponse::ExportTable),
                Command::DeleteTableRows(command) => delete_table_rows(&self.client, &command)
                    .await
                    .map(CommandResponse::DeleteTableRows),
            }
        }
        .instrument(span)
        .await
    }
}

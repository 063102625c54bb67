use std::time::Duration;

use driver_config::shared::DriverConfig;
use gcp_bigquery_client::Client;
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::get_query_results_response::GetQueryResultsResponse;
use gcp_bigquery_client::model::query_parameter::QueryParameter as BigQueryParameter;
use gcp_bigquery_client::model::query_parameter_type::QueryParameterType;
use gcp_bigquery_client::model::query_parameter_value::QueryParameterValue;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::QueryResponse;
use gcp_bigquery_client::model::table_row::TableRow;
use gcp_bigquery_client::model::table_schema::TableSchema;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use secrecy::ExposeSecret;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::client::ExecutionClient;
use crate::error::{DriverError, DriverResult, ErrorKind};
use crate::sql::ddl;
use crate::sql::quote::qualified_dataset;
use crate::types::{
    BigQueryType, BoundQuery, ColumnDefinition, ParameterValue, QueryParameter, RowSet,
    TableDefinition, TableRef, TableStats,
};
use crate::{bail, driver_error};

/// BigQuery project identifier.
pub type BigQueryProjectId = String;

/// Converts BigQuery errors to driver errors with appropriate classification.
fn bq_error_to_driver_error(err: BQError) -> DriverError {
    let (kind, description) = match &err {
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account key",
        ),
        BQError::InvalidServiceAccountAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account authenticator",
        ),
        BQError::InvalidApplicationDefaultCredentialsAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery application default credentials",
        ),
        BQError::AuthError(_) | BQError::YupAuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication token missing",
        ),
        BQError::RequestError(_) => (ErrorKind::DestinationIoError, "BigQuery request failed"),
        BQError::ResponseError { error } => {
            classify_response_error(i64::from(error.error.code), &err.to_string())
        }
        BQError::NoDataAvailable => (
            ErrorKind::InvalidState,
            "BigQuery result set positioning error",
        ),
        BQError::InvalidColumnType { .. } => {
            (ErrorKind::ConversionError, "BigQuery column type mismatch")
        }
        BQError::SerializationError(_) => (
            ErrorKind::SerializationError,
            "BigQuery JSON serialization error",
        ),
        _ => (ErrorKind::DestinationQueryFailed, "BigQuery error"),
    };

    driver_error!(kind, description, err.to_string())
}

/// Classifies an HTTP error response of the BigQuery REST API.
fn classify_response_error(code: i64, message: &str) -> (ErrorKind, &'static str) {
    if code == 404 {
        return (ErrorKind::ObjectNotFound, "BigQuery object not found");
    }

    if code == 409 && message.contains("Already Exists") {
        return (
            ErrorKind::ObjectAlreadyExists,
            "BigQuery object already exists",
        );
    }

    if code == 429
        || message.contains("rateLimitExceeded")
        || message.contains("jobRateLimitExceeded")
    {
        return (ErrorKind::TooManyRequests, "BigQuery rate limit exceeded");
    }

    if code == 401 {
        return (
            ErrorKind::AuthenticationError,
            "BigQuery authentication failed",
        );
    }

    (ErrorKind::DestinationQueryFailed, "BigQuery query failed")
}

/// Returns the wait before the next job completion poll, `min(2^attempt, cap)` seconds.
fn job_poll_backoff(attempt: u32, max_backoff_secs: u64) -> Duration {
    let secs = 2u64
        .checked_pow(attempt)
        .unwrap_or(u64::MAX)
        .min(max_backoff_secs);

    Duration::from_secs(secs)
}

fn to_bigquery_parameter(parameter: &QueryParameter) -> BigQueryParameter {
    BigQueryParameter {
        name: Some(parameter.name.clone()),
        parameter_type: Some(QueryParameterType {
            r#type: parameter.value.type_name().to_string(),
            array_type: None,
            struct_types: None,
        }),
        parameter_value: Some(QueryParameterValue {
            value: Some(parameter.value.to_string()),
            array_values: None,
            struct_values: None,
        }),
    }
}

fn cell_to_string(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(value) => Some(value),
        other => Some(other.to_string()),
    }
}

/// One response page of a query job.
struct ResultPage {
    complete: bool,
    job_id: Option<String>,
    location: Option<String>,
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    affected_rows: Option<String>,
    page_token: Option<String>,
}

impl ResultPage {
    fn new(
        complete: Option<bool>,
        job_reference: Option<(Option<String>, Option<String>)>,
        schema: Option<TableSchema>,
        rows: Option<Vec<TableRow>>,
        affected_rows: Option<String>,
        page_token: Option<String>,
    ) -> Self {
        let (job_id, location) = job_reference.unwrap_or((None, None));
        let columns = schema
            .and_then(|schema| schema.fields)
            .map(|fields| fields.into_iter().map(|field| field.name).collect())
            .unwrap_or_default();
        let rows = rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| {
                row.columns
                    .unwrap_or_default()
                    .into_iter()
                    .map(|cell| cell_to_string(cell.value))
                    .collect()
            })
            .collect();

        Self {
            complete: complete.unwrap_or(true),
            job_id,
            location,
            columns,
            rows,
            affected_rows,
            page_token,
        }
    }
}

impl From<QueryResponse> for ResultPage {
    fn from(response: QueryResponse) -> Self {
        ResultPage::new(
            response.job_complete,
            response
                .job_reference
                .map(|reference| (reference.job_id, reference.location)),
            response.schema,
            response.rows,
            response.num_dml_affected_rows,
            response.page_token,
        )
    }
}

impl From<GetQueryResultsResponse> for ResultPage {
    fn from(response: GetQueryResultsResponse) -> Self {
        ResultPage::new(
            response.job_complete,
            response
                .job_reference
                .map(|reference| (reference.job_id, reference.location)),
            response.schema,
            response.rows,
            response.num_dml_affected_rows,
            response.page_token,
        )
    }
}

/// [`ExecutionClient`] backed by the BigQuery REST API.
#[derive(Clone)]
pub struct BigQueryExecutionClient {
    project_id: BigQueryProjectId,
    location: Option<String>,
    job_poll_max_backoff_secs: u64,
    client: Client,
}

impl BigQueryExecutionClient {
    /// Creates a client from a validated [`DriverConfig`].
    pub async fn from_config(config: &DriverConfig) -> DriverResult<Self> {
        config.validate()?;

        let mut client = Self::new_with_key(
            config.project_id.clone(),
            config.service_account_key.expose_secret(),
        )
        .await?;
        client.location = config.location.clone();
        client.job_poll_max_backoff_secs = config.job_poll_max_backoff_secs;

        Ok(client)
    }

    /// Creates a client from a service account key JSON string.
    pub async fn new_with_key(project_id: BigQueryProjectId, sa_key: &str) -> DriverResult<Self> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(bq_error_to_driver_error)?;
        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_driver_error)?;

        Ok(Self::with_client(project_id, client))
    }

    /// Creates a client from a service account key file.
    pub async fn new_with_key_path(
        project_id: BigQueryProjectId,
        sa_key_file: &str,
    ) -> DriverResult<Self> {
        let client = ClientBuilder::new()
            .build_from_service_account_key_file(sa_key_file)
            .await
            .map_err(bq_error_to_driver_error)?;

        Ok(Self::with_client(project_id, client))
    }

    /// Creates a client using Application Default Credentials.
    pub async fn new_with_adc(project_id: BigQueryProjectId) -> DriverResult<Self> {
        let client = ClientBuilder::new()
            .build_from_application_default_credentials()
            .await
            .map_err(bq_error_to_driver_error)?;

        Ok(Self::with_client(project_id, client))
    }

    fn with_client(project_id: BigQueryProjectId, client: Client) -> Self {
        Self {
            project_id,
            location: None,
            job_poll_max_backoff_secs: DriverConfig::DEFAULT_JOB_POLL_MAX_BACKOFF_SECS,
            client,
        }
    }

    fn query_request(&self, query: &BoundQuery) -> QueryRequest {
        let mut request = QueryRequest::new(query.sql.clone());
        request.location = self.location.clone();

        if !query.parameters.is_empty() {
            request.parameter_mode = Some("NAMED".to_string());
            request.query_parameters =
                Some(query.parameters.iter().map(to_bigquery_parameter).collect());
        }

        request
    }

    async fn fetch_results(
        &self,
        job_id: &str,
        location: Option<String>,
        page_token: Option<String>,
    ) -> DriverResult<ResultPage> {
        let mut parameters = GetQueryResultsParameters::default();
        parameters.location = location;
        parameters.page_token = page_token;

        let response = self
            .client
            .job()
            .get_query_results(&self.project_id, job_id, parameters)
            .await
            .map_err(bq_error_to_driver_error)?;

        Ok(ResultPage::from(response))
    }
}

impl ExecutionClient for BigQueryExecutionClient {
    async fn submit_query(&self, query: &BoundQuery) -> DriverResult<RowSet> {
        debug!(sql = %query.sql, parameters = query.parameters.len(), "submitting bigquery query");

        let response = self
            .client
            .job()
            .query(&self.project_id, self.query_request(query))
            .await
            .map_err(bq_error_to_driver_error)?;
        let mut page = ResultPage::from(response);

        let mut attempt = 0;
        while !page.complete {
            let Some(job_id) = page.job_id.clone() else {
                bail!(
                    ErrorKind::InvalidState,
                    "BigQuery job reference missing",
                    "an incomplete query response did not reference its job"
                );
            };

            let wait = job_poll_backoff(attempt, self.job_poll_max_backoff_secs);
            debug!(%job_id, attempt, wait_secs = wait.as_secs(), "waiting for bigquery job");
            sleep(wait).await;
            attempt = attempt.saturating_add(1);

            page = self
                .fetch_results(&job_id, page.location.clone(), None)
                .await?;
        }

        let affected_rows = page
            .affected_rows
            .as_deref()
            .map(str::parse::<u64>)
            .transpose()?;
        let columns = std::mem::take(&mut page.columns);
        let mut rows = std::mem::take(&mut page.rows);

        while let Some(page_token) = page.page_token.take() {
            let Some(job_id) = page.job_id.clone() else {
                break;
            };

            let next = self
                .fetch_results(&job_id, page.location.clone(), Some(page_token))
                .await?;
            rows.extend(next.rows);
            page.page_token = next.page_token;
        }

        Ok(RowSet {
            columns,
            rows,
            affected_rows,
        })
    }

    async fn reflect_table(&self, table: &TableRef) -> DriverResult<TableDefinition> {
        let dataset = qualified_dataset(&self.project_id, &table.dataset)?;
        let query = BoundQuery::with_parameters(
            format!(
                "SELECT column_name, data_type, is_nullable, column_default \
                 FROM {dataset}.INFORMATION_SCHEMA.COLUMNS \
                 WHERE table_name = @tableName \
                 ORDER BY ordinal_position"
            ),
            vec![QueryParameter::new(
                "tableName",
                ParameterValue::String(table.table.clone()),
            )],
        );

        let result = self.submit_query(&query).await?;
        if result.rows.is_empty() {
            bail!(
                ErrorKind::ObjectNotFound,
                "Table not found",
                format!("table `{table}` does not exist")
            );
        }

        let mut columns = Vec::with_capacity(result.rows.len());
        for index in 0..result.rows.len() {
            let Some(name) = result.value(index, "column_name") else {
                bail!(
                    ErrorKind::InvalidState,
                    "Column without name",
                    format!("INFORMATION_SCHEMA returned a nameless column for `{table}`")
                );
            };
            let (typ, length) =
                BigQueryType::parse_with_length(result.value(index, "data_type").unwrap_or(""));
            let nullable = result.value(index, "is_nullable") != Some("NO");

            let mut column = ColumnDefinition::new(name, typ, nullable);
            column.length = length;
            column.default = result
                .value(index, "column_default")
                .filter(|default| !default.eq_ignore_ascii_case("NULL"))
                .map(str::to_string);
            columns.push(column);
        }

        TableDefinition::new(table.dataset.clone(), table.table.clone(), columns, vec![])
    }

    async fn table_exists(&self, table: &TableRef) -> DriverResult<bool> {
        let result = self
            .client
            .table()
            .get(&self.project_id, &table.dataset, &table.table, None)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(BQError::ResponseError { error }) if error.error.code == 404 => Ok(false),
            Err(err) => Err(bq_error_to_driver_error(err)),
        }
    }

    async fn drop_table(&self, table: &TableRef) -> DriverResult<()> {
        info!(%table, "dropping table from bigquery");

        let result = self
            .client
            .table()
            .delete(&self.project_id, &table.dataset, &table.table)
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(BQError::ResponseError { error }) if error.error.code == 404 => Ok(()),
            Err(err) => Err(bq_error_to_driver_error(err)),
        }
    }

    async fn create_table(&self, definition: &TableDefinition) -> DriverResult<()> {
        info!(table = %definition.table_ref(), "creating table in bigquery");

        self.submit_query(&BoundQuery::new(ddl::create_table(definition)?))
            .await?;

        Ok(())
    }

    async fn table_stats(&self, table: &TableRef) -> DriverResult<TableStats> {
        let dataset = qualified_dataset(&self.project_id, &table.dataset)?;
        let query = BoundQuery::with_parameters(
            format!("SELECT row_count, size_bytes FROM {dataset}.__TABLES__ WHERE table_id = @tableName"),
            vec![QueryParameter::new(
                "tableName",
                ParameterValue::String(table.table.clone()),
            )],
        );

        let result = self.submit_query(&query).await?;
        if result.rows.is_empty() {
            bail!(
                ErrorKind::ObjectNotFound,
                "Table not found",
                format!("no statistics found for `{table}`")
            );
        }

        let num_rows = result.value(0, "row_count").unwrap_or("0").parse()?;
        let num_bytes = result.value(0, "size_bytes").unwrap_or("0").parse()?;

        Ok(TableStats {
            num_rows,
            num_bytes,
        })
    }
}

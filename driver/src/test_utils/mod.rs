//! Fixtures shared by unit and integration tests.
//!
//! Tests run against [`MemoryExecutionClient`], seeded with the helpers below.

use driver_config::shared::{DriverConfig, PreviewConfig};
use secrecy::Secret;

use crate::client::memory::MemoryExecutionClient;
use crate::types::{BigQueryType, ColumnDefinition, TableDefinition, TableStats};

/// Builds a table definition with nullable columns.
///
/// # Panics
///
/// Panics if `columns` contains duplicate names.
pub fn table(dataset: &str, name: &str, columns: &[(&str, BigQueryType)]) -> TableDefinition {
    let columns = columns
        .iter()
        .map(|(name, typ)| ColumnDefinition::new(*name, typ.clone(), true))
        .collect();

    TableDefinition::new(dataset, name, columns, vec![]).unwrap()
}

/// Returns stats of a table holding `rows` rows of eight bytes each.
pub fn stats(rows: u64) -> TableStats {
    TableStats {
        num_rows: rows,
        num_bytes: rows * 8,
    }
}

/// Creates a memory client holding `tables` with the given row counts.
pub async fn seeded_client(tables: Vec<(TableDefinition, u64)>) -> MemoryExecutionClient {
    let client = MemoryExecutionClient::new();
    for (definition, rows) in tables {
        client.add_table(definition, stats(rows)).await;
    }

    client
}

/// Returns a configuration that never reaches BigQuery.
pub fn test_config() -> DriverConfig {
    DriverConfig {
        project_id: "test-project".to_string(),
        location: None,
        service_account_key: Secret::new("{}".to_string()),
        job_poll_max_backoff_secs: DriverConfig::DEFAULT_JOB_POLL_MAX_BACKOFF_SECS,
        preview: PreviewConfig::default(),
    }
}

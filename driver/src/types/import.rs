use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{TIMESTAMP_COLUMN, TableRef, WhereFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportType {
    Full,
    Incremental,
    View,
    Clone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupType {
    InsertDuplicates,
    UpdateDuplicates,
}

/// What to do when the destination of a view or clone import already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateMode {
    #[default]
    Create,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampMode {
    /// Stamp rows with the time of the merge.
    #[default]
    Now,
    /// Copy the timestamp column from the source rows.
    FromSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    pub import_type: ImportType,
    pub dedup_type: DedupType,
    #[serde(default)]
    pub dedup_columns: Vec<String>,
    #[serde(default)]
    pub create_mode: CreateMode,
    /// Destination column stamped on every merged row, usually `_timestamp`.
    #[serde(default)]
    pub timestamp_column: Option<String>,
    #[serde(default)]
    pub timestamp_mode: TimestampMode,
    /// String values loaded as NULL into `STRING` columns.
    #[serde(default)]
    pub import_as_null: Vec<String>,
}

impl ImportOptions {
    pub fn new(import_type: ImportType, dedup_type: DedupType) -> Self {
        Self {
            import_type,
            dedup_type,
            dedup_columns: Vec::new(),
            create_mode: CreateMode::Create,
            timestamp_column: None,
            timestamp_mode: TimestampMode::Now,
            import_as_null: Vec::new(),
        }
    }

    pub fn with_dedup_columns(mut self, columns: Vec<String>) -> Self {
        self.dedup_columns = columns;
        self
    }

    pub fn with_create_mode(mut self, create_mode: CreateMode) -> Self {
        self.create_mode = create_mode;
        self
    }

    pub fn with_timestamp_column(mut self, column: impl Into<String>, mode: TimestampMode) -> Self {
        self.timestamp_column = Some(column.into());
        self.timestamp_mode = mode;
        self
    }

    pub fn with_import_as_null(mut self, values: Vec<String>) -> Self {
        self.import_as_null = values;
        self
    }

    /// Returns `true` if rows must be merged on their dedup columns.
    pub fn upserts(&self) -> bool {
        self.dedup_type == DedupType::UpdateDuplicates && !self.dedup_columns.is_empty()
    }

    /// Returns the column ordering duplicate rows, latest first.
    ///
    /// A timestamp column copied from the source wins over `_timestamp`. `has_column` tells
    /// which columns the deduplicated rows carry.
    pub fn latest_by(&self, has_column: impl Fn(&str) -> bool) -> Option<&str> {
        if self.timestamp_mode == TimestampMode::FromSource
            && let Some(column) = self.timestamp_column.as_deref()
            && has_column(column)
        {
            return Some(column);
        }

        has_column(TIMESTAMP_COLUMN).then_some(TIMESTAMP_COLUMN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub source_column_name: String,
    pub destination_column_name: String,
}

impl ColumnMapping {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_column_name: source.into(),
            destination_column_name: destination.into(),
        }
    }
}

/// Where the rows of an import come from and which of them to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapping {
    pub table: TableRef,
    #[serde(default)]
    pub column_mappings: Vec<ColumnMapping>,
    #[serde(default)]
    pub where_filters: Vec<WhereFilter>,
    #[serde(default)]
    pub limit: Option<u64>,
    /// Only take rows written within the last `seconds`.
    #[serde(default)]
    pub seconds: Option<u64>,
}

impl SourceMapping {
    pub fn table(table: TableRef) -> Self {
        Self {
            table,
            column_mappings: Vec::new(),
            where_filters: Vec::new(),
            limit: None,
            seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTableCommand {
    pub source: SourceMapping,
    pub destination: TableRef,
    pub import_options: ImportOptions,
}

/// Wall-clock duration of one import phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimer {
    pub name: String,
    pub seconds: f64,
}

impl PhaseTimer {
    pub fn new(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            seconds: elapsed.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub imported_rows_count: u64,
    pub imported_columns: Vec<String>,
    pub table_rows_count: u64,
    pub table_size_bytes: u64,
    pub timers: Vec<PhaseTimer>,
}

impl ImportResponse {
    pub fn timer(&self, name: &str) -> Option<&PhaseTimer> {
        self.timers.iter().find(|timer| timer.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upserts_requires_keys_and_update_mode() {
        let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates);
        assert!(!options.upserts());

        let options = options.with_dedup_columns(vec!["id".to_string()]);
        assert!(options.upserts());

        let options = ImportOptions::new(ImportType::Incremental, DedupType::InsertDuplicates)
            .with_dedup_columns(vec!["id".to_string()]);
        assert!(!options.upserts());
    }

    #[test]
    fn source_timestamp_orders_duplicates() {
        let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
            .with_timestamp_column("changed_at", TimestampMode::FromSource);
        assert_eq!(options.latest_by(|_| true), Some("changed_at"));
        assert_eq!(
            options.latest_by(|column| column == "_timestamp"),
            Some("_timestamp")
        );
        assert_eq!(options.latest_by(|_| false), None);

        let options = ImportOptions::new(ImportType::Incremental, DedupType::UpdateDuplicates)
            .with_timestamp_column("changed_at", TimestampMode::Now);
        assert_eq!(options.latest_by(|_| true), Some("_timestamp"));
    }

    #[test]
    fn import_command_deserializes() {
        let command: ImportTableCommand = serde_json::from_str(
            r#"{
                "source": {"table": {"dataset": "in_c", "table": "src"}, "seconds": 3600},
                "destination": {"dataset": "out_c", "table": "dst"},
                "importOptions": {
                    "importType": "INCREMENTAL",
                    "dedupType": "UPDATE_DUPLICATES",
                    "dedupColumns": ["id"],
                    "timestampColumn": "_timestamp"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(command.source.seconds, Some(3600));
        assert_eq!(command.import_options.create_mode, CreateMode::Create);
        assert_eq!(command.import_options.timestamp_mode, TimestampMode::Now);
        assert!(command.import_options.upserts());
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{DriverResult, ErrorKind};
use crate::types::BigQueryType;

/// Reference to a table inside a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Builds a reference from a protocol path, where the last segment names the dataset.
    pub fn from_path(path: &[String], table: impl Into<String>) -> DriverResult<Self> {
        let Some(dataset) = path.last() else {
            bail!(
                ErrorKind::InvalidArgument,
                "Empty table path",
                "a table path needs at least the dataset segment"
            );
        };

        Ok(Self::new(dataset.clone(), table))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub typ: BigQueryType,
    pub nullable: bool,
    /// Length or precision parameters, e.g. `10` or `10,2`.
    pub length: Option<String>,
    /// Default value expression, emitted verbatim after `DEFAULT`.
    pub default: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, typ: BigQueryType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            typ,
            nullable,
            length: None,
            default: None,
        }
    }

    pub fn with_length(mut self, length: impl Into<String>) -> Self {
        self.length = Some(length.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Returns the same column under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Returns the full SQL type including parameters, e.g. `STRING(10)`.
    pub fn sql_type(&self) -> String {
        match &self.length {
            Some(length) => format!("{}({length})", self.typ.as_sql()),
            None => self.typ.as_sql(),
        }
    }
}

/// Ordered list of columns of a table plus its advisory dedup columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub dataset: String,
    pub name: String,
    pub temporary: bool,
    columns: Vec<ColumnDefinition>,
    dedup_columns: Vec<String>,
}

impl TableDefinition {
    /// Creates a definition, checking that every dedup column is one of the columns.
    pub fn new(
        dataset: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<ColumnDefinition>,
        dedup_columns: Vec<String>,
    ) -> DriverResult<Self> {
        let missing: Vec<&str> = dedup_columns
            .iter()
            .filter(|dedup| !columns.iter().any(|column| column.is_named(dedup)))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            bail!(
                ErrorKind::ColumnsMismatch,
                "Dedup columns are not part of the table",
                format!("missing dedup columns: {}", missing.join(", "))
            );
        }

        Ok(Self {
            dataset: dataset.into(),
            name: name.into(),
            temporary: false,
            columns,
            dedup_columns,
        })
    }

    pub fn with_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.dataset.clone(), self.name.clone())
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn dedup_columns(&self) -> &[String] {
        &self.dedup_columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Looks a column up by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.is_named(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of all `STRING` columns in physical order.
    pub fn string_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|column| column.typ.is_string())
            .map(|column| column.name.as_str())
            .collect()
    }
}

use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// Comparison operator of a where filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    /// Returns the SQL operator used for a single-value comparison.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereFilter {
    pub column: String,
    pub operator: Operator,
    pub values: Vec<String>,
    #[serde(default)]
    pub data_type: Option<DataType>,
}

impl WhereFilter {
    pub fn new(column: impl Into<String>, operator: Operator, values: Vec<String>) -> Self {
        Self {
            column: column.into(),
            operator,
            values,
            data_type: None,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }
}

/// Row filters of a select, export or delete.
///
/// `change_since` and `change_until` are Unix seconds encoded as strings and apply to
/// `timestamp_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFilters {
    #[serde(default)]
    pub change_since: Option<String>,
    #[serde(default)]
    pub change_until: Option<String>,
    #[serde(default)]
    pub full_text_search: Option<String>,
    #[serde(default)]
    pub where_filters: Vec<WhereFilter>,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
}

fn default_timestamp_column() -> String {
    crate::types::TIMESTAMP_COLUMN.to_string()
}

impl Default for TableFilters {
    fn default() -> Self {
        Self {
            change_since: None,
            change_until: None,
            full_text_search: None,
            where_filters: Vec::new(),
            timestamp_column: default_timestamp_column(),
        }
    }
}

impl TableFilters {
    pub fn has_full_text_search(&self) -> bool {
        self.full_text_search
            .as_deref()
            .is_some_and(|search| !search.is_empty())
    }

    pub fn has_change_window(&self) -> bool {
        self.change_since.is_some() || self.change_until.is_some()
    }

    /// Returns `true` if any filter would restrict the rows.
    pub fn is_active(&self) -> bool {
        self.has_change_window() || self.has_full_text_search() || !self.where_filters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub column: String,
    pub order: Order,
    #[serde(default)]
    pub data_type: Option<DataType>,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, order: Order) -> Self {
        Self {
            column: column.into(),
            order,
            data_type: None,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }
}

use std::fmt;

/// Value bound to a named query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    String(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    /// UTC timestamp rendered as `YYYY-MM-DD HH:MM:SS+00:00`.
    Timestamp(String),
}

impl ParameterValue {
    /// Returns the BigQuery type name used when binding the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::String(_) => "STRING",
            ParameterValue::Int64(_) => "INT64",
            ParameterValue::Float64(_) => "FLOAT64",
            ParameterValue::Bool(_) => "BOOL",
            ParameterValue::Timestamp(_) => "TIMESTAMP",
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::String(value) | ParameterValue::Timestamp(value) => f.write_str(value),
            ParameterValue::Int64(value) => write!(f, "{value}"),
            ParameterValue::Float64(value) => write!(f, "{value}"),
            ParameterValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: String,
    pub value: ParameterValue,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// SQL text together with its named parameters, in binding order.
///
/// Parameters are referenced as `@name` in the SQL.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundQuery {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

impl BoundQuery {
    /// Creates a query without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(sql: impl Into<String>, parameters: Vec<QueryParameter>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters
            .iter()
            .find(|parameter| parameter.name == name)
            .map(|parameter| &parameter.value)
    }
}

impl fmt::Display for BoundQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Rows returned by a query, with every cell rendered as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    /// Rows touched by a DML statement, when the engine reports it.
    pub affected_rows: Option<u64>,
}

impl RowSet {
    pub fn affected(count: u64) -> Self {
        Self {
            affected_rows: Some(count),
            ..Default::default()
        }
    }

    /// Returns the cell at `row` for the named column.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self
            .columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))?;

        self.rows.get(row)?.get(index)?.as_deref()
    }
}

/// Size of a table as reported by the engine's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    pub num_rows: u64,
    pub num_bytes: u64,
}

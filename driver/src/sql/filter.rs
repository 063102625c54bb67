use chrono::DateTime;
use tracing::debug;

use crate::bail;
use crate::error::{DriverResult, ErrorKind};
use crate::sql::cast::{cast_expression, cast_value, column_reference};
use crate::sql::placeholders::rewrite_placeholders;
use crate::sql::quote::qualified_table;
use crate::types::{
    BoundQuery, DataType, Operator, Order, OrderBy, ParameterValue, QueryParameter,
    TableDefinition, TableFilters, WhereFilter,
};

const CHANGE_SINCE_PARAMETER: &str = "changeSince";
const CHANGE_UNTIL_PARAMETER: &str = "changeUntil";
const SEARCH_PARAMETER: &str = "searchText";

/// Kind of statement produced by [`TableQueryBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Select,
    Delete,
}

/// Sampling settings for previews of large tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRequest {
    /// Current number of rows in the table.
    pub row_count: u64,
    pub large_table_threshold: u64,
    pub default_percent: u8,
    pub min_percent: u8,
}

impl SampleRequest {
    /// Returns the sample percentage to use, or `None` when the table is small enough.
    fn percent(&self, limit: i64) -> Option<u8> {
        if self.row_count <= self.large_table_threshold {
            return None;
        }

        let small_fraction = u64::try_from(limit)
            .ok()
            .filter(|limit| *limit > 0)
            .is_some_and(|limit| limit.saturating_mul(100) < self.row_count);

        if small_fraction {
            Some(self.min_percent)
        } else {
            Some(self.default_percent)
        }
    }
}

/// Checks that the change window bounds are Unix seconds.
pub fn validate_change_window(filters: &TableFilters) -> DriverResult<()> {
    for (name, value) in [
        (CHANGE_SINCE_PARAMETER, &filters.change_since),
        (CHANGE_UNTIL_PARAMETER, &filters.change_until),
    ] {
        if let Some(value) = value {
            utc_timestamp(name, value)?;
        }
    }

    Ok(())
}

/// Converts Unix seconds into the `TIMESTAMP` literal format BigQuery accepts.
fn utc_timestamp(name: &str, value: &str) -> DriverResult<String> {
    let Ok(seconds) = value.trim().parse::<i64>() else {
        bail!(
            ErrorKind::InvalidArgument,
            "Invalid change window",
            format!("{name} must be a Unix timestamp in seconds, got `{value}`")
        );
    };

    let Some(timestamp) = DateTime::from_timestamp(seconds, 0) else {
        bail!(
            ErrorKind::InvalidArgument,
            "Invalid change window",
            format!("{name} `{value}` is out of range")
        );
    };

    Ok(timestamp.format("%Y-%m-%d %H:%M:%S+00:00").to_string())
}

/// Builds a predicate for one where filter and collects its parameters.
///
/// Parameters are named `filter_<index>` or `filter_<index>_<n>` for multi-value filters.
pub(crate) fn where_filter_predicate(
    table_alias: Option<&str>,
    filter: &WhereFilter,
    index: usize,
    parameters: &mut Vec<QueryParameter>,
) -> DriverResult<String> {
    let data_type = filter.data_type.unwrap_or(DataType::String);
    let column = cast_expression(table_alias, &filter.column, data_type)?;

    match filter.values.as_slice() {
        [] => bail!(
            ErrorKind::QueryBuilder,
            "Filter without values",
            format!("filter on column `{}` has no values", filter.column)
        ),
        [value] => {
            let name = format!("filter_{index}");
            let placeholder = cast_value(&format!(":{name}"), data_type)?;
            parameters.push(QueryParameter::new(
                name,
                ParameterValue::String(value.clone()),
            ));

            Ok(format!("{column} {} {placeholder}", filter.operator.as_sql()))
        }
        values => {
            let keyword = match filter.operator {
                Operator::Eq => "IN",
                Operator::Ne => "NOT IN",
                operator => bail!(
                    ErrorKind::QueryBuilder,
                    "Invalid operator for multiple values",
                    format!(
                        "operator `{}` on column `{}` accepts a single value, only `eq` and `ne` accept multiple values",
                        operator.as_str(),
                        filter.column
                    )
                ),
            };

            let mut placeholders = Vec::with_capacity(values.len());
            for (position, value) in values.iter().enumerate() {
                let name = format!("filter_{index}_{position}");
                placeholders.push(cast_value(&format!(":{name}"), data_type)?);
                parameters.push(QueryParameter::new(
                    name,
                    ParameterValue::String(value.clone()),
                ));
            }

            Ok(format!("{column} {keyword} ({})", placeholders.join(", ")))
        }
    }
}

/// Translates protocol level columns, ordering, filters and limits into BigQuery SQL.
#[derive(Debug, Clone, Copy)]
pub struct TableQueryBuilder<'a> {
    definition: &'a TableDefinition,
}

impl<'a> TableQueryBuilder<'a> {
    pub fn new(definition: &'a TableDefinition) -> Self {
        Self { definition }
    }

    /// Builds the statement.
    ///
    /// `limit` values of zero or below mean no limit. `sample` only applies to unfiltered
    /// selects.
    pub fn build(
        &self,
        mode: QueryMode,
        columns: &[String],
        order_by: &[OrderBy],
        filters: Option<&TableFilters>,
        limit: i64,
        sample: Option<&SampleRequest>,
    ) -> DriverResult<BoundQuery> {
        if let Some(filters) = filters
            && filters.has_full_text_search()
            && !filters.where_filters.is_empty()
        {
            bail!(
                ErrorKind::QueryBuilder,
                "Invalid filter combination",
                "full text search cannot be combined with where filters"
            );
        }

        if mode == QueryMode::Delete && (!columns.is_empty() || !order_by.is_empty() || limit > 0)
        {
            bail!(
                ErrorKind::QueryBuilder,
                "Invalid delete statement",
                "columns, ordering and limit are not supported when deleting rows"
            );
        }

        let table = qualified_table(&self.definition.table_ref())?;
        let alias = match mode {
            QueryMode::Select => Some(self.definition.name.as_str()),
            QueryMode::Delete => None,
        };

        let mut parameters = Vec::new();
        let predicates = match filters {
            Some(filters) => self.predicates(alias, filters, &mut parameters)?,
            None => Vec::new(),
        };

        let sql = match mode {
            QueryMode::Select => {
                let mut sql = format!("SELECT {} FROM {table}", self.projection(alias, columns)?);

                let filtered = filters.is_some_and(TableFilters::is_active);
                if !filtered && let Some(percent) = sample.and_then(|sample| sample.percent(limit))
                {
                    sql.push_str(&format!(" TABLESAMPLE SYSTEM ({percent} PERCENT)"));
                }

                if !predicates.is_empty() {
                    sql.push_str(&format!(" WHERE {}", predicates.join(" AND ")));
                }

                if !order_by.is_empty() {
                    sql.push_str(&format!(" ORDER BY {}", self.ordering(alias, order_by)?));
                }

                if limit > 0 {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }

                sql
            }
            QueryMode::Delete => {
                let condition = if predicates.is_empty() {
                    "TRUE".to_string()
                } else {
                    predicates.join(" AND ")
                };

                format!("DELETE FROM {table} WHERE {condition}")
            }
        };

        let query = BoundQuery::with_parameters(rewrite_placeholders(&sql), parameters);
        debug!(sql = %query.sql, parameters = query.parameters.len(), "built table query");

        Ok(query)
    }

    fn require_column(&self, column: &str) -> DriverResult<()> {
        if !self.definition.has_column(column) {
            bail!(
                ErrorKind::ColumnNotFound,
                "Column not found",
                format!(
                    "column `{column}` does not exist in table `{}`",
                    self.definition.table_ref()
                )
            );
        }

        Ok(())
    }

    fn projection(&self, alias: Option<&str>, columns: &[String]) -> DriverResult<String> {
        if columns.is_empty() {
            return Ok("*".to_string());
        }

        let mut projection = Vec::with_capacity(columns.len());
        for column in columns {
            self.require_column(column)?;
            projection.push(column_reference(alias, column)?);
        }

        Ok(projection.join(", "))
    }

    fn ordering(&self, alias: Option<&str>, order_by: &[OrderBy]) -> DriverResult<String> {
        let mut ordering = Vec::with_capacity(order_by.len());
        for entry in order_by {
            self.require_column(&entry.column)?;

            let expression = cast_expression(
                alias,
                &entry.column,
                entry.data_type.unwrap_or(DataType::String),
            )?;
            let direction = match entry.order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            ordering.push(format!("{expression} {direction}"));
        }

        Ok(ordering.join(", "))
    }

    fn predicates(
        &self,
        alias: Option<&str>,
        filters: &TableFilters,
        parameters: &mut Vec<QueryParameter>,
    ) -> DriverResult<Vec<String>> {
        let mut predicates = Vec::new();

        if filters.has_change_window() {
            self.require_column(&filters.timestamp_column)?;
            let timestamp = column_reference(alias, &filters.timestamp_column)?;

            if let Some(since) = &filters.change_since {
                let value = utc_timestamp(CHANGE_SINCE_PARAMETER, since)?;
                predicates.push(format!("{timestamp} >= :{CHANGE_SINCE_PARAMETER}"));
                parameters.push(QueryParameter::new(
                    CHANGE_SINCE_PARAMETER,
                    ParameterValue::Timestamp(value),
                ));
            }

            if let Some(until) = &filters.change_until {
                let value = utc_timestamp(CHANGE_UNTIL_PARAMETER, until)?;
                predicates.push(format!("{timestamp} < :{CHANGE_UNTIL_PARAMETER}"));
                parameters.push(QueryParameter::new(
                    CHANGE_UNTIL_PARAMETER,
                    ParameterValue::Timestamp(value),
                ));
            }
        }

        for (index, filter) in filters.where_filters.iter().enumerate() {
            self.require_column(&filter.column)?;
            predicates.push(where_filter_predicate(alias, filter, index, parameters)?);
        }

        if let Some(search) = filters
            .full_text_search
            .as_deref()
            .filter(|search| !search.is_empty())
        {
            let string_columns = self.definition.string_column_names();
            if string_columns.is_empty() {
                predicates.push("1 = 0".to_string());
            } else {
                let mut matches = Vec::with_capacity(string_columns.len());
                for column in string_columns {
                    matches.push(format!(
                        "{} LIKE :{SEARCH_PARAMETER}",
                        column_reference(alias, column)?
                    ));
                }
                predicates.push(format!("({})", matches.join(" OR ")));
                parameters.push(QueryParameter::new(
                    SEARCH_PARAMETER,
                    ParameterValue::String(format!("%{}%", escape_like(search))),
                ));
            }
        }

        Ok(predicates)
    }
}

/// Escapes `LIKE` wildcards so `value` only matches itself.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

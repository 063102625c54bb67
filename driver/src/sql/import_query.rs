use tracing::debug;

use crate::error::DriverResult;
use crate::sql::filter::where_filter_predicate;
use crate::sql::placeholders::rewrite_placeholders;
use crate::sql::quote::{qualified_table, quote_identifier, quote_identifier_list, quote_literal};
use crate::types::{
    BoundQuery, ColumnDefinition, ColumnMapping, TIMESTAMP_COLUMN, TableDefinition, TableRef,
    WhereFilter,
};

/// Select reading the rows of an import source.
///
/// `columns` pairs each source column with its destination name, in destination order. An
/// empty list selects every column.
#[derive(Debug, Clone, Copy)]
pub struct ImportSelect<'a> {
    pub source: &'a TableRef,
    pub columns: &'a [ColumnMapping],
    pub where_filters: &'a [WhereFilter],
    /// Only rows whose `_timestamp` is within this many seconds of now.
    pub seconds: Option<u64>,
    pub limit: Option<u64>,
}

impl ImportSelect<'_> {
    pub fn build(&self) -> DriverResult<BoundQuery> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.projection()?,
            qualified_table(self.source)?
        );

        let mut parameters = Vec::new();
        let mut predicates = Vec::new();

        if let Some(seconds) = self.seconds {
            predicates.push(format!(
                "{} >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {seconds} SECOND)",
                quote_identifier(TIMESTAMP_COLUMN)?
            ));
        }

        for (index, filter) in self.where_filters.iter().enumerate() {
            predicates.push(where_filter_predicate(
                None,
                filter,
                index,
                &mut parameters,
            )?);
        }

        if !predicates.is_empty() {
            sql.push_str(&format!(" WHERE {}", predicates.join(" AND ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let query = BoundQuery::with_parameters(rewrite_placeholders(&sql), parameters);
        debug!(sql = %query.sql, source = %self.source, "built import select");

        Ok(query)
    }

    fn projection(&self) -> DriverResult<String> {
        if self.columns.is_empty() {
            return Ok("*".to_string());
        }

        let mut projection = Vec::with_capacity(self.columns.len());
        for mapping in self.columns {
            let source = quote_identifier(&mapping.source_column_name)?;
            if mapping.source_column_name == mapping.destination_column_name {
                projection.push(source);
            } else {
                projection.push(format!(
                    "{source} AS {}",
                    quote_identifier(&mapping.destination_column_name)?
                ));
            }
        }

        Ok(projection.join(", "))
    }
}

/// Select reshaping source rows into the columns of a load target.
///
/// Columns whose source type differs from the target type are cast, `import_as_null` values of
/// `STRING` target columns become NULL and, when `dedup_keys` is not empty, only one row per key
/// is kept.
#[derive(Debug, Clone, Copy)]
pub struct LoadSelect<'a> {
    pub source: &'a BoundQuery,
    /// Columns produced by `source`, under their destination names.
    pub columns: &'a [ColumnDefinition],
    pub target: &'a TableDefinition,
    pub import_as_null: &'a [String],
    pub dedup_keys: &'a [String],
    /// Column ordering duplicates, the first row per key is kept.
    pub latest_by: Option<&'a str>,
}

impl LoadSelect<'_> {
    pub fn build(&self) -> DriverResult<BoundQuery> {
        let mut projection = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            let name = quote_identifier(&column.name)?;
            let mut expression = name.clone();

            if let Some(target) = self.target.column(&column.name) {
                if target.typ != column.typ {
                    expression = format!("CAST({expression} AS {})", target.typ.as_sql());
                }

                if target.typ.is_string() {
                    for value in self.import_as_null {
                        expression = format!("NULLIF({expression}, {})", quote_literal(value));
                    }
                }
            }

            if expression == name {
                projection.push(name);
            } else {
                projection.push(format!("{expression} AS {name}"));
            }
        }

        let mut sql = format!(
            "SELECT {} FROM ({})",
            projection.join(", "),
            self.source.sql
        );

        if !self.dedup_keys.is_empty() {
            sql = dedup_select(&sql, self.dedup_keys, self.latest_by)?;
        }

        Ok(BoundQuery::with_parameters(
            sql,
            self.source.parameters.clone(),
        ))
    }
}

/// Keeps one row per distinct `keys` of `select`.
///
/// When `latest_by` names a timestamp column the most recent row wins, otherwise the row order
/// of the engine decides.
pub fn dedup_select(select: &str, keys: &[String], latest_by: Option<&str>) -> DriverResult<String> {
    let partition = quote_identifier_list(keys)?;
    let order = match latest_by {
        Some(column) => format!("{} DESC", quote_identifier(column)?),
        None => partition.clone(),
    };

    Ok(format!(
        "SELECT * FROM ({select}) WHERE TRUE QUALIFY ROW_NUMBER() OVER (PARTITION BY {partition} ORDER BY {order}) = 1"
    ))
}

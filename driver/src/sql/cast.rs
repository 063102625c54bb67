use crate::bail;
use crate::error::{DriverResult, ErrorKind};
use crate::sql::quote::quote_identifier;
use crate::types::DataType;

/// Logical types the driver knows how to compare and sort.
pub const SUPPORTED_CAST_TYPES: &[DataType] = &[
    DataType::String,
    DataType::Integer,
    DataType::Bigint,
    DataType::Double,
    DataType::Real,
    DataType::Decimal,
];

/// Returns the quoted column, qualified by `table_alias` when given.
pub fn column_reference(table_alias: Option<&str>, column: &str) -> DriverResult<String> {
    let column = quote_identifier(column)?;

    match table_alias {
        Some(alias) => Ok(format!("{}.{column}", quote_identifier(alias)?)),
        None => Ok(column),
    }
}

/// Returns a reference to `column` that compares with the semantics of `data_type`.
///
/// String columns are referenced as-is; numeric types are wrapped in `SAFE_CAST` so that values
/// which do not convert become NULL instead of failing the query.
pub fn cast_expression(
    table_alias: Option<&str>,
    column: &str,
    data_type: DataType,
) -> DriverResult<String> {
    let reference = column_reference(table_alias, column)?;
    cast_value(&reference, data_type)
}

/// Applies the cast for `data_type` to an arbitrary expression, usually a placeholder.
pub fn cast_value(expression: &str, data_type: DataType) -> DriverResult<String> {
    match sql_type(data_type)? {
        Some(sql_type) => Ok(format!("SAFE_CAST({expression} AS {sql_type})")),
        None => Ok(expression.to_string()),
    }
}

fn sql_type(data_type: DataType) -> DriverResult<Option<&'static str>> {
    let sql_type = match data_type {
        DataType::String => None,
        DataType::Integer | DataType::Bigint => Some("INT64"),
        DataType::Double | DataType::Real => Some("FLOAT64"),
        DataType::Decimal => Some("NUMERIC"),
        DataType::Boolean | DataType::Date | DataType::Timestamp => {
            let supported = SUPPORTED_CAST_TYPES
                .iter()
                .map(DataType::as_str)
                .collect::<Vec<_>>()
                .join(", ");

            bail!(
                ErrorKind::UnsupportedType,
                "Unsupported data type",
                format!("data type `{data_type}` is not supported, supported types are: {supported}")
            );
        }
    };

    Ok(sql_type)
}

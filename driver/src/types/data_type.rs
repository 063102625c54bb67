use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{DriverError, ErrorKind};

/// Logical data type attached to protocol values.
///
/// Filter and ordering values arrive as strings; the logical type tells the query builder how to
/// compare them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    String,
    Integer,
    Double,
    Bigint,
    Real,
    Decimal,
    Boolean,
    Date,
    Timestamp,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "STRING",
            DataType::Integer => "INTEGER",
            DataType::Double => "DOUBLE",
            DataType::Bigint => "BIGINT",
            DataType::Real => "REAL",
            DataType::Decimal => "DECIMAL",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native BigQuery column type as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BigQueryType {
    String,
    Bytes,
    Int64,
    Float64,
    Numeric,
    BigNumeric,
    Bool,
    Date,
    Datetime,
    Time,
    Timestamp,
    Json,
    Geography,
    Interval,
    /// `ARRAY<...>`, with the element type kept verbatim.
    Array(String),
    /// `STRUCT<...>`, `RANGE<...>` and anything else kept verbatim.
    Other(String),
}

impl BigQueryType {
    /// Parses a catalog type such as `STRING(10)` or `NUMERIC(10, 2)`.
    ///
    /// Returns the type together with its parameter list (`10`, `10,2`), if any.
    pub fn parse_with_length(sql_type: &str) -> (BigQueryType, Option<String>) {
        let sql_type = sql_type.trim();
        let upper = sql_type.to_uppercase();

        if let Some(inner) = upper
            .strip_prefix("ARRAY<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return (BigQueryType::Array(inner.trim().to_string()), None);
        }

        if upper.contains('<') {
            return (BigQueryType::Other(upper), None);
        }

        let (base, length) = match upper.split_once('(') {
            Some((base, rest)) => {
                let length: String = rest
                    .trim_end_matches(')')
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                (base.trim().to_string(), (!length.is_empty()).then_some(length))
            }
            None => (upper, None),
        };

        let typ = match base.as_str() {
            "STRING" => BigQueryType::String,
            "BYTES" => BigQueryType::Bytes,
            "INT64" | "INT" | "INTEGER" | "SMALLINT" | "BIGINT" | "TINYINT" | "BYTEINT" => {
                BigQueryType::Int64
            }
            "FLOAT64" | "FLOAT" => BigQueryType::Float64,
            "NUMERIC" | "DECIMAL" => BigQueryType::Numeric,
            "BIGNUMERIC" | "BIGDECIMAL" => BigQueryType::BigNumeric,
            "BOOL" | "BOOLEAN" => BigQueryType::Bool,
            "DATE" => BigQueryType::Date,
            "DATETIME" => BigQueryType::Datetime,
            "TIME" => BigQueryType::Time,
            "TIMESTAMP" => BigQueryType::Timestamp,
            "JSON" => BigQueryType::Json,
            "GEOGRAPHY" => BigQueryType::Geography,
            "INTERVAL" => BigQueryType::Interval,
            _ => BigQueryType::Other(base),
        };

        (typ, length)
    }

    /// Returns `true` for types that accept any other type on import.
    pub fn is_string(&self) -> bool {
        matches!(self, BigQueryType::String)
    }

    /// Returns the SQL name of the type without parameters.
    pub fn as_sql(&self) -> String {
        match self {
            BigQueryType::String => "STRING".to_string(),
            BigQueryType::Bytes => "BYTES".to_string(),
            BigQueryType::Int64 => "INT64".to_string(),
            BigQueryType::Float64 => "FLOAT64".to_string(),
            BigQueryType::Numeric => "NUMERIC".to_string(),
            BigQueryType::BigNumeric => "BIGNUMERIC".to_string(),
            BigQueryType::Bool => "BOOL".to_string(),
            BigQueryType::Date => "DATE".to_string(),
            BigQueryType::Datetime => "DATETIME".to_string(),
            BigQueryType::Time => "TIME".to_string(),
            BigQueryType::Timestamp => "TIMESTAMP".to_string(),
            BigQueryType::Json => "JSON".to_string(),
            BigQueryType::Geography => "GEOGRAPHY".to_string(),
            BigQueryType::Interval => "INTERVAL".to_string(),
            BigQueryType::Array(element) => format!("ARRAY<{element}>"),
            BigQueryType::Other(raw) => raw.clone(),
        }
    }
}

impl fmt::Display for BigQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_sql())
    }
}

impl FromStr for BigQueryType {
    type Err = DriverError;

    /// Parses a type name, rejecting parameters and unknown names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match BigQueryType::parse_with_length(s) {
            (BigQueryType::Other(raw), _) if !raw.contains('<') => bail!(
                ErrorKind::UnsupportedType,
                "Unknown BigQuery type",
                format!("type `{raw}` is not a BigQuery type")
            ),
            (typ, None) => Ok(typ),
            (_, Some(length)) => bail!(
                ErrorKind::UnsupportedType,
                "Unexpected type parameters",
                format!("type `{s}` carries parameters `{length}`, use `parse_with_length`")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameterized_types() {
        assert_eq!(
            BigQueryType::parse_with_length("STRING(10)"),
            (BigQueryType::String, Some("10".to_string()))
        );
        assert_eq!(
            BigQueryType::parse_with_length("NUMERIC(10, 2)"),
            (BigQueryType::Numeric, Some("10,2".to_string()))
        );
        assert_eq!(
            BigQueryType::parse_with_length("int64"),
            (BigQueryType::Int64, None)
        );
    }

    #[test]
    fn normalizes_aliases() {
        assert_eq!("INTEGER".parse::<BigQueryType>().unwrap(), BigQueryType::Int64);
        assert_eq!("BOOLEAN".parse::<BigQueryType>().unwrap(), BigQueryType::Bool);
        assert_eq!("DECIMAL".parse::<BigQueryType>().unwrap(), BigQueryType::Numeric);
        assert_eq!("FLOAT".parse::<BigQueryType>().unwrap(), BigQueryType::Float64);
    }

    #[test]
    fn keeps_nested_types_verbatim() {
        assert_eq!(
            BigQueryType::parse_with_length("ARRAY<STRING>"),
            (BigQueryType::Array("STRING".to_string()), None)
        );
        let (typ, _) = BigQueryType::parse_with_length("STRUCT<a INT64>");
        assert_eq!(typ.as_sql(), "STRUCT<A INT64>");
    }

    #[test]
    fn rejects_unknown_type_names() {
        let err = "VARCHAR2".parse::<BigQueryType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    }
}

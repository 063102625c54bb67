//! Identifier and literal quoting for GoogleSQL.

use crate::driver_error;
use crate::error::{DriverResult, ErrorKind};
use crate::types::TableRef;

/// Escapes an identifier for use between backticks.
///
/// Empty identifiers and identifiers with control characters are rejected.
pub fn sanitize_identifier(identifier: &str, context: &str) -> DriverResult<String> {
    if identifier.is_empty() {
        return Err(driver_error!(
            ErrorKind::InvalidIdentifier,
            "Invalid BigQuery identifier",
            format!("{context} cannot be empty")
        ));
    }

    if identifier.chars().any(char::is_control) {
        return Err(driver_error!(
            ErrorKind::InvalidIdentifier,
            "Invalid BigQuery identifier",
            format!("{context} contains control characters")
        ));
    }

    let mut escaped = String::with_capacity(identifier.len());
    for ch in identifier.chars() {
        match ch {
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }

    Ok(escaped)
}

/// Returns the backtick quoted form of a column or table name.
pub fn quote_identifier(identifier: &str) -> DriverResult<String> {
    Ok(format!("`{}`", sanitize_identifier(identifier, "identifier")?))
}

/// Returns `` `dataset`.`table` ``.
pub fn qualified_table(table: &TableRef) -> DriverResult<String> {
    let dataset = sanitize_identifier(&table.dataset, "BigQuery dataset id")?;
    let name = sanitize_identifier(&table.table, "BigQuery table id")?;

    Ok(format!("`{dataset}`.`{name}`"))
}

/// Returns `` `project`.`dataset` `` for dataset scoped metadata views.
pub fn qualified_dataset(project_id: &str, dataset: &str) -> DriverResult<String> {
    let project_id = sanitize_identifier(project_id, "BigQuery project id")?;
    let dataset = sanitize_identifier(dataset, "BigQuery dataset id")?;

    Ok(format!("`{project_id}`.`{dataset}`"))
}

/// Quotes a string literal with single quotes.
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => quoted.push_str("\\'"),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('\'');

    quoted
}

/// Quotes every name and joins them with `, `.
pub fn quote_identifier_list<S: AsRef<str>>(names: &[S]) -> DriverResult<String> {
    let quoted = names
        .iter()
        .map(|name| quote_identifier(name.as_ref()))
        .collect::<DriverResult<Vec<_>>>()?;

    Ok(quoted.join(", "))
}

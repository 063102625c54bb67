//! Table level statements issued by the import engine and the execution clients.

use crate::error::DriverResult;
use crate::sql::quote::{qualified_table, quote_identifier};
use crate::types::{ColumnDefinition, TableDefinition, TableRef};

/// Generates the column specification used in `CREATE TABLE`.
pub fn column_spec(column: &ColumnDefinition) -> DriverResult<String> {
    let mut spec = format!("{} {}", quote_identifier(&column.name)?, column.sql_type());

    if let Some(default) = &column.default {
        spec.push_str(&format!(" DEFAULT {default}"));
    }

    if !column.nullable {
        spec.push_str(" NOT NULL");
    }

    Ok(spec)
}

/// `CREATE TABLE` for a definition. Dedup columns are not declared, they only matter when merging.
pub fn create_table(definition: &TableDefinition) -> DriverResult<String> {
    let columns = definition
        .columns()
        .iter()
        .map(column_spec)
        .collect::<DriverResult<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE {} ({})",
        qualified_table(&definition.table_ref())?,
        columns.join(", ")
    ))
}

pub fn create_table_copy(destination: &TableRef, source: &TableRef) -> DriverResult<String> {
    Ok(format!(
        "CREATE TABLE {} COPY {}",
        qualified_table(destination)?,
        qualified_table(source)?
    ))
}

pub fn create_table_clone(destination: &TableRef, source: &TableRef) -> DriverResult<String> {
    Ok(format!(
        "CREATE TABLE {} CLONE {}",
        qualified_table(destination)?,
        qualified_table(source)?
    ))
}

pub fn create_table_as_select(destination: &TableRef, source: &TableRef) -> DriverResult<String> {
    Ok(format!(
        "CREATE TABLE {} AS SELECT * FROM {}",
        qualified_table(destination)?,
        qualified_table(source)?
    ))
}

pub fn create_view(destination: &TableRef, source: &TableRef) -> DriverResult<String> {
    Ok(format!(
        "CREATE VIEW {} AS SELECT * FROM {}",
        qualified_table(destination)?,
        qualified_table(source)?
    ))
}

pub fn truncate_table(table: &TableRef) -> DriverResult<String> {
    Ok(format!("TRUNCATE TABLE {}", qualified_table(table)?))
}

/// Wraps statements into a multi statement transaction.
pub fn transaction<S: AsRef<str>>(statements: &[S]) -> String {
    let mut script = String::from("BEGIN TRANSACTION;\n");
    for statement in statements {
        script.push_str(statement.as_ref());
        script.push_str(";\n");
    }
    script.push_str("COMMIT TRANSACTION;");

    script
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::types::BigQueryType;

    #[test]
    fn create_table_declares_types_defaults_and_nullability() {
        let definition = TableDefinition::new(
            "out_c",
            "users",
            vec![
                ColumnDefinition::new("id", BigQueryType::Int64, false),
                ColumnDefinition::new("name", BigQueryType::String, true)
                    .with_length("50")
                    .with_default("'anonymous'"),
                ColumnDefinition::new("_timestamp", BigQueryType::Timestamp, true),
            ],
            vec!["id".to_string()],
        )
        .unwrap();

        assert_snapshot!(
            create_table(&definition).unwrap(),
            @"CREATE TABLE `out_c`.`users` (`id` INT64 NOT NULL, `name` STRING(50) DEFAULT 'anonymous', `_timestamp` TIMESTAMP)"
        );
    }

    #[test]
    fn transaction_wraps_statements() {
        let script = transaction(&["TRUNCATE TABLE `a`.`b`", "INSERT INTO `a`.`b` SELECT 1"]);

        assert_eq!(
            script,
            "BEGIN TRANSACTION;\nTRUNCATE TABLE `a`.`b`;\nINSERT INTO `a`.`b` SELECT 1;\nCOMMIT TRANSACTION;"
        );
    }

    #[test]
    fn copy_and_clone_reference_both_tables() {
        let source = TableRef::new("in_c", "src");
        let destination = TableRef::new("out_c", "dst");

        assert_eq!(
            create_table_copy(&destination, &source).unwrap(),
            "CREATE TABLE `out_c`.`dst` COPY `in_c`.`src`"
        );
        assert_eq!(
            create_table_clone(&destination, &source).unwrap(),
            "CREATE TABLE `out_c`.`dst` CLONE `in_c`.`src`"
        );
        assert_eq!(
            create_view(&destination, &source).unwrap(),
            "CREATE VIEW `out_c`.`dst` AS SELECT * FROM `in_c`.`src`"
        );
    }
}

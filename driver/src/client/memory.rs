use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::client::ExecutionClient;
use crate::driver_error;
use crate::error::{DriverError, DriverResult, ErrorKind};
use crate::types::{BoundQuery, RowSet, TableDefinition, TableRef, TableStats};

#[derive(Debug, Clone)]
struct MemoryTable {
    definition: TableDefinition,
    stats: TableStats,
    view: bool,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableRef, MemoryTable>,
    queries: Vec<BoundQuery>,
    failures: Vec<(String, DriverError)>,
    drop_failures: Vec<(String, DriverError)>,
    responses: Vec<(String, RowSet)>,
    created: Vec<TableRef>,
    dropped: Vec<TableRef>,
}

/// In-memory [`ExecutionClient`] for tests.
///
/// Keeps a catalog of table definitions and row counts and records every submitted query. The
/// statements generated by the driver are interpreted just enough to keep the catalog consistent:
/// `CREATE TABLE .. COPY|CLONE|AS SELECT`, `CREATE VIEW`, `TRUNCATE`, `INSERT .. SELECT` (adds
/// the rows of the first table read) and `DELETE .. WHERE TRUE`. `MERGE` and filtered deletes are
/// only recorded. Responses and failures can be scripted per SQL fragment.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutionClient {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryExecutionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table with its current size.
    pub async fn add_table(&self, definition: TableDefinition, stats: TableStats) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(
            definition.table_ref(),
            MemoryTable {
                definition,
                stats,
                view: false,
            },
        );
    }

    pub async fn set_table_stats(&self, table: &TableRef, stats: TableStats) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.tables.get_mut(table) {
            entry.stats = stats;
        }
    }

    /// Makes every query containing `fragment` fail with `error`.
    pub async fn fail_on(&self, fragment: impl Into<String>, error: DriverError) {
        let mut inner = self.inner.lock().await;
        inner.failures.push((fragment.into(), error));
    }

    /// Makes dropping any table whose `dataset.table` contains `fragment` fail with `error`.
    pub async fn fail_drop_on(&self, fragment: impl Into<String>, error: DriverError) {
        let mut inner = self.inner.lock().await;
        inner.drop_failures.push((fragment.into(), error));
    }

    /// Answers every query containing `fragment` with `rows`.
    pub async fn respond_to(&self, fragment: impl Into<String>, rows: RowSet) {
        let mut inner = self.inner.lock().await;
        inner.responses.push((fragment.into(), rows));
    }

    pub async fn queries(&self) -> Vec<BoundQuery> {
        let inner = self.inner.lock().await;
        inner.queries.clone()
    }

    pub async fn executed_sql(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.queries.iter().map(|query| query.sql.clone()).collect()
    }

    pub async fn created_tables(&self) -> Vec<TableRef> {
        let inner = self.inner.lock().await;
        inner.created.clone()
    }

    pub async fn dropped_tables(&self) -> Vec<TableRef> {
        let inner = self.inner.lock().await;
        inner.dropped.clone()
    }

    pub async fn table(&self, table: &TableRef) -> Option<TableDefinition> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map(|entry| entry.definition.clone())
    }

    pub async fn stats(&self, table: &TableRef) -> Option<TableStats> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map(|entry| entry.stats)
    }

    pub async fn is_view(&self, table: &TableRef) -> bool {
        let inner = self.inner.lock().await;
        inner.tables.get(table).is_some_and(|entry| entry.view)
    }
}

/// Parses a `` `dataset`.`table` `` reference at the start of `sql`.
fn parse_table(sql: &str) -> Option<TableRef> {
    let mut chars = sql.trim_start().chars();
    let dataset = parse_quoted(&mut chars)?;
    if chars.next()? != '.' {
        return None;
    }
    let table = parse_quoted(&mut chars)?;

    Some(TableRef::new(dataset, table))
}

fn parse_quoted(chars: &mut std::str::Chars<'_>) -> Option<String> {
    if chars.next()? != '`' {
        return None;
    }

    let mut value = String::new();
    loop {
        match chars.next()? {
            '\\' => value.push(chars.next()?),
            '`' => return Some(value),
            ch => value.push(ch),
        }
    }
}

fn table_after(sql: &str, keyword: &str) -> Option<TableRef> {
    let start = sql.find(keyword)? + keyword.len();
    parse_table(&sql[start..])
}

/// Returns the first table read by a `FROM` clause.
fn first_table_read(sql: &str) -> Option<TableRef> {
    sql.match_indices("FROM ")
        .find_map(|(index, keyword)| parse_table(&sql[index + keyword.len()..]))
}

fn trailing_limit(sql: &str) -> Option<u64> {
    let start = sql.rfind(" LIMIT ")? + " LIMIT ".len();
    sql[start..]
        .split(|ch: char| !ch.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}

impl Inner {
    fn find(&self, table: &TableRef) -> DriverResult<&MemoryTable> {
        match self.tables.get(table) {
            Some(entry) => Ok(entry),
            None => bail!(
                ErrorKind::ObjectNotFound,
                "Table not found",
                format!("table `{table}` does not exist")
            ),
        }
    }

    fn create_from(&mut self, destination: TableRef, source: &TableRef, view: bool) -> DriverResult<()> {
        if self.tables.contains_key(&destination) {
            bail!(
                ErrorKind::ObjectAlreadyExists,
                "Table already exists",
                format!("Already Exists: {destination}")
            );
        }

        let source = self.find(source)?.clone();
        let definition = TableDefinition::new(
            destination.dataset.clone(),
            destination.table.clone(),
            source.definition.columns().to_vec(),
            vec![],
        )?;
        self.tables.insert(
            destination.clone(),
            MemoryTable {
                definition,
                stats: source.stats,
                view,
            },
        );
        self.created.push(destination);

        Ok(())
    }

    /// Applies one statement and returns the number of affected rows, if known.
    fn apply(&mut self, statement: &str) -> DriverResult<Option<u64>> {
        let statement = statement.trim();

        if let Some(rest) = statement.strip_prefix("CREATE VIEW ") {
            if let (Some(destination), Some(source)) =
                (parse_table(rest), table_after(rest, " FROM "))
            {
                self.create_from(destination, &source, true)?;
            }
            return Ok(None);
        }

        if let Some(rest) = statement.strip_prefix("CREATE TABLE ") {
            let source = table_after(rest, " COPY ")
                .or_else(|| table_after(rest, " CLONE "))
                .or_else(|| table_after(rest, " AS SELECT * FROM "));
            if let (Some(destination), Some(source)) = (parse_table(rest), source) {
                self.create_from(destination, &source, false)?;
            }
            return Ok(None);
        }

        if let Some(rest) = statement.strip_prefix("TRUNCATE TABLE ") {
            if let Some(table) = parse_table(rest)
                && let Some(entry) = self.tables.get_mut(&table)
            {
                entry.stats = TableStats::default();
            }
            return Ok(None);
        }

        if let Some(rest) = statement.strip_prefix("INSERT INTO ") {
            let (Some(destination), Some(source)) = (parse_table(rest), first_table_read(rest))
            else {
                return Ok(None);
            };

            let mut rows = self.find(&source)?.stats.num_rows;
            if let Some(limit) = trailing_limit(rest) {
                rows = rows.min(limit);
            }

            let Some(entry) = self.tables.get_mut(&destination) else {
                bail!(
                    ErrorKind::ObjectNotFound,
                    "Table not found",
                    format!("table `{destination}` does not exist")
                );
            };
            entry.stats.num_rows += rows;

            return Ok(Some(rows));
        }

        if let Some(rest) = statement.strip_prefix("DELETE FROM ") {
            if rest.ends_with(" WHERE TRUE")
                && let Some(table) = parse_table(rest)
                && let Some(entry) = self.tables.get_mut(&table)
            {
                let deleted = entry.stats.num_rows;
                entry.stats = TableStats::default();
                return Ok(Some(deleted));
            }
            return Ok(None);
        }

        if let Some(rest) = statement.strip_prefix("MERGE ")
            && let Some(source) = first_table_read(rest)
        {
            return Ok(Some(self.find(&source)?.stats.num_rows));
        }

        Ok(None)
    }
}

impl ExecutionClient for MemoryExecutionClient {
    async fn submit_query(&self, query: &BoundQuery) -> DriverResult<RowSet> {
        let mut inner = self.inner.lock().await;
        inner.queries.push(query.clone());

        if let Some((_, error)) = inner
            .failures
            .iter()
            .find(|(fragment, _)| query.sql.contains(fragment.as_str()))
        {
            return Err(error.clone());
        }

        let mut affected_rows = None;
        for statement in query.sql.split(";\n") {
            if let Some(affected) = inner.apply(statement)? {
                affected_rows = Some(affected);
            }
        }

        if let Some((_, rows)) = inner
            .responses
            .iter()
            .find(|(fragment, _)| query.sql.contains(fragment.as_str()))
        {
            return Ok(rows.clone());
        }

        Ok(RowSet {
            affected_rows,
            ..Default::default()
        })
    }

    async fn reflect_table(&self, table: &TableRef) -> DriverResult<TableDefinition> {
        let inner = self.inner.lock().await;
        Ok(inner.find(table)?.definition.clone())
    }

    async fn table_exists(&self, table: &TableRef) -> DriverResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.tables.contains_key(table))
    }

    async fn drop_table(&self, table: &TableRef) -> DriverResult<()> {
        let mut inner = self.inner.lock().await;

        let name = table.to_string();
        if let Some((_, error)) = inner
            .drop_failures
            .iter()
            .find(|(fragment, _)| name.contains(fragment.as_str()))
        {
            return Err(error.clone());
        }

        info!(%table, "dropping table from memory");
        inner.tables.remove(table);
        inner.dropped.push(table.clone());

        Ok(())
    }

    async fn create_table(&self, definition: &TableDefinition) -> DriverResult<()> {
        let mut inner = self.inner.lock().await;

        let table = definition.table_ref();
        if inner.tables.contains_key(&table) {
            return Err(driver_error!(
                ErrorKind::ObjectAlreadyExists,
                "Table already exists",
                format!("Already Exists: {table}")
            ));
        }

        inner.tables.insert(
            table.clone(),
            MemoryTable {
                definition: definition.clone(),
                stats: TableStats::default(),
                view: false,
            },
        );
        inner.created.push(table);

        Ok(())
    }

    async fn table_stats(&self, table: &TableRef) -> DriverResult<TableStats> {
        let inner = self.inner.lock().await;
        Ok(inner.find(table)?.stats)
    }
}

//! Value types shared by the query builders, the execution client and the import engine.

mod data_type;
mod definition;
mod filter;
mod import;
mod query;

pub use data_type::{BigQueryType, DataType};
pub use definition::{ColumnDefinition, TableDefinition, TableRef};
pub use filter::{Operator, Order, OrderBy, TableFilters, WhereFilter};
pub use import::{
    ColumnMapping, CreateMode, DedupType, ImportOptions, ImportResponse, ImportTableCommand,
    ImportType, PhaseTimer, SourceMapping, TimestampMode,
};
pub use query::{BoundQuery, ParameterValue, QueryParameter, RowSet, TableStats};

/// Reserved column holding the time a row was last written.
pub const TIMESTAMP_COLUMN: &str = "_timestamp";

//! Table commands that read or delete rows in place: preview, export and row deletion.

mod delete;
mod export;
mod preview;

pub use delete::{DeleteTableRowsCommand, DeleteTableRowsResponse, delete_table_rows};
pub use export::{
    ExportCompression, ExportTableCommand, ExportTableResponse, ExportTarget, export_table,
};
pub use preview::{
    DEFAULT_PREVIEW_LIMIT, MAX_PREVIEW_LIMIT, PreviewCell, PreviewTableCommand,
    PreviewTableResponse, preview_table,
};

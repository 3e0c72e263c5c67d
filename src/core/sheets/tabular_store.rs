use super::sheets_models::TableSnapshot;
use crate::core::parsing::Record;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Table `{0}` not found")]
    TableNotFound(String),

    #[error("Write to `{table}` failed, try again later ({status}): {body}")]
    TransientWrite {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Spreadsheet `{0}` could not be opened or created")]
    SpreadsheetNotFound(String),

    #[error("Google rejected the credentials: {0}")]
    Auth(String),

    #[error("Google API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Google API request failed: {0}")]
    Transport(String),
}

/// A spreadsheet holding named tables, each with a header row.
#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>, SheetsError>;

    /// Column names from the first row of `table`.
    async fn get_header(&self, table: &str) -> Result<Vec<String>, SheetsError>;

    /// Appends `record` below the last row, values in `header` order.
    async fn append_row(
        &self,
        table: &str,
        header: &[String],
        record: &Record,
    ) -> Result<(), SheetsError>;

    /// Replaces the whole content of `table` (created when absent) with
    /// `header` followed by `rows`.
    async fn bulk_import(
        &self,
        table: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), SheetsError>;

    async fn export_table(&self, table: &str) -> Result<TableSnapshot, SheetsError>;
}

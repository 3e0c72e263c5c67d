pub mod sheets_models;
pub mod tabular_store;

pub use sheets_models::{row_from_record, TableSnapshot};
pub use tabular_store::{SheetsError, TabularStore};

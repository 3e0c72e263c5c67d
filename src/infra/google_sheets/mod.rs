pub mod google_sheets_client;
pub mod service_account;

pub use google_sheets_client::{GoogleEndpoints, GoogleSheetsClient};
pub use service_account::{ServiceAccountAuth, ServiceAccountCredentials};

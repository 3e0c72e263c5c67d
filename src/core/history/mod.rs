pub mod history_models;
pub mod history_service;

pub use history_models::{LoggedMessage, Sender};
pub use history_service::{HistoryError, HistoryService, HistoryStore};

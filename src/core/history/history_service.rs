// Ingest history: who has sent the bot something, and what they wrote.
// The pipeline only writes here; `/history` reads the per-user count.

use super::history_models::{LoggedMessage, Sender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Stores `sender` unless a user with the same id is already known.
    /// Returns `true` when a new row was written.
    async fn record_user(&self, sender: &Sender, seen_at: DateTime<Utc>)
        -> Result<bool, HistoryError>;

    async fn log_message(&self, message: &LoggedMessage) -> Result<(), HistoryError>;

    async fn message_count(&self, user_id: u64) -> Result<u64, HistoryError>;
}

pub struct HistoryService<S: HistoryStore> {
    store: S,
}

impl<S: HistoryStore> HistoryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records the sender (first sighting only) and logs the message text.
    /// Messages without text only register the sender.
    pub async fn record(&self, sender: &Sender, text: Option<&str>) -> Result<(), HistoryError> {
        let now = Utc::now();
        if self.store.record_user(sender, now).await? {
            tracing::info!(user_id = sender.user_id, username = %sender.username, "New sender");
        }

        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            self.store
                .log_message(&LoggedMessage {
                    user_id: sender.user_id,
                    text: text.to_string(),
                    logged_at: now,
                })
                .await?;
        }
        Ok(())
    }

    pub async fn message_count(&self, user_id: u64) -> Result<u64, HistoryError> {
        self.store.message_count(user_id).await
    }
}

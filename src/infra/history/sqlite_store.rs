use crate::core::history::{HistoryError, HistoryStore, LoggedMessage, Sender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

pub struct SqliteHistoryStore {
    pool: Pool<Sqlite>,
}

impl SqliteHistoryStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // sqlx will not create a missing database file on its own.
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                display_name TEXT,
                first_message_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                message_text TEXT NOT NULL,
                logged_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_user ON messages (user_id);")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn storage_error(e: sqlx::Error) -> HistoryError {
    HistoryError::Storage(e.to_string())
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn record_user(
        &self,
        sender: &Sender,
        seen_at: DateTime<Utc>,
    ) -> Result<bool, HistoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (user_id, username, display_name, first_message_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(sender.user_id as i64)
        .bind(&sender.username)
        .bind(&sender.display_name)
        .bind(seen_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn log_message(&self, message: &LoggedMessage) -> Result<(), HistoryError> {
        sqlx::query("INSERT INTO messages (user_id, message_text, logged_at) VALUES (?, ?, ?)")
            .bind(message.user_id as i64)
            .bind(&message.text)
            .bind(message.logged_at)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn message_count(&self, user_id: u64) -> Result<u64, HistoryError> {
        let row = sqlx::query("SELECT COUNT(*) FROM messages WHERE user_id = ?")
            .bind(user_id as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.get::<i64, _>(0) as u64)
    }
}

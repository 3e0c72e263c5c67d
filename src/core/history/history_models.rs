use chrono::{DateTime, Utc};

/// Who sent an ingested message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: u64,
    pub username: String,
    pub display_name: Option<String>,
}

/// One logged message text.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedMessage {
    pub user_id: u64,
    pub text: String,
    pub logged_at: DateTime<Utc>,
}

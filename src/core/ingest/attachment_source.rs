use super::ingest_models::Attachment;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Download of `{filename}` failed with status {status}")]
    Status { filename: String, status: u16 },

    #[error("`{filename}` is larger than {limit} bytes")]
    TooLarge { filename: String, limit: u64 },

    #[error("Download failed: {0}")]
    Transport(String),
}

/// Where attachment bytes come from (the chat platform's CDN).
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, AttachmentError>;
}

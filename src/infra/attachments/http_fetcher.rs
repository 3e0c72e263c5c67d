use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::core::ingest::{Attachment, AttachmentError, AttachmentSource};

/// Downloads attachments from the chat platform's CDN. Bodies are read in
/// chunks and the download stops as soon as it passes `max_bytes`, whatever
/// size the platform declared.
pub struct HttpAttachmentFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpAttachmentFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, AttachmentError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| AttachmentError::Transport(e.to_string()))?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl AttachmentSource for HttpAttachmentFetcher {
    async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, AttachmentError> {
        let mut response = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| AttachmentError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AttachmentError::Status {
                filename: attachment.filename.clone(),
                status: response.status().as_u16(),
            });
        }

        let too_large = || AttachmentError::TooLarge {
            filename: attachment.filename.clone(),
            limit: self.max_bytes,
        };
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AttachmentError::Transport(e.to_string()))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                tracing::warn!(filename = %attachment.filename, limit = self.max_bytes, "Attachment download cut off");
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }
        tracing::debug!(filename = %attachment.filename, bytes = bytes.len(), "Attachment downloaded");
        Ok(bytes)
    }
}

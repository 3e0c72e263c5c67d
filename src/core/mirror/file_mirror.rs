use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Folder `{name}` was not created ({status}): {body}")]
    FolderRejected {
        name: String,
        status: u16,
        body: String,
    },

    #[error("Upload was rejected ({status}): {body}")]
    UploadRejected { status: u16, body: String },

    #[error("File storage request failed: {0}")]
    Transport(String),
}

/// The storage service queued the upload; it fetches the file on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadAccepted {
    pub destination: String,
}

/// Cloud file storage that can pull a file from a public URL.
#[async_trait]
pub trait FileMirror: Send + Sync {
    /// Creates a top-level folder and returns the name it was created under.
    /// An existing folder with that name counts as success.
    async fn create_folder(&self, name: &str) -> Result<String, MirrorError>;

    /// Asks the storage to fetch `source_url` into `destination`
    /// (`/<folder>/<filename>`).
    async fn upload_from_url(
        &self,
        destination: &str,
        source_url: &str,
    ) -> Result<UploadAccepted, MirrorError>;
}

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::core::mirror::{sanitize_folder_name, FileMirror, MirrorError, UploadAccepted};

pub const DEFAULT_BASE_URL: &str = "https://cloud-api.yandex.net/v1/disk";

/// Yandex Disk REST client. Uploads are "upload by URL": Yandex downloads the
/// file itself, so nothing passes through the bot.
pub struct YandexDiskClient {
    client: Client,
    base_url: String,
}

impl YandexDiskClient {
    pub fn new(token: &str, base_url: &str, timeout: Duration) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("OAuth {token}"))
                .map_err(|e| MirrorError::Transport(format!("invalid Yandex token: {e}")))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| MirrorError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FileMirror for YandexDiskClient {
    async fn create_folder(&self, name: &str) -> Result<String, MirrorError> {
        let name = sanitize_folder_name(name);
        let path = format!("/{name}");

        let response = self
            .client
            .put(format!("{}/resources", self.base_url))
            .query(&[("path", path.as_str())])
            .send()
            .await
            .map_err(|e| MirrorError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::CREATED => {
                tracing::info!(folder = %name, "Folder created");
                Ok(name)
            }
            StatusCode::CONFLICT => {
                tracing::debug!(folder = %name, "Folder already exists");
                Ok(name)
            }
            status => Err(MirrorError::FolderRejected {
                name,
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn upload_from_url(
        &self,
        destination: &str,
        source_url: &str,
    ) -> Result<UploadAccepted, MirrorError> {
        let response = self
            .client
            .post(format!("{}/resources/upload", self.base_url))
            .query(&[("path", destination), ("url", source_url)])
            .send()
            .await
            .map_err(|e| MirrorError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(UploadAccepted {
                destination: destination.to_string(),
            });
        }

        Err(MirrorError::UploadRejected {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

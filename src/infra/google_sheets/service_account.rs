// =============================================================================
// GOOGLE SERVICE ACCOUNT AUTHENTICATION
// =============================================================================
//
// Exchanges a signed JWT for an OAuth2 access token (the "two-legged" service
// account flow) and caches the token until shortly before it expires.
//
// **Setup:**
// 1. Create a service account in Google Cloud Console and a JSON key for it
// 2. Enable the Google Sheets API and the Google Drive API for the project
// 3. Point the bot at the key with one of:
//    - `GOOGLE_SERVICE_ACCOUNT_KEY`  - path to the JSON key file
//    - `GOOGLE_SERVICE_ACCOUNT_JSON` - the JSON content itself
//    - `CLIENT_EMAIL` + `PRIVATE_KEY` (+ optional `TOKEN_URI`)
//
// The spreadsheet is created by the service account itself, so it starts out
// visible only to that account. Configure `sheets.share_emails` to get access.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::core::sheets::SheetsError;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens are refreshed this long before Google says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The parts of a service account key the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountCredentials {
    pub fn from_json(json: &str) -> Result<Self, SheetsError> {
        serde_json::from_str(json)
            .map_err(|e| SheetsError::Auth(format!("invalid service account key: {e}")))
    }

    /// Credentials from separate values. Keys pasted into a single-line
    /// environment variable carry literal `\n` sequences, which are restored.
    pub fn from_parts(client_email: String, private_key: &str, token_uri: Option<String>) -> Self {
        Self {
            client_email,
            private_key: private_key.replace("\\n", "\n"),
            token_uri: token_uri.unwrap_or_else(default_token_uri),
        }
    }
}

#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Anything that can hand out a bearer token for Google APIs.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, SheetsError>;
}

pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    scopes: Vec<String>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    pub fn new(credentials: ServiceAccountCredentials, scopes: &[&str], client: Client) -> Self {
        Self {
            credentials,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Read-write access to spreadsheets, plus Drive for search and sharing.
    pub fn for_sheets(credentials: ServiceAccountCredentials, client: Client) -> Self {
        Self::new(credentials, &[SHEETS_SCOPE, DRIVE_SCOPE], client)
    }

    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    async fn fetch_new_token(&self) -> Result<CachedToken, SheetsError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SheetsError::Auth(e.to_string()))?
            .as_secs();

        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: self.scopes.join(" "),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|e| SheetsError::Auth(format!("invalid private key: {e}")))?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| SheetsError::Auth(format!("could not sign token request: {e}")))?;

        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await
            .map_err(|e| SheetsError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!(
                "token exchange failed ({status}): {text}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Auth(format!("unexpected token response: {e}")))?;

        tracing::debug!(expires_in = token.expires_in, "Fetched Google access token");
        Ok(CachedToken {
            token: token.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, SheetsError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + REFRESH_MARGIN {
                    return Ok(token.token.clone());
                }
            }
        }

        let fresh = self.fetch_new_token().await?;
        let token = fresh.token.clone();
        *self.cached_token.write().await = Some(fresh);
        Ok(token)
    }
}

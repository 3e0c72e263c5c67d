// =============================================================================
// SETTINGS
// =============================================================================
//
// Two sources:
// - secrets come from the environment (a `.env` file is loaded by `main`)
// - everything else comes from a JSON5 settings file (`BOT_CONFIG`, default
//   `config/bot.json5`). The file may contain comments and trailing commas.
//   Missing keys, or a missing file, fall back to the defaults below.
//
// Required environment variables:
// - `DISCORD_TOKEN`
// - `INFERENCE_API_KEY` (or `FIREWORKS_API_KEY`)
// - `YANDEX_API_TOKEN`
// - one of `GOOGLE_SERVICE_ACCOUNT_KEY`, `GOOGLE_SERVICE_ACCOUNT_JSON`,
//   or `CLIENT_EMAIL` + `PRIVATE_KEY` (+ optional `TOKEN_URI`)
//
// Anything missing or invalid here stops the bot before it connects.

use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::ai::{AiConfig, PromptTemplate};
use crate::core::extraction::DEFAULT_ALLOWED_EXTENSIONS;
use crate::infra::ai::FIREWORKS_BASE_URL;
use crate::infra::google_sheets::ServiceAccountCredentials;
use crate::infra::yandex_disk::DEFAULT_BASE_URL as YANDEX_BASE_URL;

pub const DEFAULT_CONFIG_PATH: &str = "config/bot.json5";

const RU_TEMPLATE: &str = "Ты помощник, который извлекает данные для таблицы.\n\
Текст сообщения: {text_content}\n\
Содержимое файла: {file_content}\n\
Колонки таблицы: {column_names}\n\
Верни только JSON в блоке ```: объект с ключами из списка колонок, \
или список таких объектов, если записей несколько. \
Если значение неизвестно, оставь пустую строку.";

const EN_TEMPLATE: &str = "You extract data for a spreadsheet.\n\
Message text: {text_content}\n\
File content: {file_content}\n\
Table columns: {column_names}\n\
Reply with JSON only, inside a ``` block: one object keyed by the column \
names, or a list of such objects when there are several entries. \
Use an empty string for unknown values.";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Environment variable {0} is not set")]
    MissingVar(String),

    #[error("Could not read {path}: {message}")]
    ReadFile { path: PathBuf, message: String },

    #[error("Invalid settings file {path}: {message}")]
    InvalidFile { path: PathBuf, message: String },

    #[error("No prompt template configured for locale `{0}`")]
    MissingTemplate(String),

    #[error("Unknown timezone `{0}`")]
    InvalidTimezone(String),

    #[error("Invalid Google credentials: {0}")]
    InvalidCredentials(String),
}

// ---------------------------------------------------------------------------
// File settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub base_url: String,
    pub model: String,
    pub locale: String,
    pub prompt_templates: BTreeMap<String, String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        let mut prompt_templates = BTreeMap::new();
        prompt_templates.insert("ru".to_string(), RU_TEMPLATE.to_string());
        prompt_templates.insert("en".to_string(), EN_TEMPLATE.to_string());

        let decoding = AiConfig::structured_output("");
        Self {
            base_url: FIREWORKS_BASE_URL.to_string(),
            model: "accounts/fireworks/models/llama-v3p1-70b-instruct".to_string(),
            locale: "ru".to_string(),
            prompt_templates,
            max_tokens: decoding.max_tokens.unwrap_or(500),
            temperature: decoding.temperature,
            top_p: decoding.top_p.unwrap_or(1.0),
            top_k: decoding.top_k.unwrap_or(40),
            presence_penalty: decoding.presence_penalty.unwrap_or(0.0),
            frequency_penalty: decoding.frequency_penalty.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsSettings {
    pub spreadsheet_name: String,
    pub worksheet: String,
    pub share_emails: Vec<String>,
}

impl Default for SheetsSettings {
    fn default() -> Self {
        Self {
            spreadsheet_name: "Ingest".to_string(),
            worksheet: "Sheet1".to_string(),
            share_emails: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub max_upload_mb: u64,
    pub allowed_extensions: Vec<String>,
    pub folder_name_fields: Vec<String>,
    pub timezone: String,
    /// Guild channels whose messages are ingested. DMs always are.
    pub channel_ids: Vec<u64>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_upload_mb: 10,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            folder_name_fields: vec!["Регион".to_string(), "Кадастровый номер".to_string()],
            timezone: "Europe/Moscow".to_string(),
            channel_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub yandex_base_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            yandex_base_url: YANDEX_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub inference: InferenceSettings,
    pub sheets: SheetsSettings,
    pub ingest: IngestSettings,
    pub storage: StorageSettings,
    pub http_timeout_secs: u64,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            inference: InferenceSettings::default(),
            sheets: SheetsSettings::default(),
            ingest: IngestSettings::default(),
            storage: StorageSettings::default(),
            http_timeout_secs: 60,
        }
    }
}

impl FileSettings {
    /// Reads the settings file; a missing file means all defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(SettingsError::ReadFile {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        json5::from_str(&content).map_err(|e| SettingsError::InvalidFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Where the Google service account key comes from.
#[derive(Debug, Clone)]
pub enum GoogleCredentialSource {
    KeyFile(PathBuf),
    Json(String),
    Split {
        client_email: String,
        private_key: String,
        token_uri: Option<String>,
    },
}

impl GoogleCredentialSource {
    pub async fn credentials(&self) -> Result<ServiceAccountCredentials, SettingsError> {
        let invalid = |e: crate::core::sheets::SheetsError| {
            SettingsError::InvalidCredentials(e.to_string())
        };
        match self {
            GoogleCredentialSource::KeyFile(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SettingsError::ReadFile {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                ServiceAccountCredentials::from_json(&json).map_err(invalid)
            }
            GoogleCredentialSource::Json(json) => {
                ServiceAccountCredentials::from_json(json).map_err(invalid)
            }
            GoogleCredentialSource::Split {
                client_email,
                private_key,
                token_uri,
            } => Ok(ServiceAccountCredentials::from_parts(
                client_email.clone(),
                private_key,
                token_uri.clone(),
            )),
        }
    }
}

#[derive(Clone)]
pub struct Secrets {
    pub discord_token: String,
    pub inference_api_key: String,
    pub yandex_token: String,
    pub google: GoogleCredentialSource,
}

// Keep tokens out of debug logs.
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &str| var(name).ok_or_else(|| SettingsError::MissingVar(name.to_string()));

        let inference_api_key = var("INFERENCE_API_KEY")
            .or_else(|| var("FIREWORKS_API_KEY"))
            .ok_or_else(|| SettingsError::MissingVar("INFERENCE_API_KEY".to_string()))?;

        let google = if let Some(path) = var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            GoogleCredentialSource::KeyFile(PathBuf::from(path))
        } else if let Some(json) = var("GOOGLE_SERVICE_ACCOUNT_JSON") {
            GoogleCredentialSource::Json(json)
        } else {
            GoogleCredentialSource::Split {
                client_email: require("CLIENT_EMAIL")?,
                private_key: require("PRIVATE_KEY")?,
                token_uri: var("TOKEN_URI"),
            }
        };

        Ok(Self {
            discord_token: require("DISCORD_TOKEN")?,
            inference_api_key,
            yandex_token: require("YANDEX_API_TOKEN")?,
            google,
        })
    }
}

// ---------------------------------------------------------------------------
// Combined
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    pub file: FileSettings,
    pub secrets: Secrets,
    pub prompt_template: PromptTemplate,
    pub timezone: Tz,
}

impl Settings {
    /// Loads secrets from the process environment and the settings file
    /// named by `BOT_CONFIG`.
    pub fn from_env() -> Result<Self, SettingsError> {
        let path = std::env::var("BOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(|name| std::env::var(name).ok(), Path::new(&path))
    }

    pub fn load<F>(lookup: F, config_path: &Path) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secrets = Secrets::from_lookup(lookup)?;
        let file = FileSettings::load(config_path)?;

        let locale = &file.inference.locale;
        let prompt_template = file
            .inference
            .prompt_templates
            .get(locale)
            .map(PromptTemplate::new)
            .ok_or_else(|| SettingsError::MissingTemplate(locale.clone()))?;

        let timezone: Tz = file
            .ingest
            .timezone
            .parse()
            .map_err(|_| SettingsError::InvalidTimezone(file.ingest.timezone.clone()))?;

        Ok(Self {
            file,
            secrets,
            prompt_template,
            timezone,
        })
    }

    pub fn ai_config(&self) -> AiConfig {
        let inference = &self.file.inference;
        AiConfig {
            model: inference.model.clone(),
            temperature: inference.temperature,
            max_tokens: Some(inference.max_tokens),
            top_p: Some(inference.top_p),
            top_k: Some(inference.top_k),
            presence_penalty: Some(inference.presence_penalty),
            frequency_penalty: Some(inference.frequency_penalty),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.file.http_timeout_secs.max(1))
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.file.ingest.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn history_database(&self) -> PathBuf {
        self.file.storage.data_dir.join("history.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DISCORD_TOKEN", "discord"),
            ("FIREWORKS_API_KEY", "fw"),
            ("YANDEX_API_TOKEN", "yandex"),
            ("GOOGLE_SERVICE_ACCOUNT_JSON", "{}"),
        ]
    }

    fn missing_file() -> PathBuf {
        PathBuf::from("/definitely/not/here/bot.json5")
    }

    #[test]
    fn defaults_apply_without_a_file() {
        let settings = Settings::load(env(&full_env()), &missing_file()).unwrap();

        assert_eq!(settings.secrets.inference_api_key, "fw");
        assert_eq!(settings.max_upload_bytes(), 10 * 1024 * 1024);
        assert_eq!(settings.timezone, chrono_tz::Europe::Moscow);
        assert_eq!(settings.http_timeout(), Duration::from_secs(60));
        assert_eq!(settings.ai_config().max_tokens, Some(500));
        assert!(settings.prompt_template.as_str().contains("{column_names}"));
        assert!(matches!(settings.secrets.google, GoogleCredentialSource::Json(_)));
    }

    #[test]
    fn missing_discord_token_is_fatal() {
        let vars: Vec<_> = full_env()
            .into_iter()
            .filter(|(k, _)| *k != "DISCORD_TOKEN")
            .collect();
        let err = Settings::load(env(&vars), &missing_file()).unwrap_err();
        assert!(matches!(err, SettingsError::MissingVar(v) if v == "DISCORD_TOKEN"));
    }

    #[test]
    fn split_google_credentials_need_email_and_key() {
        let vars = vec![
            ("DISCORD_TOKEN", "discord"),
            ("INFERENCE_API_KEY", "key"),
            ("YANDEX_API_TOKEN", "yandex"),
            ("CLIENT_EMAIL", "bot@project.iam.gserviceaccount.com"),
        ];
        let err = Settings::load(env(&vars), &missing_file()).unwrap_err();
        assert!(matches!(err, SettingsError::MissingVar(v) if v == "PRIVATE_KEY"));
    }

    #[test]
    fn file_overrides_defaults_and_allows_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                // English prompt, land registry sheet
                inference: {{ locale: "en", top_k: 20 }},
                sheets: {{ spreadsheet_name: "Land", worksheet: "Plots", share_emails: ["a@example.com"] }},
                ingest: {{ max_upload_mb: 2, timezone: "Asia/Yekaterinburg", channel_ids: [123], }},
                http_timeout_secs: 15,
            }}"#
        )
        .unwrap();

        let settings = Settings::load(env(&full_env()), file.path()).unwrap();
        assert!(settings.prompt_template.as_str().starts_with("You extract"));
        assert_eq!(settings.ai_config().top_k, Some(20));
        assert_eq!(settings.ai_config().temperature, 0.5);
        assert_eq!(settings.file.sheets.worksheet, "Plots");
        assert_eq!(settings.file.ingest.channel_ids, vec![123]);
        assert_eq!(settings.max_upload_bytes(), 2 * 1024 * 1024);
        assert_eq!(settings.timezone, chrono_tz::Asia::Yekaterinburg);
        assert_eq!(settings.http_timeout(), Duration::from_secs(15));
        // Untouched sections keep their defaults.
        assert_eq!(settings.file.ingest.allowed_extensions.len(), 4);
    }

    #[test]
    fn absurd_upload_limit_saturates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ ingest: {{ max_upload_mb: 100000000000000 }} }}").unwrap();
        let settings = Settings::load(env(&full_env()), file.path()).unwrap();
        assert_eq!(settings.max_upload_bytes(), u64::MAX);
    }

    #[test]
    fn unknown_locale_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "inference": {{ "locale": "de" }} }}"#).unwrap();
        let err = Settings::load(env(&full_env()), file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::MissingTemplate(l) if l == "de"));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "ingest": {{ "timezone": "Mars/Olympus" }} }}"#).unwrap();
        let err = Settings::load(env(&full_env()), file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidTimezone(_)));
    }

    #[test]
    fn broken_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Settings::load(env(&full_env()), file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidFile { .. }));
    }

    #[tokio::test]
    async fn split_source_builds_credentials() {
        let source = GoogleCredentialSource::Split {
            client_email: "bot@project.iam.gserviceaccount.com".to_string(),
            private_key: "line1\\nline2".to_string(),
            token_uri: None,
        };
        let credentials = source.credentials().await.unwrap();
        assert_eq!(credentials.private_key, "line1\nline2");
    }
}

use crate::core::parsing::Record;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;

const FALLBACK_FOLDER: &str = "upload";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";

fn separators() -> Option<&'static Regex> {
    static SEPARATORS: OnceLock<Option<Regex>> = OnceLock::new();
    SEPARATORS
        .get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").ok())
        .as_ref()
}

/// Collapses every run of characters that are not letters or digits into one
/// hyphen and trims hyphens from both ends. Never returns an empty name.
pub fn sanitize_folder_name(name: &str) -> String {
    let replaced = match separators() {
        Some(re) => re.replace_all(name, "-").into_owned(),
        None => name.to_string(),
    };
    let trimmed = replaced.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_FOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Picks the folder an upload goes into.
#[derive(Debug, Clone)]
pub struct FolderNaming {
    fields: Vec<String>,
    timezone: Tz,
}

impl FolderNaming {
    pub fn new(fields: Vec<String>, timezone: Tz) -> Self {
        Self { fields, timezone }
    }

    /// The naming fields of the first record concatenated, when every one of
    /// them is present and non-empty. Otherwise the local time of `now`.
    pub fn folder_for(&self, records: &[Record], now: DateTime<Utc>) -> String {
        records
            .first()
            .and_then(|record| self.from_fields(record))
            .unwrap_or_else(|| {
                now.with_timezone(&self.timezone)
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
            })
    }

    fn from_fields(&self, record: &Record) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        let mut name = String::new();
        for field in &self.fields {
            let value = record.cell(field);
            if value.trim().is_empty() {
                return None;
            }
            name.push_str(&value);
        }
        Some(name)
    }
}

use crate::core::history::Sender;
use crate::core::parsing::{ParseFailure, Record};
use std::fmt;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "heic"];
const PREVIEW_CHARS: usize = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Document,
    Photo,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Text => "text",
            MessageKind::Document => "document",
            MessageKind::Photo => "photo",
        };
        f.write_str(name)
    }
}

/// A file attached to a message, still sitting on the platform's CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: u64,
}

impl Attachment {
    pub fn is_photo(&self) -> bool {
        if let Some(content_type) = &self.content_type {
            return content_type.starts_with("image/");
        }
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub sender: Sender,
    /// Message text, or the caption when a file is attached.
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl IncomingMessage {
    pub fn kind(&self) -> MessageKind {
        match &self.attachment {
            None => MessageKind::Text,
            Some(attachment) if attachment.is_photo() => MessageKind::Photo,
            Some(_) => MessageKind::Document,
        }
    }

    /// Trimmed text, `None` when there is nothing but whitespace.
    pub fn text_content(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Something the sender should be told about, in pipeline order.
#[derive(Debug, Clone)]
pub enum IngestNotice {
    ExtractedContent { filename: String, preview: String },
    ExtractionFailed { filename: String, reason: String },
    HeaderUnavailable { table: String, reason: String },
    InferenceFailed { reason: String },
    ParseFailed(ParseFailure),
    Records(Vec<Record>),
    RowsAppended { table: String, count: usize },
    AppendFailed {
        table: String,
        appended: usize,
        reason: String,
    },
    Mirrored { filename: String, folder: String },
    MirrorFailed { filename: String, reason: String },
}

impl IngestNotice {
    pub fn extracted(filename: &str, content: &str) -> Self {
        let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
        if content.chars().nth(PREVIEW_CHARS).is_some() {
            preview.push('…');
        }
        IngestNotice::ExtractedContent {
            filename: filename.to_string(),
            preview,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            IngestNotice::ExtractionFailed { .. }
                | IngestNotice::HeaderUnavailable { .. }
                | IngestNotice::InferenceFailed { .. }
                | IngestNotice::ParseFailed(_)
                | IngestNotice::AppendFailed { .. }
                | IngestNotice::MirrorFailed { .. }
        )
    }
}

impl fmt::Display for IngestNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestNotice::ExtractedContent { filename, preview } => {
                write!(f, "Content of `{filename}`:\n{preview}")
            }
            IngestNotice::ExtractionFailed { filename, reason } => {
                write!(f, "Could not read `{filename}`: {reason}")
            }
            IngestNotice::HeaderUnavailable { table, reason } => {
                write!(f, "Could not read the columns of `{table}`: {reason}")
            }
            IngestNotice::InferenceFailed { reason } => {
                write!(f, "The model could not process this message: {reason}")
            }
            IngestNotice::ParseFailed(failure) => {
                write!(
                    f,
                    "The model answer is not a table row ({}):\n{}",
                    failure.reason, failure.original
                )
            }
            IngestNotice::Records(records) => {
                let lines: Vec<String> = records.iter().map(Record::to_string).collect();
                if lines.is_empty() {
                    f.write_str("The model found no rows in this message.")
                } else {
                    f.write_str(&lines.join("\n"))
                }
            }
            IngestNotice::RowsAppended { table, count } => {
                write!(f, "Added {count} row(s) to `{table}`.")
            }
            IngestNotice::AppendFailed {
                table,
                appended,
                reason,
            } => write!(
                f,
                "Writing to `{table}` stopped after {appended} row(s): {reason}"
            ),
            IngestNotice::Mirrored { filename, folder } => {
                write!(f, "File `{filename}` uploaded to folder `{folder}`.")
            }
            IngestNotice::MirrorFailed { filename, reason } => {
                write!(f, "Upload of `{filename}` failed: {reason}")
            }
        }
    }
}

/// Outcome of one message.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub kind: MessageKind,
    pub notices: Vec<IngestNotice>,
    pub records: Vec<Record>,
    pub rows_appended: usize,
}

impl IngestReport {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            notices: Vec::new(),
            records: Vec::new(),
            rows_appended: 0,
        }
    }

    pub fn push(&mut self, notice: IngestNotice) {
        self.notices.push(notice);
    }

    pub fn has_failures(&self) -> bool {
        self.notices.iter().any(IngestNotice::is_failure)
    }
}

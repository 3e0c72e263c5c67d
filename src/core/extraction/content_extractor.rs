// =============================================================================
// CONTENT EXTRACTOR
// =============================================================================
//
// Turns the bytes of an uploaded file into plain text for the inference
// prompt. Extraction is a pure function of (bytes, filename, size limit):
// no I/O and no shared state, so the same upload always yields the same text.
//
// The handler is picked from the filename extension, never from the declared
// MIME type. Discord reports `application/octet-stream` for plenty of perfectly
// normal documents.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use super::document_readers;

/// Extensions with a built-in handler.
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 4] = ["txt", "doc", "docx", "pdf"];

/// What can go wrong while turning an upload into text.
///
/// `FileTooLarge` and `UnsupportedFileType` are validation failures (nothing
/// was read); the rest are failures of a specific reader.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File is too large ({size} bytes, limit is {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Text file is not valid UTF-8: {0}")]
    TextDecoding(String),

    #[error("Could not read {kind} document: {message}")]
    DocumentRead { kind: DocumentKind, message: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// The family of reader responsible for an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Word,
    Pdf,
}

impl DocumentKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "txt" => Some(DocumentKind::PlainText),
            "doc" | "docx" => Some(DocumentKind::Word),
            "pdf" => Some(DocumentKind::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::PlainText => "text",
            DocumentKind::Word => "Word",
            DocumentKind::Pdf => "PDF",
        };
        f.write_str(name)
    }
}

/// Extractor configured with a size limit and the set of accepted extensions.
///
/// An extension is handled only when it is both allowed by configuration and
/// known to [`DocumentKind::from_extension`].
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    max_size_bytes: u64,
    allowed_extensions: BTreeSet<String>,
}

impl ContentExtractor {
    pub fn new<I, S>(max_size_bytes: u64, allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            max_size_bytes,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Extractor with every built-in handler and a limit given in megabytes.
    pub fn with_max_size_mb(max_size_mb: u64) -> Self {
        Self::new(max_size_mb * 1024 * 1024, DEFAULT_ALLOWED_EXTENSIONS)
    }

    /// Rejects uploads above the limit. Callers that know the declared size
    /// up front can use this to skip the download entirely.
    pub fn check_size(&self, size: u64) -> Result<(), ExtractionError> {
        if size > self.max_size_bytes {
            return Err(ExtractionError::FileTooLarge {
                size,
                limit: self.max_size_bytes,
            });
        }
        Ok(())
    }

    /// Resolves the reader for a filename, or explains why there is none.
    pub fn handler_for(&self, filename: &str) -> Result<DocumentKind, ExtractionError> {
        let extension = file_extension(filename).ok_or_else(|| {
            ExtractionError::UnsupportedFileType("the file has no extension".to_string())
        })?;

        if !self.allowed_extensions.contains(&extension) {
            return Err(ExtractionError::UnsupportedFileType(extension));
        }

        DocumentKind::from_extension(&extension)
            .ok_or(ExtractionError::UnsupportedFileType(extension))
    }

    /// Extracts plain text from `content`, dispatching on the extension of
    /// `declared_filename`.
    pub fn extract(&self, content: &[u8], declared_filename: &str) -> Result<String, ExtractionError> {
        self.check_size(content.len() as u64)?;

        match self.handler_for(declared_filename)? {
            DocumentKind::PlainText => decode_text(content),
            DocumentKind::Word => guarded(|| document_readers::read_word(content)),
            DocumentKind::Pdf => guarded(|| document_readers::read_pdf(content)),
        }
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::with_max_size_mb(10)
    }
}

/// Extracts with the built-in handler set and an explicit byte limit.
pub fn extract(
    content: &[u8],
    declared_filename: &str,
    max_size_bytes: u64,
) -> Result<String, ExtractionError> {
    ContentExtractor::new(max_size_bytes, DEFAULT_ALLOWED_EXTENSIONS)
        .extract(content, declared_filename)
}

fn file_extension(filename: &str) -> Option<String> {
    let (_, extension) = filename.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(extension.to_lowercase())
}

fn decode_text(content: &[u8]) -> Result<String, ExtractionError> {
    String::from_utf8(content.to_vec())
        .map_err(|e| ExtractionError::TextDecoding(e.utf8_error().to_string()))
}

/// Runs a third-party reader, turning a panic inside it into an error.
/// The PDF stack in particular is known to panic on hostile input.
fn guarded<F>(reader: F) -> Result<String, ExtractionError>
where
    F: FnOnce() -> Result<String, ExtractionError>,
{
    match panic::catch_unwind(AssertUnwindSafe(reader)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "reader panicked".to_string());
            Err(ExtractionError::Unexpected(message))
        }
    }
}

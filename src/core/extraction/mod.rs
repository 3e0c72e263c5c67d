pub mod content_extractor;
mod document_readers;

pub use content_extractor::{extract, ContentExtractor, DEFAULT_ALLOWED_EXTENSIONS};

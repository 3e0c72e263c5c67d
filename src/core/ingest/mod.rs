pub mod attachment_source;
pub mod ingest_models;
pub mod ingest_service;

pub use attachment_source::{AttachmentError, AttachmentSource};
pub use ingest_models::{Attachment, IncomingMessage, MessageKind};
pub use ingest_service::{IngestService, TableDescription};

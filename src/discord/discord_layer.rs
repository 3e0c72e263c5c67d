// Discord layer - commands and event handlers.
// Thin adapters only: Discord types in, core types out.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "ingest/message_ingest.rs"]
pub mod ingest;

use crate::core::history::HistoryService;
use crate::core::ingest::IngestService;
use crate::infra::ai::CompletionClient;
use crate::infra::attachments::HttpAttachmentFetcher;
use crate::infra::google_sheets::{GoogleSheetsClient, ServiceAccountAuth};
use crate::infra::history::SqliteHistoryStore;
use crate::infra::yandex_disk::YandexDiskClient;
use std::collections::HashSet;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub type SheetIngestService = IngestService<
    GoogleSheetsClient<ServiceAccountAuth>,
    YandexDiskClient,
    CompletionClient,
    HttpAttachmentFetcher,
>;

/// Shared state handed to every command and event.
pub struct Data {
    pub ingest: Arc<SheetIngestService>,
    pub history: Arc<HistoryService<SqliteHistoryStore>>,
    /// Guild channels watched for uploads. DMs are always handled.
    pub ingest_channels: HashSet<u64>,
}

// This is the entry point of the Discord ingest bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (Google Sheets, Yandex Disk,
//   the inference API, SQLite)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::ai::InferenceService;
use crate::core::extraction::ContentExtractor;
use crate::core::history::HistoryService;
use crate::core::ingest::IngestService;
use crate::core::mirror::FolderNaming;
use crate::discord::commands::presence;
use crate::discord::ingest::handle_message;
use crate::discord::{Data, Error};
use crate::infra::ai::CompletionClient;
use crate::infra::attachments::HttpAttachmentFetcher;
use crate::infra::google_sheets::{GoogleEndpoints, GoogleSheetsClient, ServiceAccountAuth};
use crate::infra::history::SqliteHistoryStore;
use crate::infra::settings::Settings;
use crate::infra::yandex_disk::YandexDiskClient;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        if let Err(e) = handle_message(ctx, new_message, data).await {
            tracing::error!(message_id = new_message.id.get(), error = %e, "Message ingest failed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().context("Invalid configuration")?;
    let timeout = settings.http_timeout();

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let http = reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(std::time::Duration::from_secs(10)))
        .build()
        .context("Failed to build HTTP client")?;

    let credentials = settings
        .secrets
        .google
        .credentials()
        .await
        .context("Failed to load Google service account")?;
    let auth = ServiceAccountAuth::for_sheets(credentials, http.clone());
    tracing::info!(account = %auth.client_email(), "Using Google service account");

    let sheets = GoogleSheetsClient::open_or_create(
        http,
        auth,
        GoogleEndpoints::default(),
        &settings.file.sheets.spreadsheet_name,
        &settings.file.sheets.share_emails,
    )
    .await
    .context("Failed to open the spreadsheet")?;
    let spreadsheet_id = sheets.spreadsheet_id().to_string();

    let disk = YandexDiskClient::new(
        &settings.secrets.yandex_token,
        &settings.file.storage.yandex_base_url,
        timeout,
    )
    .context("Failed to create Yandex Disk client")?;

    let completions = CompletionClient::new(
        settings.secrets.inference_api_key.clone(),
        &settings.file.inference.base_url,
        timeout,
    )
    .context("Failed to create inference client")?;
    let inference = InferenceService::new(
        completions,
        settings.prompt_template.clone(),
        settings.ai_config(),
    );

    let fetcher = HttpAttachmentFetcher::new(timeout, settings.max_upload_bytes())
        .context("Failed to create downloader")?;
    let extractor = ContentExtractor::new(
        settings.max_upload_bytes(),
        &settings.file.ingest.allowed_extensions,
    );
    let naming = FolderNaming::new(
        settings.file.ingest.folder_name_fields.clone(),
        settings.timezone,
    );

    let ingest = Arc::new(IngestService::new(
        sheets,
        disk,
        inference,
        fetcher,
        extractor,
        naming,
        settings.file.sheets.worksheet.clone(),
    ));

    match ingest.describe_tables().await {
        Ok(tables) => {
            let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
            tracing::info!(
                spreadsheet = %spreadsheet_id,
                tables = ?names,
                target = %ingest.worksheet(),
                "Spreadsheet ready"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Could not list tables at startup"),
    }

    let history_path = settings.history_database();
    let history_store = SqliteHistoryStore::new(&history_path.to_string_lossy())
        .await
        .context("Failed to initialize history database")?;
    let history = Arc::new(HistoryService::new(history_store));

    let data = Data {
        ingest: Arc::clone(&ingest),
        history,
        ingest_channels: settings.file.ingest.channel_ids.iter().copied().collect(),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::tables::tables(),
                discord::commands::history::history(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                // Global registration can take a while to show up in clients.
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!(user = %ready.user.name, "Commands registered, bot is ready");

                presence::on_ready(ctx, data.ingest.worksheet());
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&settings.secrets.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating Discord client")?;

    client.start().await.context("Discord client stopped")?;
    Ok(())
}

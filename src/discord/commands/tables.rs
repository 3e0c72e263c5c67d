// Table commands.
//
// Same pattern as everywhere in this layer:
// 1. Pull primitive values out of the Discord context
// 2. Call the ingest service
// 3. Format the result

use crate::core::ingest::TableDescription;
use crate::discord::ingest::split_for_discord;
use crate::discord::{Context, Error};

/// Spreadsheet tables the bot writes to.
#[poise::command(slash_command, subcommands("list", "snapshot"), subcommand_required)]
pub async fn tables(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// List every table with its columns.
#[poise::command(slash_command)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer().await?;

    let tables = match ctx.data().ingest.describe_tables().await {
        Ok(tables) => tables,
        Err(e) => {
            tracing::error!(error = %e, "Listing tables failed");
            ctx.say(format!("Could not list tables: {e}")).await?;
            return Ok(());
        }
    };

    if tables.is_empty() {
        ctx.say("No tables found.").await?;
        return Ok(());
    }

    for table in &tables {
        for chunk in split_for_discord(&describe(table)) {
            ctx.say(chunk).await?;
        }
    }
    Ok(())
}

/// Copy one table over another (the destination is cleared first).
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn snapshot(
    ctx: Context<'_>,
    #[description = "Table to copy from"] source: String,
    #[description = "Table to overwrite (created if missing)"] destination: String,
) -> Result<(), Error> {
    let source = source.trim();
    let destination = destination.trim();
    if source.is_empty() || destination.is_empty() || source == destination {
        ctx.say("Source and destination must be two different table names.")
            .await?;
        return Ok(());
    }

    ctx.defer().await?;
    match ctx.data().ingest.snapshot_table(source, destination).await {
        Ok(rows) => {
            ctx.say(format!("Copied {rows} row(s) from `{source}` to `{destination}`."))
                .await?;
        }
        Err(e) => {
            tracing::error!(%source, %destination, error = %e, "Snapshot failed");
            ctx.say(format!("Snapshot failed: {e}")).await?;
        }
    }
    Ok(())
}

fn describe(table: &TableDescription) -> String {
    let mut text = format!("{}:", table.name);
    if table.columns.is_empty() {
        text.push_str("\n (no header row)");
    }
    for column in &table.columns {
        text.push_str("\n -");
        text.push_str(column);
    }
    text
}

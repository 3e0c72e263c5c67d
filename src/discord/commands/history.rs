// History command: how much the caller has sent the bot so far.

use crate::discord::{Context, Error};

/// Show how many messages the bot has logged from you.
#[poise::command(slash_command)]
pub async fn history(ctx: Context<'_>) -> Result<(), Error> {
    let user_id = ctx.author().id.get();

    let reply = match ctx.data().history.message_count(user_id).await {
        Ok(count) => count_text(count),
        Err(e) => {
            tracing::error!(user_id, error = %e, "History lookup failed");
            "Could not read your history right now.".to_string()
        }
    };
    ctx.say(reply).await?;
    Ok(())
}

fn count_text(count: u64) -> String {
    match count {
        0 => "Nothing logged from you yet.".to_string(),
        1 => "1 message logged from you.".to_string(),
        n => format!("{n} messages logged from you."),
    }
}

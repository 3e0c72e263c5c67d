// Bot presence. Discord SDK types only; nothing here touches the core.

use poise::serenity_prelude as serenity;

/// Shows which table incoming messages are written to.
pub fn show_target(ctx: &serenity::Context, worksheet: &str) {
    let activity = serenity::ActivityData::watching(format!("uploads → {worksheet}"));
    ctx.set_presence(Some(activity), serenity::OnlineStatus::Online);
}

/// Called once the bot is ready.
pub fn on_ready(ctx: &serenity::Context, worksheet: &str) {
    show_target(ctx, worksheet);
}

// Turns Discord messages into ingest requests and posts the outcome back.
//
// A Discord message can carry several attachments. Each one is processed as
// its own incoming message; the message text rides along with the first one
// only, so it is not turned into rows twice.

use crate::core::history::Sender;
use crate::core::ingest::{Attachment, IncomingMessage};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;

/// Discord rejects messages longer than this many characters.
const DISCORD_MESSAGE_LIMIT: usize = 2000;

pub async fn handle_message(
    ctx: &serenity::Context,
    message: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if message.author.bot {
        return Ok(());
    }
    let is_dm = message.guild_id.is_none();
    if !should_ingest(is_dm, message.channel_id.get(), &data.ingest_channels) {
        return Ok(());
    }
    if message.content.trim().is_empty() && message.attachments.is_empty() {
        return Ok(());
    }

    let _ = message.channel_id.broadcast_typing(&ctx.http).await;

    let sender = Sender {
        user_id: message.author.id.get(),
        username: message.author.name.clone(),
        display_name: message.author.global_name.clone(),
    };
    if let Err(e) = data.history.record(&sender, Some(message.content.as_str())).await {
        tracing::warn!(user_id = sender.user_id, error = %e, "Could not record message history");
    }

    let attachments = message
        .attachments
        .iter()
        .map(|a| Attachment {
            url: a.url.clone(),
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            size: u64::from(a.size),
        })
        .collect();

    for incoming in incoming_messages(&sender, &message.content, attachments) {
        let report = data.ingest.handle(&incoming).await;
        for notice in &report.notices {
            for chunk in split_for_discord(&notice.to_string()) {
                if let Err(e) = message.channel_id.say(&ctx.http, chunk).await {
                    tracing::error!(error = %e, "Failed to send ingest notice");
                }
            }
        }
    }
    Ok(())
}

/// DMs are always ingested; guild messages only in configured channels.
pub fn should_ingest(is_dm: bool, channel_id: u64, ingest_channels: &HashSet<u64>) -> bool {
    is_dm || ingest_channels.contains(&channel_id)
}

pub fn incoming_messages(
    sender: &Sender,
    content: &str,
    attachments: Vec<Attachment>,
) -> Vec<IncomingMessage> {
    let text = Some(content.to_string()).filter(|t| !t.trim().is_empty());

    if attachments.is_empty() {
        return vec![IncomingMessage {
            sender: sender.clone(),
            text,
            attachment: None,
        }];
    }

    attachments
        .into_iter()
        .enumerate()
        .map(|(index, attachment)| IncomingMessage {
            sender: sender.clone(),
            text: if index == 0 { text.clone() } else { None },
            attachment: Some(attachment),
        })
        .collect()
}

/// Splits text into pieces Discord will accept, on character boundaries.
pub fn split_for_discord(text: &str) -> Vec<String> {
    text.chars()
        .collect::<Vec<char>>()
        .chunks(DISCORD_MESSAGE_LIMIT)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ingest::MessageKind;

    fn sender() -> Sender {
        Sender {
            user_id: 5,
            username: "uploader".to_string(),
            display_name: None,
        }
    }

    fn attachment(filename: &str, content_type: &str) -> Attachment {
        Attachment {
            url: format!("https://cdn.discordapp.com/attachments/1/2/{filename}"),
            filename: filename.to_string(),
            content_type: Some(content_type.to_string()),
            size: 100,
        }
    }

    #[test]
    fn dms_and_watched_channels_are_ingested() {
        let channels: HashSet<u64> = [10].into_iter().collect();
        assert!(should_ingest(true, 99, &channels));
        assert!(should_ingest(false, 10, &channels));
        assert!(!should_ingest(false, 11, &channels));
    }

    #[test]
    fn caption_goes_with_the_first_attachment_only() {
        let messages = incoming_messages(
            &sender(),
            "two deeds",
            vec![
                attachment("a.pdf", "application/pdf"),
                attachment("b.jpg", "image/jpeg"),
            ],
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text.as_deref(), Some("two deeds"));
        assert_eq!(messages[0].kind(), MessageKind::Document);
        assert_eq!(messages[1].text, None);
        assert_eq!(messages[1].kind(), MessageKind::Photo);
    }

    #[test]
    fn plain_text_is_one_message() {
        let messages = incoming_messages(&sender(), "Saucony Kinvara 14", Vec::new());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), MessageKind::Text);
    }

    #[test]
    fn long_text_is_split_on_char_boundaries() {
        let text = "я".repeat(DISCORD_MESSAGE_LIMIT + 1);
        let chunks = split_for_discord(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), DISCORD_MESSAGE_LIMIT);
        assert_eq!(chunks[1], "я");
    }
}

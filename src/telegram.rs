//! Publisher that delivers a caption and meme image to a Telegram chat.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, Recipient};
use tracing::{info, instrument};

/// Delivers generated content to the destination channel. `image` is
/// optional so callers can fall back to a plain text message.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str, image: Option<&[u8]>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct TelegramPublisher {
    bot: Bot,
    chat: Recipient,
}

impl TelegramPublisher {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self> {
        Ok(Self {
            bot: Bot::new(bot_token),
            chat: parse_chat(chat_id)?,
        })
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    #[instrument(skip_all)]
    async fn publish(&self, text: &str, image: Option<&[u8]>) -> Result<()> {
        match image {
            Some(bytes) => {
                let photo = InputFile::memory(bytes.to_vec());
                self.bot
                    .send_photo(self.chat.clone(), photo)
                    .caption(text.to_string())
                    .await
                    .context("telegram send_photo failed")?;
            }
            None => {
                self.bot
                    .send_message(self.chat.clone(), text.to_string())
                    .await
                    .context("telegram send_message failed")?;
            }
        }
        info!(chars = text.chars().count(), with_image = image.is_some(), "message delivered");
        Ok(())
    }
}

/// Accepts either a numeric chat id or a `@channel` username.
pub fn parse_chat(raw: &str) -> Result<Recipient> {
    let trimmed = raw.trim();
    if let Some(name) = trimmed.strip_prefix('@') {
        if name.is_empty() {
            return Err(anyhow!("CHAT_ID channel username is empty"));
        }
        return Ok(Recipient::ChannelUsername(trimmed.to_string()));
    }
    let id: i64 = trimmed
        .parse()
        .with_context(|| format!("CHAT_ID must be numeric or start with '@', got {trimmed:?}"))?;
    Ok(Recipient::Id(ChatId(id)))
}

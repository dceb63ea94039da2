//! Outbound notification boundary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use std::sync::Arc;

use super::ChatId;
use crate::core::split_message;

/// Sends a message to a chat. Failures are reported, never retried.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, chat: ChatId, text: &str) -> Result<()>;
}

/// Delivers to the Discord channel whose id is the chat id, splitting
/// anything over the message limit
#[derive(Clone)]
pub struct DiscordDispatcher {
    http: Arc<Http>,
}

impl DiscordDispatcher {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl NotificationDispatcher for DiscordDispatcher {
    async fn send(&self, chat: ChatId, text: &str) -> Result<()> {
        let channel = u64::try_from(chat).with_context(|| format!("chat {chat} is not a Discord channel id"))?;
        for part in split_message(text) {
            ChannelId(channel)
                .say(&self.http, part)
                .await
                .with_context(|| format!("failed to send message to channel {channel}"))?;
        }
        Ok(())
    }
}

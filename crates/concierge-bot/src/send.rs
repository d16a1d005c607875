//! Outbound send helpers and the [`ChatTransport`] implementation.
//!
//! Markdown is tried first and quietly downgraded to plain text when
//! Telegram rejects the escaping; typed [`SendError`] values surface the
//! block/rate-limit cases the services branch on.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::{ApiError, RequestError};
use tracing::warn;

use concierge_core::transport::{ChatTransport, SendError};

/// Escape special characters for Telegram MarkdownV2.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '#' | '+' | '-' | '=' | '|' | '{'
            | '}' | '.' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn classify(err: RequestError) -> SendError {
    match err {
        RequestError::Api(ApiError::BotBlocked) => SendError::Forbidden,
        RequestError::Api(ApiError::UserDeactivated) => SendError::Forbidden,
        RequestError::RetryAfter(seconds) => {
            SendError::RetryAfter(Duration::from_secs(seconds.seconds() as u64))
        }
        other => SendError::Other(other.to_string()),
    }
}

/// Send with MarkdownV2, falling back to plain text on parse rejection.
pub async fn send_markdown(bot: &Bot, chat_id: ChatId, text: &str) -> Result<(), SendError> {
    let escaped = escape_markdown_v2(text);
    match bot
        .send_message(chat_id, &escaped)
        .parse_mode(ParseMode::MarkdownV2)
        .await
    {
        Ok(_) => Ok(()),
        Err(RequestError::Api(ApiError::CantParseEntities(_))) => {
            match bot.send_message(chat_id, text).await {
                Ok(_) => Ok(()),
                Err(e) => Err(classify(e)),
            }
        }
        Err(e) => {
            // Other failures get one plain-text attempt too; escaping
            // problems are indistinguishable from some 400s.
            match bot.send_message(chat_id, text).await {
                Ok(_) => Ok(()),
                Err(e2) => {
                    warn!(error = %e, retry_error = %e2, "telegram send failed");
                    Err(classify(e2))
                }
            }
        }
    }
}

/// The teloxide-backed [`ChatTransport`] used by services and broadcasts.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        let id: i64 = chat_id
            .parse()
            .map_err(|_| SendError::Other(format!("invalid chat id: {chat_id}")))?;
        match self.bot.send_message(ChatId(id), text).await {
            Ok(_) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }
}

//! The seam between business services and the chat platform.
//!
//! Live chat, referral sends, broadcasts, and owner notifications all go
//! through [`ChatTransport`] so they can be exercised with an in-memory
//! implementation in tests and so delivery failures arrive as typed values
//! instead of platform-specific errors.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    /// The recipient blocked the bot. Callers treat this as a permanent
    /// condition (broadcast auto-unsubscribes the user).
    #[error("recipient has blocked the bot")]
    Forbidden,

    /// The platform asked us to slow down and retry after the given interval.
    #[error("rate limited by platform, retry after {0:?}")]
    RetryAfter(Duration),

    /// Anything else: transport failures, bad requests, timeouts.
    #[error("send failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Deliver a plain-text message to a chat id.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), SendError>;
}

//! Live-chat takeover: BOT_ACTIVE ↔ LIVE_CHAT transitions.
//!
//! All transitions are idempotent and report a typed outcome. `end` notifies
//! the customer before deactivating the session so the bot never answers a
//! message that arrives ahead of the "bot is back" notice.

use std::sync::Arc;

use tracing::{info, warn};

use concierge_core::text::{LIVE_CHAT_ENDED, LIVE_CHAT_JOINED};
use concierge_core::transport::ChatTransport;
use concierge_store::types::{LiveChatSession, Role};
use concierge_store::{Result, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyActive,
    Started,
    /// The session is active but the customer notification failed.
    NotifyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    AlreadyEnded,
    Ended,
    /// The session was closed but the customer notification failed.
    NotifyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    SessionEnded,
    EmptyMessage,
    DeliveryFailed,
    Sent,
}

pub struct LiveChatService {
    store: Arc<Store>,
    transport: Arc<dyn ChatTransport>,
}

impl LiveChatService {
    pub fn new(store: Arc<Store>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { store, transport }
    }

    pub fn is_active(&self, user_id: &str) -> Result<bool> {
        self.store.is_live_chat_active(user_id)
    }

    pub fn list_active(&self) -> Result<Vec<LiveChatSession>> {
        self.store.list_active_live_chats()
    }

    async fn notify(&self, user_id: &str, username: &str, text: &str) -> bool {
        match self.transport.send_text(user_id, text).await {
            Ok(()) => {
                if let Err(e) = self
                    .store
                    .save_message(user_id, username, Role::Assistant, text, "")
                {
                    warn!(error = %e, user_id, "failed to persist live-chat notice");
                }
                true
            }
            Err(e) => {
                warn!(error = %e, user_id, "live-chat notice delivery failed");
                false
            }
        }
    }

    /// BOT_ACTIVE → LIVE_CHAT. The state change stands even when the
    /// customer notification fails.
    pub async fn start(&self, user_id: &str) -> Result<StartOutcome> {
        if self.store.is_live_chat_active(user_id)? {
            return Ok(StartOutcome::AlreadyActive);
        }

        let username = self
            .store
            .username_for(user_id)?
            .unwrap_or_else(|| user_id.to_string());
        self.store.start_live_chat(user_id, &username)?;
        info!(user_id, "live chat started");

        if self.notify(user_id, &username, LIVE_CHAT_JOINED).await {
            Ok(StartOutcome::Started)
        } else {
            Ok(StartOutcome::NotifyFailed)
        }
    }

    /// LIVE_CHAT → BOT_ACTIVE. Notification goes out first; only then is
    /// the session deactivated.
    pub async fn end(&self, user_id: &str) -> Result<EndOutcome> {
        if !self.store.is_live_chat_active(user_id)? {
            return Ok(EndOutcome::AlreadyEnded);
        }

        let username = self
            .store
            .username_for(user_id)?
            .unwrap_or_else(|| user_id.to_string());
        let notified = self.notify(user_id, &username, LIVE_CHAT_ENDED).await;

        self.store.end_live_chat(user_id)?;
        info!(user_id, "live chat ended");

        if notified {
            Ok(EndOutcome::Ended)
        } else {
            Ok(EndOutcome::NotifyFailed)
        }
    }

    /// Deliver an operator message to the customer.
    pub async fn send(&self, user_id: &str, text: &str) -> Result<SendOutcome> {
        if !self.store.is_live_chat_active(user_id)? {
            return Ok(SendOutcome::SessionEnded);
        }
        if text.trim().is_empty() {
            return Ok(SendOutcome::EmptyMessage);
        }

        if self.transport.send_text(user_id, text).await.is_err() {
            return Ok(SendOutcome::DeliveryFailed);
        }

        let username = self
            .store
            .username_for(user_id)?
            .unwrap_or_else(|| user_id.to_string());
        self.store
            .save_message(user_id, &username, Role::Assistant, text, "")?;
        Ok(SendOutcome::Sent)
    }

    /// Startup sweep for sessions left active by a previous run.
    pub fn cleanup_stale(&self) -> Result<usize> {
        let ended = self.store.end_all_live_chats()?;
        if ended > 0 {
            info!(ended, "closed stale live-chat sessions from a previous run");
        }
        Ok(ended)
    }
}

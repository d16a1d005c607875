//! Broadcast fan-out worker.
//!
//! One worker per broadcast: walks the recipient list in order with a
//! per-send delay to stay under the platform rate limit, honors the
//! platform's retry-after once per recipient, auto-unsubscribes users who
//! blocked the bot, and checkpoints progress every few recipients so a
//! crashed or cancelled run keeps its partial counts.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use concierge_core::transport::{ChatTransport, SendError};
use concierge_store::Store;

/// Delay between consecutive sends (20 msgs/s, under Telegram's cap).
const SEND_DELAY: Duration = Duration::from_millis(50);
/// Checkpoint `(sent, failed)` to the store every this many recipients.
const PROGRESS_INTERVAL: usize = 10;

#[derive(Debug, Clone)]
pub struct BroadcastInput {
    pub broadcast_id: i64,
    pub text: String,
    pub recipients: Vec<String>,
}

/// Run one broadcast to completion (or cancellation).
pub async fn run_broadcast(
    store: Arc<Store>,
    transport: Arc<dyn ChatTransport>,
    input: BroadcastInput,
    cancel: CancellationToken,
) {
    let id = input.broadcast_id;
    if let Err(e) = store.mark_broadcast_sending(id) {
        error!(error = %e, broadcast_id = id, "could not mark broadcast sending");
        return;
    }

    let mut sent: i64 = 0;
    let mut failed: i64 = 0;

    for (i, user_id) in input.recipients.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(broadcast_id = id, sent, failed, "broadcast cancelled");
            if let Err(e) = store.fail_broadcast(id) {
                error!(error = %e, broadcast_id = id, "failed to mark cancelled broadcast");
            }
            return;
        }

        match deliver(&store, transport.as_ref(), id, user_id, &input.text).await {
            Ok(()) => sent += 1,
            Err(()) => failed += 1,
        }

        if (i + 1) % PROGRESS_INTERVAL == 0 {
            if let Err(e) = store.update_broadcast_progress(id, sent, failed) {
                warn!(error = %e, broadcast_id = id, "progress checkpoint failed");
            }
        }

        tokio::time::sleep(SEND_DELAY).await;
    }

    if let Err(e) = store.complete_broadcast(id, sent, failed) {
        error!(error = %e, broadcast_id = id, "failed to mark broadcast completed");
    }
    info!(
        broadcast_id = id,
        sent,
        failed,
        recipients = input.recipients.len(),
        "broadcast completed"
    );
}

/// One recipient: classify the outcome, honoring a single retry on
/// platform rate limiting and unsubscribing blocked users.
async fn deliver(
    store: &Store,
    transport: &dyn ChatTransport,
    broadcast_id: i64,
    user_id: &str,
    text: &str,
) -> Result<(), ()> {
    match transport.send_text(user_id, text).await {
        Ok(()) => Ok(()),
        Err(SendError::Forbidden) => {
            info!(broadcast_id, user_id, "recipient blocked the bot, unsubscribing");
            if let Err(e) = store.unsubscribe_user(user_id) {
                warn!(error = %e, user_id, "auto-unsubscribe failed");
            }
            Err(())
        }
        Err(SendError::RetryAfter(wait)) => {
            warn!(broadcast_id, user_id, ?wait, "platform rate limit, retrying once");
            tokio::time::sleep(wait).await;
            match transport.send_text(user_id, text).await {
                Ok(()) => Ok(()),
                Err(SendError::Forbidden) => {
                    if let Err(e) = store.unsubscribe_user(user_id) {
                        warn!(error = %e, user_id, "auto-unsubscribe failed");
                    }
                    Err(())
                }
                Err(e) => {
                    error!(error = %e, broadcast_id, user_id, "retry failed");
                    Err(())
                }
            }
        }
        Err(e) => {
            error!(error = %e, broadcast_id, user_id, "broadcast send failed");
            Err(())
        }
    }
}

/// Bridges the admin thread to the chat runtime. When the bot is running,
/// workers are spawned onto its tokio runtime; in admin-only mode each
/// worker gets a dedicated thread with its own single-threaded runtime.
#[derive(Clone)]
pub struct Dispatcher {
    handle: Option<tokio::runtime::Handle>,
}

impl Dispatcher {
    pub fn new(handle: Option<tokio::runtime::Handle>) -> Self {
        Self { handle }
    }

    pub fn schedule<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match &self.handle {
            Some(handle) => {
                handle.spawn(task);
            }
            None => {
                std::thread::spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(task),
                        Err(e) => error!(error = %e, "dispatcher could not build runtime"),
                    }
                });
            }
        }
    }
}

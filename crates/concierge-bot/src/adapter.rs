//! Telegram adapter: wraps a teloxide `Bot` + `Dispatcher` and drives the
//! long-polling loop until the process exits.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use crate::handler::{handle_callback, handle_message};
use crate::orchestrator::Orchestrator;

pub struct TelegramAdapter {
    bot: Bot,
    orchestrator: Arc<Orchestrator>,
}

impl TelegramAdapter {
    pub fn new(bot: Bot, orchestrator: Arc<Orchestrator>) -> Self {
        Self { bot, orchestrator }
    }

    /// Connect and drive the long-polling loop. Runs for the lifetime of
    /// the process; no public URL required.
    pub async fn run(self) {
        info!("telegram: starting long-polling dispatcher");

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(handle_message))
            .branch(Update::filter_callback_query().endpoint(handle_callback));

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.orchestrator])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;
    }
}

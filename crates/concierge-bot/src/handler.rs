//! teloxide endpoints: map Telegram updates to orchestrator events and
//! render the orchestrator's replies back through the send helpers.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

use crate::keyboards;
use crate::orchestrator::{InboundMessage, Orchestrator, Reply, ReplyMarkupKind, UpdateKind};
use crate::send::{escape_markdown_v2, send_markdown};

fn sender_identity(user: &teloxide::types::User) -> (String, String, String) {
    let user_id = user.id.0.to_string();
    let username = if !user.full_name().is_empty() {
        user.full_name()
    } else {
        user.username
            .as_ref()
            .map(|u| format!("@{u}"))
            .unwrap_or_else(|| format!("User {}", user.id.0))
    };
    let handle = user
        .username
        .as_ref()
        .map(|u| format!("@{u}"))
        .unwrap_or_default();
    (user_id, username, handle)
}

/// Deliver orchestrator replies to a chat, attaching the right keyboard.
pub async fn deliver_replies(bot: &Bot, chat_id: ChatId, replies: Vec<Reply>) {
    for reply in replies {
        let result = match reply.keyboard {
            ReplyMarkupKind::MainMenu => {
                bot.send_message(chat_id, escape_markdown_v2(&reply.text))
                    .parse_mode(ParseMode::MarkdownV2)
                    .reply_markup(keyboards::main_menu())
                    .await
                    .map(|_| ())
            }
            ReplyMarkupKind::CancelConfirm => {
                bot.send_message(chat_id, &reply.text)
                    .reply_markup(keyboards::cancel_confirm())
                    .await
                    .map(|_| ())
            }
            ReplyMarkupKind::FollowUps(questions) => {
                bot.send_message(chat_id, &reply.text)
                    .reply_markup(keyboards::follow_ups(&questions))
                    .await
                    .map(|_| ())
            }
            ReplyMarkupKind::None => {
                if let Err(e) = send_markdown(bot, chat_id, &reply.text).await {
                    warn!(error = %e, "reply delivery failed");
                }
                continue;
            }
        };

        if result.is_err() {
            // Markdown or keyboard rejected — last resort is bare text.
            if let Err(e) = bot.send_message(chat_id, &reply.text).await {
                warn!(error = %e, "reply delivery failed");
            }
        }
    }
}

/// Main message endpoint registered in the Dispatcher.
pub async fn handle_message(
    bot: Bot,
    msg: Message,
    orchestrator: Arc<Orchestrator>,
) -> ResponseResult<()> {
    // Ignore other bots and senderless updates.
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }

    let Some(raw_text) = msg.text() else {
        return Ok(());
    };
    let text = raw_text.trim().to_string();
    if text.is_empty() {
        return Ok(());
    }

    let (user_id, username, platform_handle) = sender_identity(from);
    let kind = if text.starts_with('/') {
        UpdateKind::Command
    } else if keyboards::is_menu_button(&text) {
        UpdateKind::MenuButton
    } else {
        UpdateKind::Text
    };

    let inbound = InboundMessage {
        user_id,
        username,
        platform_handle,
        text,
        kind,
    };
    let chat_id = msg.chat.id;

    let replies = orchestrator.handle(inbound).await;
    deliver_replies(&bot, chat_id, replies).await;
    Ok(())
}

/// Inline-keyboard callback endpoint (cancellation confirm, follow-ups).
pub async fn handle_callback(
    bot: Bot,
    query: CallbackQuery,
    orchestrator: Arc<Orchestrator>,
) -> ResponseResult<()> {
    // Stop the client-side spinner regardless of outcome.
    if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
        warn!(error = %e, "answer_callback_query failed");
    }

    let Some(data) = query.data else {
        return Ok(());
    };
    let (user_id, username, platform_handle) = sender_identity(&query.from);
    let Some(message) = query.message else {
        return Ok(());
    };
    let chat_id = message.chat().id;

    let inbound = InboundMessage {
        user_id,
        username,
        platform_handle,
        text: data,
        kind: UpdateKind::InlineCallback,
    };

    let replies = orchestrator.handle(inbound).await;
    deliver_replies(&bot, chat_id, replies).await;
    Ok(())
}

//! Per-message orchestration: guard chain, intent routing, the booking
//! dialog, and the handoff decision.
//!
//! Every customer-visible and assistant-visible message is persisted before
//! the reply is handed back for delivery, so history and summarization
//! reflect exactly what happened.

use std::sync::Arc;

use tracing::{info, warn};

use concierge_core::text::{
    self, FALLBACK_RESPONSE, FAREWELL_REPLY, GREETING_REPLY, HELP_MESSAGE,
};
use concierge_core::transport::ChatTransport;
use concierge_hours::HoursService;
use concierge_llm::{Answer, AnswerPipeline, Summarizer};
use concierge_services::intent::{detect_intent, Intent};
use concierge_services::{LiveChatService, RateLimiter, ReferralService, VacationService};
use concierge_store::types::Role;
use concierge_store::Store;

use crate::booking::{is_confirmation, BookingState, BookingStates};
use crate::keyboards;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Command,
    Text,
    MenuButton,
    InlineCallback,
}

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub user_id: String,
    pub username: String,
    pub platform_handle: String,
    pub text: String,
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyMarkupKind {
    MainMenu,
    CancelConfirm,
    FollowUps(Vec<String>),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: ReplyMarkupKind,
}

impl Reply {
    pub fn menu(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: ReplyMarkupKind::MainMenu,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: ReplyMarkupKind::None,
        }
    }
}

pub struct Orchestrator {
    store: Arc<Store>,
    pipeline: Arc<AnswerPipeline>,
    summarizer: Arc<Summarizer>,
    rate_limiter: Arc<RateLimiter>,
    live_chat: Arc<LiveChatService>,
    vacation: Arc<VacationService>,
    referral: Arc<ReferralService>,
    hours: Arc<HoursService>,
    transport: Arc<dyn ChatTransport>,
    booking: BookingStates,
    owner_chat_id: String,
    business_name: String,
    pricing_hint: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        pipeline: Arc<AnswerPipeline>,
        summarizer: Arc<Summarizer>,
        rate_limiter: Arc<RateLimiter>,
        live_chat: Arc<LiveChatService>,
        vacation: Arc<VacationService>,
        referral: Arc<ReferralService>,
        hours: Arc<HoursService>,
        transport: Arc<dyn ChatTransport>,
        owner_chat_id: String,
        business_name: String,
        pricing_hint: String,
    ) -> Self {
        Self {
            store,
            pipeline,
            summarizer,
            rate_limiter,
            live_chat,
            vacation,
            referral,
            hours,
            transport,
            booking: BookingStates::new(),
            owner_chat_id,
            business_name,
            pricing_hint,
        }
    }

    /// Process one inbound event and return the replies to deliver.
    /// An empty vector means the bot stays silent.
    pub async fn handle(&self, msg: InboundMessage) -> Vec<Reply> {
        if let Err(e) = self.store.ensure_subscribed(&msg.user_id) {
            warn!(error = %e, user_id = %msg.user_id, "subscription upsert failed");
        }

        // Live-chat takeover: keep the customer's words for the operator
        // and say nothing. Rate limiting is bypassed on purpose.
        match self.live_chat.is_active(&msg.user_id) {
            Ok(true) => {
                self.booking.clear(&msg.user_id);
                if msg.kind != UpdateKind::InlineCallback && !msg.text.trim().is_empty() {
                    self.persist(&msg, Role::User, &msg.text, "");
                }
                return Vec::new();
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, user_id = %msg.user_id, "live-chat check failed"),
        }

        if let Some(limit_reply) = self.rate_limiter.check(&msg.user_id) {
            return vec![Reply::menu(limit_reply)];
        }
        self.rate_limiter.record(&msg.user_id);

        match msg.kind {
            UpdateKind::Command => self.handle_command(&msg).await,
            UpdateKind::InlineCallback => self.handle_callback(&msg).await,
            UpdateKind::MenuButton => {
                self.booking.clear(&msg.user_id);
                self.handle_menu_button(&msg, msg.text.trim()).await
            }
            UpdateKind::Text => {
                let trimmed = msg.text.trim().to_string();
                // A menu-button press arrives as plain text; it always wins
                // over an in-flight booking dialog.
                if keyboards::is_menu_button(&trimmed) {
                    self.booking.clear(&msg.user_id);
                    return self.handle_menu_button(&msg, &trimmed).await;
                }
                if let Some(state) = self.booking.get(&msg.user_id) {
                    return self.handle_booking_step(&msg, state).await;
                }
                self.handle_free_text(&msg).await
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    async fn handle_command(&self, msg: &InboundMessage) -> Vec<Reply> {
        let mut parts = msg.text.trim().split_whitespace();
        let command = parts.next().unwrap_or("");

        match command {
            "/start" => {
                if let Some(payload) = parts.next() {
                    if ReferralService::is_referral_payload(payload) {
                        match self.referral.register(payload, &msg.user_id) {
                            Ok(true) => info!(user_id = %msg.user_id, "joined via referral link"),
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "referral registration failed"),
                        }
                    }
                }
                self.persist(msg, Role::User, "/start", "");
                let welcome = text::welcome_message(&self.business_name);
                self.persist(msg, Role::Assistant, &welcome, "");
                vec![Reply::menu(welcome)]
            }
            "/help" => {
                self.persist(msg, Role::User, "/help", "");
                self.persist(msg, Role::Assistant, HELP_MESSAGE, "");
                vec![Reply::menu(HELP_MESSAGE)]
            }
            "/book" => self.start_booking(msg).await,
            "/cancel" => {
                self.persist(msg, Role::User, "/cancel", "");
                let reply = if self.booking.clear(&msg.user_id) {
                    "ביטלנו את תהליך קביעת התור. איך עוד אפשר לעזור?"
                } else {
                    "אין תהליך פעיל לביטול. איך אפשר לעזור?"
                };
                self.persist(msg, Role::Assistant, reply, "");
                vec![Reply::menu(reply)]
            }
            _ => self.handle_free_text(msg).await,
        }
    }

    // ── Menu buttons ─────────────────────────────────────────────────

    async fn handle_menu_button(&self, msg: &InboundMessage, button: &str) -> Vec<Reply> {
        match button {
            keyboards::BTN_BOOK => self.start_booking(msg).await,
            keyboards::BTN_PRICE_LIST => {
                let query = format!(
                    "{} הציגו את המחירון המלא עם כל השירותים והמחירים",
                    self.pricing_hint
                );
                self.rag_reply(msg, &query, button).await
            }
            keyboards::BTN_LOCATION => {
                self.rag_reply(msg, "מה הכתובת של העסק ואיך מגיעים אליכם?", button)
                    .await
            }
            keyboards::BTN_AGENT => {
                self.persist(msg, Role::User, button, "");
                if self.vacation.is_active() {
                    let reply = self.vacation.agent_message();
                    self.persist(msg, Role::Assistant, &reply, "");
                    return vec![Reply::menu(reply)];
                }
                let reply = "👤 הודענו לצוות שתרצו לדבר עם נציג.\n\n\
                             נציג אנושי יחזור אליכם בהקדם. בינתיים, אפשר להמשיך לשאול אותי שאלות!";
                self.open_agent_request(msg, "הלקוח ביקש לדבר עם נציג אנושי")
                    .await;
                self.persist(msg, Role::Assistant, reply, "");
                vec![Reply::menu(reply)]
            }
            _ => Vec::new(),
        }
    }

    // ── Inline callbacks ─────────────────────────────────────────────

    async fn handle_callback(&self, msg: &InboundMessage) -> Vec<Reply> {
        let data = msg.text.as_str();

        if data == keyboards::CB_CANCEL_YES {
            self.open_agent_request(msg, "הלקוח אישר שברצונו לבטל תור")
                .await;
            let reply = "קיבלנו. נציג יצור איתכם קשר להשלמת הביטול.";
            self.persist(msg, Role::Assistant, reply, "");
            return vec![Reply::menu(reply)];
        }
        if data == keyboards::CB_CANCEL_NO {
            let reply = "מצוין, התור נשאר בתוקף 😊";
            self.persist(msg, Role::Assistant, reply, "");
            return vec![Reply::menu(reply)];
        }
        if let Some(question) = data.strip_prefix(keyboards::CB_FOLLOW_UP_PREFIX) {
            let question = question.to_string();
            return self.rag_reply(msg, &question, &question).await;
        }
        Vec::new()
    }

    // ── Free text ────────────────────────────────────────────────────

    async fn handle_free_text(&self, msg: &InboundMessage) -> Vec<Reply> {
        match detect_intent(&msg.text) {
            Intent::Greeting => self.fixed_reply(msg, GREETING_REPLY),
            Intent::Farewell => self.fixed_reply(msg, FAREWELL_REPLY),
            Intent::BusinessHours => {
                let reply = match (
                    self.hours.is_currently_open(),
                    self.hours.weekly_schedule_text(),
                ) {
                    (Ok(now), Ok(schedule)) => format!("{}\n\n{}", now.message, schedule),
                    _ => "מצטערים, לא הצלחנו לבדוק את שעות הפעילות כרגע.".to_string(),
                };
                self.fixed_reply(msg, &reply)
            }
            Intent::AppointmentBooking => {
                // Never bypass the guided dialog.
                let reply = format!(
                    "כדי לקבוע תור, לחצו על כפתור '{}' בתפריט למטה 👇",
                    keyboards::BTN_BOOK
                );
                self.fixed_reply(msg, &reply)
            }
            Intent::AppointmentCancel => {
                let question = "האם אתם בטוחים שברצונכם לבטל את התור?";
                self.persist(msg, Role::User, &msg.text, "");
                self.persist(msg, Role::Assistant, question, "");
                vec![Reply {
                    text: question.to_string(),
                    keyboard: ReplyMarkupKind::CancelConfirm,
                }]
            }
            Intent::Pricing => {
                let query = format!("{} {}", self.pricing_hint, msg.text);
                self.rag_reply(msg, &query, &msg.text).await
            }
            Intent::General => self.rag_reply(msg, &msg.text, &msg.text).await,
        }
    }

    fn fixed_reply(&self, msg: &InboundMessage, reply: &str) -> Vec<Reply> {
        self.persist(msg, Role::User, &msg.text, "");
        self.persist(msg, Role::Assistant, reply, "");
        self.spawn_summarize(&msg.user_id);
        vec![Reply::menu(reply)]
    }

    // ── Booking dialog ───────────────────────────────────────────────

    async fn start_booking(&self, msg: &InboundMessage) -> Vec<Reply> {
        if self.vacation.is_active() {
            let reply = self.vacation.booking_message();
            self.persist(msg, Role::User, &msg.text, "");
            self.persist(msg, Role::Assistant, &reply, "");
            return vec![Reply::menu(reply)];
        }

        // List the services from the KB. A handoff here cancels the dialog.
        let answer = self
            .pipeline
            .generate_answer(
                Some(&msg.user_id),
                &msg.username,
                "אילו שירותים אתם מציעים? פרטו בקצרה.",
                None,
            )
            .await;
        self.persist(msg, Role::User, &msg.text, "");

        if answer.is_fallback() {
            self.persist(msg, Role::Assistant, answer.stored_text(), "");
            self.open_agent_request(msg, "הלקוח ניסה לקבוע תור אך אין מידע על השירותים")
                .await;
            self.spawn_summarize(&msg.user_id);
            return vec![Reply::menu(answer.visible_text())];
        }

        let reply = format!(
            "📅 קביעת תור\n\n{}\n\nאיזה שירות תרצו להזמין? (לביטול: /cancel)",
            answer.visible_text()
        );
        self.persist(msg, Role::Assistant, &reply, &answer.sources_joined());
        self.booking.set(&msg.user_id, BookingState::AskService);
        self.spawn_summarize(&msg.user_id);
        vec![Reply::plain(reply)]
    }

    async fn handle_booking_step(&self, msg: &InboundMessage, state: BookingState) -> Vec<Reply> {
        self.persist(msg, Role::User, &msg.text, "");
        let captured = msg.text.trim().to_string();

        match state {
            BookingState::AskService => {
                self.booking
                    .set(&msg.user_id, BookingState::AskDate { service: captured });
                let reply = "📆 מעולה! לאיזה תאריך תרצו את התור?\n\
                             (למשל: 'יום שני', '15 במרץ', 'מחר')\n\nלביטול: /cancel";
                self.persist(msg, Role::Assistant, reply, "");
                vec![Reply::plain(reply)]
            }
            BookingState::AskDate { service } => {
                self.booking.set(
                    &msg.user_id,
                    BookingState::AskTime {
                        service,
                        date: captured,
                    },
                );
                let reply = "🕐 ואיזו שעה נוחה לכם?\n\
                             (למשל: '10:00', 'אחר הצהריים', '14:30')\n\nלביטול: /cancel";
                self.persist(msg, Role::Assistant, reply, "");
                vec![Reply::plain(reply)]
            }
            BookingState::AskTime { service, date } => {
                let summary = format!(
                    "📋 סיכום התור:\n\n• שירות: {service}\n• תאריך: {date}\n• שעה: {captured}\n\n\
                     לאישור כתבו 'כן', לביטול כתבו 'לא':"
                );
                self.booking.set(
                    &msg.user_id,
                    BookingState::Confirm {
                        service,
                        date,
                        time: captured,
                    },
                );
                self.persist(msg, Role::Assistant, &summary, "");
                vec![Reply::plain(summary)]
            }
            BookingState::Confirm {
                service,
                date,
                time,
            } => {
                self.booking.clear(&msg.user_id);

                if !is_confirmation(&captured) {
                    let reply = "❌ הזמנת התור בוטלה. אפשר לקבוע תור חדש בכל עת!";
                    self.persist(msg, Role::Assistant, reply, "");
                    return vec![Reply::menu(reply)];
                }

                let appointment_id = match self.store.create_appointment(
                    &msg.user_id,
                    &msg.username,
                    &msg.platform_handle,
                    &service,
                    &date,
                    &time,
                    "",
                ) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(error = %e, user_id = %msg.user_id, "appointment insert failed");
                        let reply = FALLBACK_RESPONSE;
                        self.persist(msg, Role::Assistant, reply, "");
                        return vec![Reply::menu(reply)];
                    }
                };

                self.notify_owner(&format!(
                    "📅 בקשת תור חדשה #{appointment_id}\n\n\
                     לקוח: {}\nשירות: {service}\nתאריך: {date}\nשעה: {time}",
                    msg.username
                ))
                .await;

                let reply = format!(
                    "✅ בקשת התור נקלטה!\n\n• שירות: {service}\n• תאריך: {date}\n• שעה: {time}\n\n\
                     נאשר את התור בהקדם ותקבלו עדכון."
                );
                self.persist(msg, Role::Assistant, &reply, "");
                self.spawn_summarize(&msg.user_id);
                vec![Reply::menu(reply)]
            }
        }
    }

    // ── RAG answers and the handoff decision ─────────────────────────

    /// Run retrieval + LLM and translate the typed outcome into replies.
    /// `user_text` is the customer's own phrasing — persisted as the user
    /// turn (after generation, so the history window excludes it) and used
    /// in the agent-request reason when the answer falls back.
    async fn rag_reply(&self, msg: &InboundMessage, query: &str, user_text: &str) -> Vec<Reply> {
        let answer = self
            .pipeline
            .generate_answer(Some(&msg.user_id), &msg.username, query, None)
            .await;

        self.persist(msg, Role::User, user_text, "");
        self.persist(
            msg,
            Role::Assistant,
            answer.stored_text(),
            &answer.sources_joined(),
        );
        self.spawn_summarize(&msg.user_id);

        if answer.is_fallback() {
            self.open_agent_request(msg, &format!("הבוט לא הצליח לענות על: \"{user_text}\""))
                .await;
            return vec![Reply::menu(answer.visible_text())];
        }

        self.spawn_engagement(&msg.user_id);

        let follow_ups = answer.follow_ups().to_vec();
        let keyboard = if follow_ups.is_empty() {
            ReplyMarkupKind::MainMenu
        } else {
            ReplyMarkupKind::FollowUps(follow_ups)
        };
        match answer {
            Answer::Ok { visible_text, .. } => vec![Reply {
                text: visible_text,
                keyboard,
            }],
            Answer::Fallback { .. } => unreachable!("fallback handled above"),
        }
    }

    async fn open_agent_request(&self, msg: &InboundMessage, reason: &str) {
        let request_id = match self.store.create_agent_request(
            &msg.user_id,
            &msg.username,
            &msg.platform_handle,
            reason,
        ) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, user_id = %msg.user_id, "agent request insert failed");
                return;
            }
        };
        info!(request_id, user_id = %msg.user_id, "agent request opened");
        self.notify_owner(&format!(
            "🔔 בקשת נציג #{request_id}\n\nלקוח: {}\nמזהה: {}\nסיבה: {reason}",
            msg.username, msg.user_id
        ))
        .await;
    }

    async fn notify_owner(&self, notification: &str) {
        if self.owner_chat_id.is_empty() {
            return;
        }
        if let Err(e) = self
            .transport
            .send_text(&self.owner_chat_id, notification)
            .await
        {
            warn!(error = %e, "owner notification failed");
        }
    }

    fn persist(&self, msg: &InboundMessage, role: Role, text: &str, sources: &str) {
        if let Err(e) = self
            .store
            .save_message(&msg.user_id, &msg.username, role, text, sources)
        {
            warn!(error = %e, user_id = %msg.user_id, "failed to persist message");
        }
    }

    fn spawn_summarize(&self, user_id: &str) {
        let summarizer = Arc::clone(&self.summarizer);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            summarizer.maybe_summarize(&user_id).await;
        });
    }

    fn spawn_engagement(&self, user_id: &str) {
        let referral = Arc::clone(&self.referral);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            referral.engagement_check(&user_id).await;
        });
    }
}

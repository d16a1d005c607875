//! End-to-end orchestrator scenarios against in-memory storage, a scripted
//! LLM provider, and a recording transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use concierge_bot::orchestrator::{InboundMessage, Orchestrator, Reply, ReplyMarkupKind, UpdateKind};
use concierge_core::config::RateLimitConfig;
use concierge_core::text::{FALLBACK_RESPONSE, GREETING_REPLY, RATE_LIMIT_MINUTE};
use concierge_core::transport::{ChatTransport, SendError};
use concierge_hours::HoursService;
use concierge_llm::provider::{ChatMessage, ChatProvider, ProviderError};
use concierge_llm::{AnswerPipeline, Summarizer};
use concierge_rag::embedder::Embedder;
use concierge_rag::engine::RagParams;
use concierge_rag::IndexManager;
use concierge_services::{LiveChatService, RateLimiter, ReferralService, VacationService};
use concierge_store::types::{AgentRequestStatus, AppointmentStatus, Role, VacationMode};
use concierge_store::Store;

const OWNER_CHAT: &str = "999";

struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            calls: Mutex::new(0),
        })
    }

    fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        match self.responses.lock().unwrap().pop_front() {
            Some(text) => Ok(text),
            None => Err(ProviderError::Api {
                status: 500,
                message: "script exhausted".into(),
            }),
        }
    }
}

struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent_to(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

struct Fixture {
    orchestrator: Orchestrator,
    store: Arc<Store>,
    transport: Arc<RecordingTransport>,
    provider: Arc<ScriptedProvider>,
    _index_dir: tempfile::TempDir,
}

fn fixture(responses: &[&str]) -> Fixture {
    fixture_with_limits(
        responses,
        RateLimitConfig {
            per_minute: 10,
            per_hour: 50,
            per_day: 100,
        },
    )
}

fn fixture_with_limits(responses: &[&str], limits: RateLimitConfig) -> Fixture {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let index_dir = tempfile::tempdir().unwrap();
    let index = Arc::new(
        IndexManager::new(
            index_dir.path().to_path_buf(),
            Arc::clone(&store),
            Embedder::local_only(),
            RagParams {
                top_k: 10,
                min_relevance: -1.0,
                chunk_max_tokens: 300,
            },
        )
        .unwrap(),
    );
    let hours = Arc::new(HoursService::new(Arc::clone(&store)));
    let provider = ScriptedProvider::new(responses);
    let provider_dyn: Arc<dyn ChatProvider> = provider.clone();
    let pipeline = Arc::new(AnswerPipeline::new(
        Arc::clone(&provider_dyn),
        index,
        Arc::clone(&store),
        Arc::clone(&hours),
        "מספרה של דנה".to_string(),
        1024,
        10,
    ));
    let summarizer = Arc::new(Summarizer::new(
        Arc::clone(&store),
        Arc::clone(&provider_dyn),
        10,
    ));
    let transport = RecordingTransport::new();
    let transport_dyn: Arc<dyn ChatTransport> = transport.clone();
    let live_chat = Arc::new(LiveChatService::new(
        Arc::clone(&store),
        Arc::clone(&transport_dyn),
    ));
    let vacation = Arc::new(VacationService::new(Arc::clone(&store)));
    let referral = Arc::new(ReferralService::new(
        Arc::clone(&store),
        Arc::clone(&transport_dyn),
        "demo_bot".to_string(),
        10,
        20,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(&limits));

    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        pipeline,
        summarizer,
        rate_limiter,
        live_chat,
        vacation,
        referral,
        hours,
        transport_dyn,
        OWNER_CHAT.to_string(),
        "מספרה של דנה".to_string(),
        "Pricing:".to_string(),
    );

    Fixture {
        orchestrator,
        store,
        transport,
        provider,
        _index_dir: index_dir,
    }
}

fn user_text(text: &str) -> InboundMessage {
    InboundMessage {
        user_id: "100".to_string(),
        username: "Dana Levi".to_string(),
        platform_handle: "@dana".to_string(),
        text: text.to_string(),
        kind: UpdateKind::Text,
    }
}

fn command(text: &str) -> InboundMessage {
    InboundMessage {
        kind: UpdateKind::Command,
        ..user_text(text)
    }
}

fn callback(data: &str) -> InboundMessage {
    InboundMessage {
        kind: UpdateKind::InlineCallback,
        ..user_text(data)
    }
}

// ── Scenario: greeting short-circuit ─────────────────────────────────

#[tokio::test]
async fn greeting_short_circuits_without_llm() {
    let fx = fixture(&[]);
    let replies = fx.orchestrator.handle(user_text("שלום")).await;

    assert_eq!(replies, vec![Reply::menu(GREETING_REPLY)]);
    assert_eq!(fx.provider.call_count(), 0, "no LLM call for a greeting");

    let history = fx.store.history("100", 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "שלום");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].text, GREETING_REPLY);
}

// ── Scenario: pricing query with citation ────────────────────────────

#[tokio::test]
async fn pricing_answer_strips_citation_but_stores_it() {
    let fx = fixture(&["תספורת עולה 65 דולר.\nSource: Pricing — Summer 2025"]);
    fx.store
        .add_kb_entry("Pricing", "Summer 2025", "Haircut: $65")
        .unwrap();

    let replies = fx.orchestrator.handle(user_text("how much for a haircut?")).await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.contains("65"));
    assert!(!replies[0].text.contains("Source:"), "visible text has no citation");

    let history = fx.store.history("100", 10).unwrap();
    let stored = history.last().unwrap();
    assert!(stored.text.contains("Source:"), "raw text keeps the citation");
    assert!(stored.sources.contains("Pricing — Summer 2025"));
}

// ── Scenario: handoff on empty KB ────────────────────────────────────

#[tokio::test]
async fn empty_kb_hands_off_to_human() {
    let fx = fixture(&["מצטער, אין לי מידע על זה."]);

    let replies = fx.orchestrator.handle(user_text("do you offer manicures?")).await;
    assert_eq!(replies, vec![Reply::menu(FALLBACK_RESPONSE)]);

    let requests = fx.store.list_agent_requests(None).unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, AgentRequestStatus::Pending);
    assert!(requests[0].reason.contains("do you offer manicures?"));

    let gaps = fx.store.list_unanswered(true).unwrap();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].question, "do you offer manicures?");

    // The owner heard about it.
    let owner_msgs = fx.transport.sent_to(OWNER_CHAT);
    assert_eq!(owner_msgs.len(), 1);
    assert!(owner_msgs[0].contains("בקשת נציג"));
}

// ── Scenario: live-chat silence ──────────────────────────────────────

#[tokio::test]
async fn live_chat_silences_bot_but_keeps_messages() {
    let fx = fixture(&[]);
    fx.store.start_live_chat("100", "Dana Levi").unwrap();

    let first = fx.orchestrator.handle(user_text("hello?")).await;
    let second = fx.orchestrator.handle(user_text("hello??")).await;
    assert!(first.is_empty() && second.is_empty(), "bot stays silent");

    let history = fx.store.history("100", 10).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| m.role == Role::User));
    assert_eq!(fx.provider.call_count(), 0);
}

#[tokio::test]
async fn after_live_chat_ends_bot_resumes() {
    let fx = fixture(&[]);
    fx.store.start_live_chat("100", "Dana Levi").unwrap();
    fx.store.end_live_chat("100").unwrap();

    let replies = fx.orchestrator.handle(user_text("שלום")).await;
    assert_eq!(replies, vec![Reply::menu(GREETING_REPLY)]);
}

// ── Rate limiting ────────────────────────────────────────────────────

#[tokio::test]
async fn rate_limit_blocks_at_cap() {
    let fx = fixture_with_limits(
        &[],
        RateLimitConfig {
            per_minute: 1,
            per_hour: 50,
            per_day: 100,
        },
    );

    let ok = fx.orchestrator.handle(user_text("שלום")).await;
    assert_eq!(ok, vec![Reply::menu(GREETING_REPLY)]);

    let blocked = fx.orchestrator.handle(user_text("שלום")).await;
    assert_eq!(blocked, vec![Reply::menu(RATE_LIMIT_MINUTE)]);

    // The blocked message leaves no trace in history.
    let history = fx.store.history("100", 10).unwrap();
    assert_eq!(history.len(), 2);
}

// ── Booking dialog ───────────────────────────────────────────────────

#[tokio::test]
async fn booking_flow_persists_appointment_and_notifies_owner() {
    let fx = fixture(&["אנחנו מציעים תספורת וצבע.\nמקור: שירותים"]);
    fx.store
        .add_kb_entry("Services", "Price list", "Haircut, color")
        .unwrap();

    let start = fx.orchestrator.handle(command("/book")).await;
    assert!(start[0].text.contains("קביעת תור"));

    fx.orchestrator.handle(user_text("תספורת")).await;
    fx.orchestrator.handle(user_text("יום שני")).await;
    let confirm = fx.orchestrator.handle(user_text("10:00")).await;
    assert!(confirm[0].text.contains("תספורת"));
    assert!(confirm[0].text.contains("יום שני"));
    assert!(confirm[0].text.contains("10:00"));

    let done = fx.orchestrator.handle(user_text("כן")).await;
    assert!(done[0].text.contains("✅"));

    let appointments = fx.store.list_appointments(None).unwrap();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].service, "תספורת");
    assert_eq!(appointments[0].preferred_date, "יום שני");
    assert_eq!(appointments[0].preferred_time, "10:00");
    assert_eq!(appointments[0].status, AppointmentStatus::Pending);

    let owner_msgs = fx.transport.sent_to(OWNER_CHAT);
    assert!(owner_msgs.iter().any(|m| m.contains("בקשת תור חדשה")));
}

#[tokio::test]
async fn booking_declined_at_confirmation_saves_nothing() {
    let fx = fixture(&["אנחנו מציעים תספורת.\nמקור: שירותים"]);
    fx.store.add_kb_entry("Services", "List", "Haircut").unwrap();

    fx.orchestrator.handle(command("/book")).await;
    fx.orchestrator.handle(user_text("תספורת")).await;
    fx.orchestrator.handle(user_text("מחר")).await;
    fx.orchestrator.handle(user_text("12:00")).await;
    let declined = fx.orchestrator.handle(user_text("לא")).await;

    assert!(declined[0].text.contains("בוטלה"));
    assert!(fx.store.list_appointments(None).unwrap().is_empty());
}

#[tokio::test]
async fn booking_cancelled_mid_flow_with_command() {
    let fx = fixture(&["שירותים: תספורת.\nמקור: שירותים"]);
    fx.store.add_kb_entry("Services", "List", "Haircut").unwrap();

    fx.orchestrator.handle(command("/book")).await;
    let cancelled = fx.orchestrator.handle(command("/cancel")).await;
    assert!(cancelled[0].text.contains("ביטלנו"));

    // The next text routes through normal intent handling.
    let replies = fx.orchestrator.handle(user_text("שלום")).await;
    assert_eq!(replies, vec![Reply::menu(GREETING_REPLY)]);
}

#[tokio::test]
async fn booking_start_hands_off_when_services_unknown() {
    let fx = fixture(&["אין לי מושג מה אתם מוכרים."]);

    let replies = fx.orchestrator.handle(command("/book")).await;
    assert_eq!(replies, vec![Reply::menu(FALLBACK_RESPONSE)]);
    assert_eq!(fx.store.list_agent_requests(None).unwrap().len(), 1);

    // No dialog was left behind.
    let next = fx.orchestrator.handle(user_text("שלום")).await;
    assert_eq!(next, vec![Reply::menu(GREETING_REPLY)]);
}

// ── Vacation gating ──────────────────────────────────────────────────

#[tokio::test]
async fn vacation_blocks_booking_and_agent_requests() {
    let fx = fixture(&[]);
    fx.store
        .set_vacation_mode(&VacationMode {
            active: true,
            end_date: Some("2026-08-20".into()),
            custom_message: None,
        })
        .unwrap();

    let booking = fx.orchestrator.handle(command("/book")).await;
    assert!(booking[0].text.contains("2026-08-20"));
    assert!(fx.store.list_appointments(None).unwrap().is_empty());

    let agent = fx
        .orchestrator
        .handle(InboundMessage {
            kind: UpdateKind::MenuButton,
            text: "👤 דברו עם נציג".into(),
            ..user_text("")
        })
        .await;
    assert!(agent[0].text.contains("2026-08-20"));
    assert!(fx.store.list_agent_requests(None).unwrap().is_empty());
    assert_eq!(fx.provider.call_count(), 0);
}

// ── Cancellation confirmation ────────────────────────────────────────

#[tokio::test]
async fn cancel_intent_asks_then_yes_opens_request() {
    let fx = fixture(&[]);

    let ask = fx.orchestrator.handle(user_text("cancel my appointment")).await;
    assert_eq!(ask[0].keyboard, ReplyMarkupKind::CancelConfirm);

    let confirmed = fx.orchestrator.handle(callback("cancel_confirm_yes")).await;
    assert!(confirmed[0].text.contains("קיבלנו"));

    let requests = fx.store.list_agent_requests(None).unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].reason.contains("לבטל תור"));
}

#[tokio::test]
async fn cancel_intent_no_is_acknowledged() {
    let fx = fixture(&[]);
    fx.orchestrator.handle(user_text("לבטל את התור")).await;
    let declined = fx.orchestrator.handle(callback("cancel_confirm_no")).await;
    assert!(declined[0].text.contains("נשאר"));
    assert!(fx.store.list_agent_requests(None).unwrap().is_empty());
}

// ── Referral deep link ───────────────────────────────────────────────

#[tokio::test]
async fn start_with_referral_payload_registers() {
    let fx = fixture(&[]);
    fx.store.insert_referral("alice", "REF_AB12CD").unwrap();

    fx.orchestrator.handle(command("/start REF_AB12CD")).await;

    let referral = fx.store.referral_by_code("REF_AB12CD").unwrap().unwrap();
    assert_eq!(referral.referred_id.as_deref(), Some("100"));
}

// ── Follow-up suggestions ────────────────────────────────────────────

#[tokio::test]
async fn follow_ups_become_inline_keyboard() {
    let fx = fixture(&[
        "צבע שיער עולה 120 דולר.\nמקור: מחירון\n[follow_up: לקבוע תור? | עוד מחירים]",
    ]);
    fx.store.add_kb_entry("Pricing", "List", "Color: $120").unwrap();

    let replies = fx.orchestrator.handle(user_text("כמה עולה צבע?")).await;
    match &replies[0].keyboard {
        ReplyMarkupKind::FollowUps(questions) => {
            assert_eq!(questions, &vec!["לקבוע תור?".to_string(), "עוד מחירים".to_string()]);
        }
        other => panic!("expected follow-up keyboard, got {other:?}"),
    }
    assert!(!replies[0].text.contains("follow_up"));
}

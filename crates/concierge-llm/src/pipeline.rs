//! The grounded-answer pipeline.
//!
//! Three layers: persona rules (A), retrieved context plus live hours (B),
//! and the citation quality gate (C). The result is a typed [`Answer`] —
//! callers branch on the variant, never on response text.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};

use concierge_core::text::FALLBACK_RESPONSE;
use concierge_hours::HoursService;
use concierge_rag::engine::format_context;
use concierge_rag::IndexManager;
use concierge_store::types::Role;
use concierge_store::Store;

use crate::prompt::build_system_prompt;
use crate::provider::{ChatMessage, ChatProvider};

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(source|מקור):\s*.+").unwrap());
static CITATION_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*(source|מקור):[^\n]*$").unwrap());
static FOLLOW_UP_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?:follow_up|שאלות_המשך):\s*([^\]]+)\]").unwrap());
static FOLLOW_UP_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^(?:follow_up|שאלות_המשך):\s*(.+)$").unwrap());
static TRANSFER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)let me transfer you.*human agent|להעביר אתכם לנציג אנושי").unwrap()
});

const MAX_FOLLOW_UPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The answer failed the citation quality gate.
    NoCitation,
    /// The model itself chose the transfer-to-human path.
    ModelDeclined,
    /// The LLM provider was unreachable or errored.
    ProviderUnavailable,
}

#[derive(Debug, Clone)]
pub enum Answer {
    Ok {
        /// Full model output including the citation line — this is what gets
        /// persisted in the conversation history.
        raw_text: String,
        /// Customer-facing text with the citation line stripped.
        visible_text: String,
        sources: Vec<String>,
        chunks_used: usize,
        follow_ups: Vec<String>,
    },
    Fallback { reason: FallbackReason },
}

impl Answer {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Answer::Fallback { .. })
    }

    /// The text shown to the customer.
    pub fn visible_text(&self) -> &str {
        match self {
            Answer::Ok { visible_text, .. } => visible_text,
            Answer::Fallback { .. } => FALLBACK_RESPONSE,
        }
    }

    /// The text persisted in the conversation history.
    pub fn stored_text(&self) -> &str {
        match self {
            Answer::Ok { raw_text, .. } => raw_text,
            Answer::Fallback { .. } => FALLBACK_RESPONSE,
        }
    }

    pub fn sources_joined(&self) -> String {
        match self {
            Answer::Ok { sources, .. } => sources.join(", "),
            Answer::Fallback { .. } => String::new(),
        }
    }

    pub fn follow_ups(&self) -> &[String] {
        match self {
            Answer::Ok { follow_ups, .. } => follow_ups,
            Answer::Fallback { .. } => &[],
        }
    }
}

pub struct AnswerPipeline {
    provider: Arc<dyn ChatProvider>,
    index: Arc<IndexManager>,
    store: Arc<Store>,
    hours: Arc<HoursService>,
    business_name: String,
    max_tokens: u32,
    context_window: usize,
}

impl AnswerPipeline {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        index: Arc<IndexManager>,
        store: Arc<Store>,
        hours: Arc<HoursService>,
        business_name: String,
        max_tokens: u32,
        context_window: usize,
    ) -> Self {
        Self {
            provider,
            index,
            store,
            hours,
            business_name,
            max_tokens,
            context_window,
        }
    }

    /// Run the full pipeline for one customer query.
    pub async fn generate_answer(
        &self,
        user_id: Option<&str>,
        username: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Answer {
        // Layer B — retrieval. A failed retrieval degrades to an empty
        // context; the quality gate then routes the answer to the fallback.
        let chunks = match self.index.retrieve(query, top_k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "retrieval failed, continuing with empty context");
                Vec::new()
            }
        };
        let context = format_context(&chunks);
        let mut sources: Vec<String> = Vec::new();
        for c in &chunks {
            let label = format!("{} — {}", c.category, c.title);
            if !sources.contains(&label) {
                sources.push(label);
            }
        }

        let messages = self.build_messages(user_id, query, &context);

        let raw = match self
            .provider
            .complete(&messages, self.max_tokens, 0.3)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "LLM provider failed, returning fallback");
                return Answer::Fallback {
                    reason: FallbackReason::ProviderUnavailable,
                };
            }
        };

        // Post-processing: follow-ups out first, then the quality gate.
        let (text, follow_ups) = extract_follow_ups(&raw);

        if !CITATION_RE.is_match(&text) {
            warn!(
                preview = %text.chars().take(80).collect::<String>(),
                "quality gate failed: no source citation"
            );
            if let Some(user_id) = user_id {
                if let Err(e) = self.store.save_unanswered(user_id, username, query) {
                    warn!(error = %e, "failed to record unanswered question");
                }
            }
            return Answer::Fallback {
                reason: FallbackReason::NoCitation,
            };
        }

        let visible = strip_source_citation(&text);
        if TRANSFER_RE.is_match(&visible) {
            info!("model chose the human-transfer path");
            return Answer::Fallback {
                reason: FallbackReason::ModelDeclined,
            };
        }

        Answer::Ok {
            raw_text: text,
            visible_text: visible,
            sources,
            chunks_used: chunks.len(),
            follow_ups,
        }
    }

    fn build_messages(
        &self,
        user_id: Option<&str>,
        query: &str,
        context: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        // Layer A — persona from the current settings snapshot.
        let settings = self.store.bot_settings().unwrap_or_default();
        messages.push(ChatMessage::system(build_system_prompt(
            &settings,
            &self.business_name,
        )));

        // Layer B — retrieved context plus the live hours block.
        let mut context_block = format!(
            "מידע הקשר (השתמש רק במידע זה כדי לענות על שאלת הלקוח):\n\n{context}"
        );
        match self.hours.llm_context() {
            Ok(hours_block) => {
                context_block.push_str("\n\n--- שעות פעילות ---\n");
                context_block.push_str(&hours_block);
            }
            Err(e) => warn!(error = %e, "hours context unavailable"),
        }
        if let Ok(vacation) = self.store.vacation_mode() {
            if vacation.active {
                context_block.push_str("\n\nשימו לב: העסק נמצא כעת במצב חופשה.");
            }
        }
        context_block.push_str(
            "\n\nחשוב: בסס את תשובתך רק על המידע למעלה. \
             תמיד סיים את התשובה עם 'מקור: [שם המקור]' בציון ההקשר שבו השתמשת.",
        );
        messages.push(ChatMessage::system(context_block));

        // Conversation summary — continuity only, never a source of facts.
        if let Some(user_id) = user_id {
            if let Ok(Some(summary)) = self.store.latest_summary(user_id) {
                messages.push(ChatMessage::system(format!(
                    "סיכום השיחה הקודמת עם הלקוח (להמשכיות שיחה בלבד — \
                     אל תשתמש בסיכום זה כמקור לעובדות עסקיות כמו מחירים או שעות פתיחה; \
                     עובדות עסקיות מגיעות רק ממידע ההקשר למעלה):\n\n{}",
                    summary.summary_text
                )));
            }

            // Recent turns, oldest first.
            if self.context_window > 0 {
                if let Ok(history) = self.store.history(user_id, self.context_window) {
                    for msg in history {
                        messages.push(match msg.role {
                            Role::User => ChatMessage::user(msg.text),
                            Role::Assistant => ChatMessage::assistant(msg.text),
                        });
                    }
                }
            }
        }

        messages.push(ChatMessage::user(query.to_string()));
        messages
    }
}

/// Pull follow-up questions out of the model output. Tolerates both the
/// bracketed form and a bare `follow_up:` line; caps at three questions.
pub fn extract_follow_ups(text: &str) -> (String, Vec<String>) {
    let mut questions = Vec::new();
    let mut cleaned = text.to_string();

    for re in [&*FOLLOW_UP_BRACKET_RE, &*FOLLOW_UP_LINE_RE] {
        if let Some(caps) = re.captures(&cleaned) {
            if let Some(list) = caps.get(1) {
                questions.extend(
                    list.as_str()
                        .split('|')
                        .map(str::trim)
                        .filter(|q| !q.is_empty())
                        .map(str::to_string),
                );
            }
            cleaned = re.replace_all(&cleaned, "").to_string();
        }
        if !questions.is_empty() {
            break;
        }
    }

    questions.truncate(MAX_FOLLOW_UPS);
    (cleaned.trim().to_string(), questions)
}

/// Remove citation lines for the customer-facing text. The raw form stays
/// in the conversation history.
pub fn strip_source_citation(text: &str) -> String {
    let stripped = CITATION_LINE_RE.replace_all(text, "");
    // Collapse the blank runs left behind by removed lines.
    let mut out = String::with_capacity(stripped.len());
    let mut blank_run = 0;
    for line in stripped.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use concierge_rag::embedder::Embedder;
    use concierge_rag::engine::RagParams;

    use super::*;
    use crate::provider::ProviderError;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<String, ()>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<String, ()>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
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
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                _ => Err(ProviderError::Api {
                    status: 500,
                    message: "scripted failure".into(),
                }),
            }
        }
    }

    fn pipeline_with(
        dir: &std::path::Path,
        responses: Vec<Result<String, ()>>,
    ) -> (AnswerPipeline, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let index = Arc::new(
            IndexManager::new(
                dir.to_path_buf(),
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
        let pipeline = AnswerPipeline::new(
            Arc::new(ScriptedProvider::new(responses)),
            index,
            Arc::clone(&store),
            hours,
            "מספרה של דנה".to_string(),
            1024,
            10,
        );
        (pipeline, store)
    }

    #[tokio::test]
    async fn cited_answer_passes_and_citation_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = pipeline_with(
            dir.path(),
            vec![Ok("תספורת עולה 65 שקלים.\nמקור: מחירון קיץ 2025".into())],
        );
        store.add_kb_entry("Pricing", "Summer 2025", "Haircut: $65").unwrap();

        let answer = pipeline
            .generate_answer(Some("u1"), "Dana", "כמה עולה תספורת?", None)
            .await;
        match answer {
            Answer::Ok {
                raw_text,
                visible_text,
                sources,
                chunks_used,
                ..
            } => {
                assert!(raw_text.contains("מקור:"));
                assert!(!visible_text.contains("מקור:"));
                assert!(visible_text.contains("65"));
                assert_eq!(chunks_used, 1);
                assert_eq!(sources, vec!["Pricing — Summer 2025".to_string()]);
            }
            other => panic!("expected Ok answer, got {other:?}"),
        }
        assert!(store.list_unanswered(true).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_citation_becomes_fallback_with_knowledge_gap() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) =
            pipeline_with(dir.path(), vec![Ok("אולי כן ואולי לא, קשה לדעת.".into())]);

        let answer = pipeline
            .generate_answer(Some("u1"), "Dana", "do you offer manicures?", None)
            .await;
        assert!(matches!(
            answer,
            Answer::Fallback {
                reason: FallbackReason::NoCitation
            }
        ));
        assert_eq!(answer.visible_text(), FALLBACK_RESPONSE);

        let gaps = store.list_unanswered(true).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].question, "do you offer manicures?");
    }

    #[tokio::test]
    async fn provider_failure_is_fallback_without_knowledge_gap() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, store) = pipeline_with(dir.path(), vec![Err(())]);

        let answer = pipeline
            .generate_answer(Some("u1"), "Dana", "שאלה כלשהי", None)
            .await;
        assert!(matches!(
            answer,
            Answer::Fallback {
                reason: FallbackReason::ProviderUnavailable
            }
        ));
        assert!(store.list_unanswered(true).unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_transfer_phrase_is_typed_as_declined() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _store) = pipeline_with(
            dir.path(),
            vec![Ok(
                "אין לי מושג, תנו לי להעביר אתכם לנציג אנושי.\nמקור: כללי".into()
            )],
        );

        let answer = pipeline.generate_answer(Some("u1"), "Dana", "שאלה", None).await;
        assert!(matches!(
            answer,
            Answer::Fallback {
                reason: FallbackReason::ModelDeclined
            }
        ));
    }

    #[test]
    fn follow_ups_extracted_and_capped() {
        let raw = "התשובה.\nמקור: מחירון\n[follow_up: אחת | שתיים | שלוש | ארבע]";
        let (text, follow_ups) = extract_follow_ups(raw);
        assert!(!text.contains("follow_up"));
        assert_eq!(follow_ups, vec!["אחת", "שתיים", "שלוש"]);
    }

    #[test]
    fn unbracketed_follow_up_line_tolerated() {
        let raw = "התשובה.\nמקור: מחירון\nfollow_up: לקבוע תור? | מחירים";
        let (_, follow_ups) = extract_follow_ups(raw);
        assert_eq!(follow_ups.len(), 2);
    }

    #[test]
    fn hebrew_follow_up_label_tolerated() {
        let raw = "התשובה.\n[שאלות_המשך: לקבוע תור? | עוד מידע]";
        let (text, follow_ups) = extract_follow_ups(raw);
        assert_eq!(follow_ups.len(), 2);
        assert!(!text.contains("שאלות_המשך"));
    }

    #[test]
    fn citation_strip_keeps_body() {
        let raw = "שורה ראשונה.\n\nמקור: מחירון קיץ";
        let visible = strip_source_citation(raw);
        assert_eq!(visible, "שורה ראשונה.");

        let english = "First line.\nSource: price list";
        assert_eq!(strip_source_citation(english), "First line.");
    }
}

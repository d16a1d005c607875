//! Recursive conversation summarization.
//!
//! One summary row per user, merged forward: when enough unsummarized
//! messages accumulate, the oldest window is folded into the existing
//! summary and the high-water mark advances to the last folded id. The mark
//! only moves on provider success, so a failed merge retries the same
//! window next time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use concierge_store::types::Role;
use concierge_store::Store;

use crate::provider::{ChatMessage, ChatProvider};

/// Bounded size of the per-user lock registry.
const MAX_LOCKS: usize = 1000;

const SUMMARY_MAX_TOKENS: u32 = 500;

pub struct Summarizer {
    store: Arc<Store>,
    provider: Arc<dyn ChatProvider>,
    threshold: usize,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Summarizer {
    pub fn new(store: Arc<Store>, provider: Arc<dyn ChatProvider>, threshold: usize) -> Self {
        Self {
            store,
            provider,
            threshold,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Summarize the user's backlog if it reached the threshold. Spawned
    /// fire-and-forget after each assistant reply; silently skips when
    /// another summarization for the same user is already running.
    pub async fn maybe_summarize(&self, user_id: &str) {
        let lock = self.user_lock(user_id);
        let Ok(_guard) = lock.try_lock() else {
            return;
        };

        let count = match self.store.unsummarized_count(user_id) {
            Ok(n) => n as usize,
            Err(e) => {
                warn!(error = %e, user_id, "unsummarized count failed");
                return;
            }
        };
        if count < self.threshold {
            return;
        }

        let window = match self.store.oldest_unsummarized(user_id, self.threshold) {
            Ok(msgs) if !msgs.is_empty() => msgs,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, user_id, "loading summarization window failed");
                return;
            }
        };
        let last_id = window.iter().map(|m| m.id).max().unwrap_or(0);

        let existing = self
            .store
            .latest_summary(user_id)
            .ok()
            .flatten()
            .map(|s| s.summary_text);

        let transcript: String = window
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "לקוח",
                    Role::Assistant => "נציג",
                };
                format!("{speaker}: {}", m.text)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = String::from(
            "אתה עוזר שמסכם שיחות שירות לקוחות.\n\
             צור סיכום תמציתי של השיחה שלהלן. שמור על הנקודות העיקריות:\n\
             - מה הלקוח שאל או ביקש\n\
             - מה היו התשובות העיקריות\n\
             - החלטות או פעולות שנעשו\n\
             - העדפות או מידע חשוב על הלקוח\n\n\
             חשוב: אל תכלול עובדות עסקיות (כמו מחירים, שעות פתיחה, כתובת). \
             התמקד רק בהעדפות הלקוח, בקשותיו, והמשכיות השיחה.\n\n",
        );
        if let Some(existing) = &existing {
            prompt.push_str(&format!("סיכום קודם של השיחה:\n{existing}\n\n"));
        }
        prompt.push_str(&format!("הודעות חדשות:\n{transcript}\n\nסיכום:"));

        let summary = match self
            .provider
            .complete(&[ChatMessage::user(prompt)], SUMMARY_MAX_TOKENS, 0.3)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                // The window stays unsummarized and retries next trigger.
                warn!(error = %e, user_id, "summary generation failed, mark not advanced");
                return;
            }
        };

        match self
            .store
            .save_summary(user_id, &summary, window.len() as i64, last_id)
        {
            Ok(()) => info!(user_id, folded = window.len(), last_id, "conversation summarized"),
            Err(e) => warn!(error = %e, user_id, "saving summary failed"),
        }
    }

    /// Get or create the user's lock, evicting unlocked entries when the
    /// registry is full. Entries whose lock is currently held survive; the
    /// map may transiently exceed capacity if every entry is busy.
    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        if let Some(lock) = locks.get(user_id) {
            return Arc::clone(lock);
        }

        if locks.len() >= MAX_LOCKS {
            let evictable: Vec<String> = locks
                .iter()
                .filter(|(_, lock)| lock.try_lock().is_ok())
                .map(|(uid, _)| uid.clone())
                .collect();
            let excess = locks.len() + 1 - MAX_LOCKS;
            for uid in evictable.into_iter().take(excess) {
                locks.remove(&uid);
            }
        }

        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(user_id.to_string(), Arc::clone(&lock));
        lock
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::provider::ProviderError;

    struct FixedProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FixedProvider {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ChatProvider for FixedProvider {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProviderError::Api {
                    status: 500,
                    message: "down".into(),
                })
            } else {
                Ok("הלקוח מעדיף תורים בבוקר.".to_string())
            }
        }
    }

    fn seed_messages(store: &Store, user: &str, count: usize) -> i64 {
        let mut last = 0;
        for i in 0..count {
            last = store
                .save_message(user, "Dana", Role::User, &format!("הודעה {i}"), "")
                .unwrap();
        }
        last
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let provider = Arc::new(FixedProvider::ok());
        let summarizer = Summarizer::new(Arc::clone(&store), provider.clone(), 10);

        seed_messages(&store, "u1", 9);
        summarizer.maybe_summarize("u1").await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(store.latest_summary("u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn threshold_reached_summarizes_exactly_one_window() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let provider = Arc::new(FixedProvider::ok());
        let summarizer = Summarizer::new(Arc::clone(&store), provider.clone(), 10);

        let last = seed_messages(&store, "u1", 10);
        summarizer.maybe_summarize("u1").await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        let summary = store.latest_summary("u1").unwrap().unwrap();
        assert_eq!(summary.last_summarized_message_id, last);
        assert_eq!(summary.cumulative_message_count, 10);
        assert_eq!(store.unsummarized_count("u1").unwrap(), 0);

        // Nothing new — another trigger is a no-op.
        summarizer.maybe_summarize("u1").await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failure_keeps_window_for_retry() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let summarizer = Summarizer::new(
            Arc::clone(&store),
            Arc::new(FixedProvider::failing()),
            10,
        );

        seed_messages(&store, "u1", 10);
        summarizer.maybe_summarize("u1").await;

        assert!(store.latest_summary("u1").unwrap().is_none());
        assert_eq!(store.unsummarized_count("u1").unwrap(), 10);
    }

    #[tokio::test]
    async fn recursive_merge_advances_mark_by_window() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let provider = Arc::new(FixedProvider::ok());
        let summarizer = Summarizer::new(Arc::clone(&store), provider.clone(), 5);

        seed_messages(&store, "u1", 5);
        summarizer.maybe_summarize("u1").await;
        let first = store.latest_summary("u1").unwrap().unwrap();

        seed_messages(&store, "u1", 5);
        summarizer.maybe_summarize("u1").await;
        let second = store.latest_summary("u1").unwrap().unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(second.last_summarized_message_id > first.last_summarized_message_id);
        assert_eq!(second.cumulative_message_count, 10);
    }

    #[tokio::test]
    async fn concurrent_run_for_same_user_is_skipped() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let provider = Arc::new(FixedProvider::ok());
        let summarizer = Summarizer::new(Arc::clone(&store), provider.clone(), 1);

        seed_messages(&store, "u1", 3);

        let lock = summarizer.user_lock("u1");
        let _held = lock.lock().await;
        summarizer.maybe_summarize("u1").await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0, "skipped while locked");
    }
}

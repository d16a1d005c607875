//! The guided booking dialog: a five-state linear machine per user.
//!
//! Service, date, and time are captured verbatim — no parsing. State lives
//! in memory only; a restart simply drops half-finished dialogs.

use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingState {
    AskService,
    AskDate {
        service: String,
    },
    AskTime {
        service: String,
        date: String,
    },
    Confirm {
        service: String,
        date: String,
        time: String,
    },
}

#[derive(Default)]
pub struct BookingStates {
    states: DashMap<String, BookingState>,
}

impl BookingStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<BookingState> {
        self.states.get(user_id).map(|s| s.clone())
    }

    pub fn set(&self, user_id: &str, state: BookingState) {
        self.states.insert(user_id.to_string(), state);
    }

    pub fn clear(&self, user_id: &str) -> bool {
        self.states.remove(user_id).is_some()
    }

    pub fn is_active(&self, user_id: &str) -> bool {
        self.states.contains_key(user_id)
    }
}

/// "yes" in the confirmation step, bilingual.
pub fn is_confirmation(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "yes" | "y" | "confirm" | "כן" | "כן!" | "אישור" | "מאשר" | "מאשרת"
    )
}

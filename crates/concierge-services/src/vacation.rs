//! Vacation mode: a singleton flag plus templated customer messages.
//!
//! While active, booking attempts and agent requests get a vacation reply;
//! general knowledge questions keep working.

use std::sync::Arc;

use concierge_core::text;
use concierge_store::types::VacationMode;
use concierge_store::{Result, Store};

pub struct VacationService {
    store: Arc<Store>,
}

impl VacationService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn is_active(&self) -> bool {
        self.store
            .vacation_mode()
            .map(|m| m.active)
            .unwrap_or(false)
    }

    pub fn settings(&self) -> Result<VacationMode> {
        self.store.vacation_mode()
    }

    pub fn update(&self, mode: &VacationMode) -> Result<()> {
        self.store.set_vacation_mode(mode)
    }

    /// Reply for a customer trying to book while vacation mode is on.
    pub fn booking_message(&self) -> String {
        let mode = self.store.vacation_mode().unwrap_or_default();
        text::vacation_booking_message(mode.custom_message.as_deref(), mode.end_date.as_deref())
    }

    /// Reply for a customer asking for a human while vacation mode is on.
    pub fn agent_message(&self) -> String {
        let mode = self.store.vacation_mode().unwrap_or_default();
        text::vacation_agent_message(mode.end_date.as_deref())
    }
}

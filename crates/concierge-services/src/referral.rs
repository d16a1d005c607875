//! Referral lifecycle: code generation, registration, completion, and the
//! atomic send flow shared by the bot and the admin panel.

use std::sync::{Arc, LazyLock};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use concierge_core::text::referral_message;
use concierge_core::transport::ChatTransport;
use concierge_store::types::Referral;
use concierge_store::{Result, Store};

/// Deep-link payload shape accepted from `/start`.
pub static REFERRAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^REF_[A-Z0-9]{6,}$").unwrap());

/// Discount percentage minted for each party on completion.
const CREDIT_PERCENT: i64 = 10;
/// Credits expire this long after the referral completes.
const CREDIT_VALIDITY_DAYS: i64 = 60;
/// Collision-retry budget for code derivation.
const MAX_CODE_ATTEMPTS: u32 = 10;

pub struct ReferralService {
    store: Arc<Store>,
    transport: Arc<dyn ChatTransport>,
    bot_username: String,
    engaged_burst: usize,
    engaged_daily: usize,
}

impl ReferralService {
    pub fn new(
        store: Arc<Store>,
        transport: Arc<dyn ChatTransport>,
        bot_username: String,
        engaged_burst: usize,
        engaged_daily: usize,
    ) -> Self {
        Self {
            store,
            transport,
            bot_username,
            engaged_burst,
            engaged_daily,
        }
    }

    pub fn is_referral_payload(text: &str) -> bool {
        REFERRAL_CODE_RE.is_match(text)
    }

    /// Idempotent: the user's existing code is returned when there is one,
    /// otherwise a fresh code is derived with collision retry.
    pub fn generate_code(&self, user_id: &str) -> Result<String> {
        if let Some(existing) = self.store.referral_by_referrer(user_id)? {
            return Ok(existing.code);
        }

        for attempt in 0..MAX_CODE_ATTEMPTS {
            let code = derive_code(user_id, attempt);
            if self.store.referral_code_exists(&code)? {
                continue;
            }
            match self.store.insert_referral(user_id, &code) {
                Ok(_) => {
                    info!(user_id, code, "referral code generated");
                    return Ok(code);
                }
                Err(e) => {
                    // Lost a race: either this user got a row concurrently or
                    // the code collided after the existence check.
                    if let Some(existing) = self.store.referral_by_referrer(user_id)? {
                        return Ok(existing.code);
                    }
                    warn!(error = %e, attempt, "referral insert collided, retrying");
                }
            }
        }
        // Hash collisions this deep mean something is broken upstream.
        Err(concierge_store::StoreError::invalid(
            "code",
            "could not derive a unique referral code",
        ))
    }

    /// Register a referred user from a deep-link payload. No-op unless all
    /// guards hold (valid code, not self, slot free, not already referred).
    pub fn register(&self, code: &str, new_user: &str) -> Result<bool> {
        if !Self::is_referral_payload(code) {
            return Ok(false);
        }
        let registered = self.store.register_referred(code, new_user)?;
        if registered {
            info!(code, new_user, "referral registered");
        }
        Ok(registered)
    }

    /// Called when a referred user's appointment is confirmed: marks the
    /// referral completed and mints both 10% credits.
    pub fn complete(&self, referred_user: &str) -> Result<Option<Referral>> {
        let expires_at = (Utc::now() + Duration::days(CREDIT_VALIDITY_DAYS)).to_rfc3339();
        let completed = self
            .store
            .complete_referral(referred_user, CREDIT_PERCENT, &expires_at)?;
        if let Some(referral) = &completed {
            info!(
                code = %referral.code,
                referrer = %referral.referrer_id,
                referred_user,
                "referral completed, credits minted"
            );
        }
        Ok(completed)
    }

    pub fn build_link(&self, code: &str) -> String {
        if self.bot_username.is_empty() {
            code.to_string()
        } else {
            format!("https://t.me/{}?start={}", self.bot_username, code)
        }
    }

    /// The atomic send flow: generate → mark-sent → deliver → unmark on
    /// failure. Returns whether the message went out this call.
    pub async fn try_send_code(&self, user_id: &str) -> Result<bool> {
        let code = self.generate_code(user_id)?;

        if !self.store.mark_referral_sent(user_id)? {
            return Ok(false);
        }

        let text = referral_message(&self.build_link(&code));
        match self.transport.send_text(user_id, &text).await {
            Ok(()) => {
                info!(user_id, code, "referral code sent");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, user_id, "referral send failed, resetting sent flag");
                self.store.unmark_referral_sent(user_id)?;
                Ok(false)
            }
        }
    }

    /// Post-answer engagement check: users without a code who message
    /// heavily get offered one.
    pub async fn engagement_check(&self, user_id: &str) {
        let already_has_code = match self.store.referral_by_referrer(user_id) {
            Ok(referral) => referral.is_some(),
            Err(e) => {
                warn!(error = %e, user_id, "engagement check: referral lookup failed");
                return;
            }
        };
        if already_has_code {
            return;
        }

        let now = Utc::now();
        let burst_cutoff = (now - Duration::minutes(30)).to_rfc3339();
        let daily_cutoff = (now - Duration::hours(24)).to_rfc3339();

        let burst = self
            .store
            .user_message_count_since(user_id, &burst_cutoff)
            .unwrap_or(0) as usize;
        let daily = self
            .store
            .user_message_count_since(user_id, &daily_cutoff)
            .unwrap_or(0) as usize;

        if burst >= self.engaged_burst || daily >= self.engaged_daily {
            info!(user_id, burst, daily, "engaged user, offering referral code");
            if let Err(e) = self.try_send_code(user_id).await {
                warn!(error = %e, user_id, "engagement referral send failed");
            }
        }
    }
}

fn derive_code(user_id: &str, attempt: u32) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(nanos.to_be_bytes());
    hasher.update(attempt.to_be_bytes());
    let digest = hex::encode_upper(hasher.finalize());
    format!("REF_{}", &digest[..6])
}

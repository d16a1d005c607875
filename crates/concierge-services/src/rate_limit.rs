//! In-memory per-user sliding-window rate limiting.
//!
//! Three windows (minute / hour / day), each with its own canned reply.
//! State is a per-user deque of epoch-second timestamps; it resets on
//! restart, which is acceptable for the abuse profile of a small-business
//! bot. `check` never records — callers record only after deciding the
//! message will actually be processed.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::info;

use concierge_core::config::RateLimitConfig;
use concierge_core::text::{RATE_LIMIT_DAY, RATE_LIMIT_HOUR, RATE_LIMIT_MINUTE};

const DAY_SECS: u64 = 86_400;

pub struct RateLimiter {
    windows: [(u64, usize, &'static str); 3],
    timestamps: DashMap<String, VecDeque<u64>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: [
                (60, config.per_minute, RATE_LIMIT_MINUTE),
                (3_600, config.per_hour, RATE_LIMIT_HOUR),
                (DAY_SECS, config.per_day, RATE_LIMIT_DAY),
            ],
            timestamps: DashMap::new(),
        }
    }

    /// The canned reply for the first exceeded window, or `None` when the
    /// user is within every limit.
    pub fn check(&self, user_id: &str) -> Option<&'static str> {
        self.check_at(user_id, now_epoch())
    }

    pub fn record(&self, user_id: &str) {
        self.record_at(user_id, now_epoch());
    }

    fn check_at(&self, user_id: &str, now: u64) -> Option<&'static str> {
        let mut entry = self.timestamps.entry(user_id.to_string()).or_default();
        prune(&mut entry, now);

        for (window_secs, max_messages, message) in self.windows {
            let cutoff = now.saturating_sub(window_secs);
            let count = entry.iter().filter(|&&ts| ts >= cutoff).count();
            if count >= max_messages {
                info!(
                    user_id,
                    count, window_secs, limit = max_messages, "rate limit hit"
                );
                return Some(message);
            }
        }
        None
    }

    fn record_at(&self, user_id: &str, now: u64) {
        self.timestamps
            .entry(user_id.to_string())
            .or_default()
            .push_back(now);
    }
}

fn prune(timestamps: &mut VecDeque<u64>, now: u64) {
    let cutoff = now.saturating_sub(DAY_SECS);
    while timestamps.front().is_some_and(|&ts| ts < cutoff) {
        timestamps.pop_front();
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//! Business services that sit between storage and the chat adapter:
//! intent classification, rate limiting, live-chat takeover, vacation mode,
//! referrals, and the broadcast worker.

pub mod broadcast;
pub mod intent;
pub mod live_chat;
pub mod rate_limit;
pub mod referral;
pub mod vacation;

pub use broadcast::{BroadcastInput, Dispatcher};
pub use intent::Intent;
pub use live_chat::LiveChatService;
pub use rate_limit::RateLimiter;
pub use referral::ReferralService;
pub use vacation::VacationService;

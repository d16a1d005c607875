//! Telegram-facing bot: the per-message orchestrator, the booking dialog,
//! keyboards, outbound send helpers, and the teloxide dispatcher wiring.

pub mod adapter;
pub mod booking;
pub mod handler;
pub mod keyboards;
pub mod orchestrator;
pub mod send;

pub use adapter::TelegramAdapter;
pub use orchestrator::{InboundMessage, Orchestrator, Reply, UpdateKind};
pub use send::TelegramTransport;

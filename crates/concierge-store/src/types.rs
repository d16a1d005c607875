use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct KbEntry {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub content: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A stored chunk of a KB entry, with its cached embedding bytes
/// (little-endian f32, unit length) when one has been computed.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub entry_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Option<Vec<u8>>,
}

/// Chunk data produced by a rebuild, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub text: String,
    pub sources: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub user_id: String,
    pub summary_text: String,
    pub cumulative_message_count: i64,
    pub last_summarized_message_id: i64,
    pub created_at: String,
}

/// One row per distinct user for the admin conversations view.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub last_active: String,
    pub message_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRequestStatus {
    Pending,
    Handled,
    Dismissed,
}

impl fmt::Display for AgentRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentRequestStatus::Pending => "pending",
            AgentRequestStatus::Handled => "handled",
            AgentRequestStatus::Dismissed => "dismissed",
        })
    }
}

impl FromStr for AgentRequestStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AgentRequestStatus::Pending),
            "handled" => Ok(AgentRequestStatus::Handled),
            "dismissed" => Ok(AgentRequestStatus::Dismissed),
            other => Err(format!("unknown agent request status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub platform_handle: String,
    pub reason: String,
    pub status: AgentRequestStatus,
    pub created_at: String,
    pub handled_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        })
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Appointment {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub platform_handle: String,
    pub service: String,
    pub preferred_date: String,
    pub preferred_time: String,
    pub notes: String,
    pub status: AppointmentStatus,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct LiveChatSession {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub active: bool,
    pub started_at: String,
    pub ended_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UnansweredQuestion {
    pub id: i64,
    pub user_id: String,
    pub username: String,
    pub question: String,
    pub status: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BusinessHours {
    /// Israeli convention: 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub struct SpecialDay {
    pub id: i64,
    /// ISO date, e.g. "2026-09-23".
    pub date: String,
    pub name: String,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub closed: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Default)]
pub struct VacationMode {
    pub active: bool,
    pub end_date: Option<String>,
    pub custom_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralStatus {
    Pending,
    Completed,
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::Completed => "completed",
        })
    }
}

impl FromStr for ReferralStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReferralStatus::Pending),
            "completed" => Ok(ReferralStatus::Completed),
            other => Err(format!("unknown referral status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Referral {
    pub id: i64,
    pub referrer_id: String,
    pub referred_id: Option<String>,
    pub code: String,
    pub status: ReferralStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub sent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditType {
    Referrer,
    Referred,
}

impl fmt::Display for CreditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CreditType::Referrer => "referrer",
            CreditType::Referred => "referred",
        })
    }
}

impl FromStr for CreditType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "referrer" => Ok(CreditType::Referrer),
            "referred" => Ok(CreditType::Referred),
            other => Err(format!("unknown credit type: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credit {
    pub id: i64,
    pub user_id: String,
    /// Discount percentage.
    pub amount: i64,
    pub credit_type: CreditType,
    pub reason: String,
    pub used: bool,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    Queued,
    Sending,
    Completed,
    Failed,
}

impl fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BroadcastStatus::Queued => "queued",
            BroadcastStatus::Sending => "sending",
            BroadcastStatus::Completed => "completed",
            BroadcastStatus::Failed => "failed",
        })
    }
}

impl FromStr for BroadcastStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(BroadcastStatus::Queued),
            "sending" => Ok(BroadcastStatus::Sending),
            "completed" => Ok(BroadcastStatus::Completed),
            "failed" => Ok(BroadcastStatus::Failed),
            other => Err(format!("unknown broadcast status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Broadcast {
    pub id: i64,
    pub text: String,
    pub audience_label: String,
    pub recipient_count: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    pub status: BroadcastStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Friendly,
    Formal,
    Sales,
    Luxury,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tone::Friendly => "friendly",
            Tone::Formal => "formal",
            Tone::Sales => "sales",
            Tone::Luxury => "luxury",
        })
    }
}

impl FromStr for Tone {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friendly" => Ok(Tone::Friendly),
            "formal" => Ok(Tone::Formal),
            "sales" => Ok(Tone::Sales),
            "luxury" => Ok(Tone::Luxury),
            other => Err(format!("unknown tone: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotSettings {
    pub tone: Tone,
    /// Business-specific phrases ("DNA") folded into the persona prompt.
    pub custom_phrases: String,
    pub follow_up_enabled: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            tone: Tone::Friendly,
            custom_phrases: String::new(),
            follow_up_enabled: false,
        }
    }
}

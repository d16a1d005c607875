use std::path::PathBuf;

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::error::{ConciergeError, Result};

/// Top-level configuration, assembled from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub memory: MemoryConfig,
    pub rate_limit: RateLimitConfig,
    pub referral: ReferralConfig,
    pub admin: AdminConfig,
    pub business: BusinessConfig,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub index_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub owner_chat_id: String,
    /// Bot username without "@" — used to build referral deep links.
    pub bot_username: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub follow_up_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub min_relevance: f32,
    pub chunk_max_tokens: usize,
    /// Prepended to the query when the pricing intent fires.
    pub pricing_hint: String,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub context_window: usize,
    pub summary_threshold: usize,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub per_minute: usize,
    pub per_hour: usize,
    pub per_day: usize,
}

#[derive(Debug, Clone)]
pub struct ReferralConfig {
    /// Messages within 30 minutes that mark a user as engaged.
    pub engaged_burst: usize,
    /// Messages within 24 hours that mark a user as engaged.
    pub engaged_daily: usize,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    pub password_hash: String,
    pub secret_key: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct BusinessConfig {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub website: String,
}

/// Flat mirror of the supported environment variables. Extracted via figment
/// so tests can layer overrides the same way the process environment does.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvVars {
    data_dir: Option<String>,
    db_path: Option<String>,
    faiss_index_path: Option<String>,

    telegram_bot_token: Option<String>,
    #[serde(deserialize_with = "stringish", default)]
    telegram_owner_chat_id: Option<String>,
    telegram_bot_username: Option<String>,

    openai_api_key: Option<String>,
    openai_base_url: Option<String>,
    openai_model: Option<String>,
    embedding_model: Option<String>,
    llm_max_tokens: Option<u32>,
    follow_up_enabled: Option<String>,

    rag_top_k: Option<usize>,
    rag_min_relevance: Option<f32>,
    chunk_max_tokens: Option<usize>,
    rag_pricing_hint: Option<String>,

    context_window_size: Option<usize>,
    summary_threshold: Option<usize>,

    rate_limit_per_minute: Option<usize>,
    rate_limit_per_hour: Option<usize>,
    rate_limit_per_day: Option<usize>,

    referral_engaged_burst: Option<usize>,
    referral_engaged_daily: Option<usize>,

    admin_username: Option<String>,
    #[serde(deserialize_with = "stringish", default)]
    admin_password: Option<String>,
    admin_password_hash: Option<String>,
    #[serde(deserialize_with = "stringish", default)]
    admin_secret_key: Option<String>,
    admin_host: Option<String>,
    admin_port: Option<u16>,
    port: Option<u16>,

    business_name: Option<String>,
    #[serde(deserialize_with = "stringish", default)]
    business_phone: Option<String>,
    business_address: Option<String>,
    business_website: Option<String>,
}

/// Env values that look numeric get parsed as numbers by the provider;
/// chat ids, phone numbers, and passwords must come back as strings anyway.
fn stringish<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Num(f64),
        Bool(bool),
    }
    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Num(n) => n.to_string(),
        Raw::Bool(b) => b.to_string(),
    }))
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        let vars: EnvVars = Figment::new()
            .merge(Env::raw())
            .extract()
            .map_err(|e| ConciergeError::Config(e.to_string()))?;
        Ok(Self::from_vars(vars))
    }

    fn from_vars(vars: EnvVars) -> Self {
        let data_dir = PathBuf::from(vars.data_dir.unwrap_or_else(|| "data".to_string()));
        let db_path = vars
            .db_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("chatbot.db"));
        let index_dir = vars
            .faiss_index_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("faiss_index"));

        Config {
            paths: PathsConfig {
                data_dir,
                db_path,
                index_dir,
            },
            telegram: TelegramConfig {
                bot_token: vars.telegram_bot_token.unwrap_or_default(),
                owner_chat_id: vars.telegram_owner_chat_id.unwrap_or_default(),
                bot_username: vars.telegram_bot_username.unwrap_or_default(),
            },
            llm: LlmConfig {
                api_key: vars.openai_api_key.unwrap_or_default(),
                base_url: vars
                    .openai_base_url
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
                model: vars.openai_model.unwrap_or_else(|| "gpt-4.1-mini".to_string()),
                embedding_model: vars
                    .embedding_model
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                max_tokens: vars.llm_max_tokens.unwrap_or(1024),
                follow_up_enabled: vars
                    .follow_up_enabled
                    .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                    .unwrap_or(false),
            },
            rag: RagConfig {
                top_k: vars.rag_top_k.unwrap_or(10),
                min_relevance: vars.rag_min_relevance.unwrap_or(0.3),
                chunk_max_tokens: vars.chunk_max_tokens.unwrap_or(300),
                pricing_hint: vars.rag_pricing_hint.unwrap_or_else(|| "Pricing:".to_string()),
            },
            memory: MemoryConfig {
                context_window: vars.context_window_size.unwrap_or(10),
                summary_threshold: vars.summary_threshold.unwrap_or(10),
            },
            rate_limit: RateLimitConfig {
                per_minute: vars.rate_limit_per_minute.unwrap_or(10),
                per_hour: vars.rate_limit_per_hour.unwrap_or(50),
                per_day: vars.rate_limit_per_day.unwrap_or(100),
            },
            referral: ReferralConfig {
                engaged_burst: vars.referral_engaged_burst.unwrap_or(10),
                engaged_daily: vars.referral_engaged_daily.unwrap_or(20),
            },
            admin: AdminConfig {
                username: vars.admin_username.unwrap_or_else(|| "admin".to_string()),
                password: vars.admin_password.unwrap_or_default(),
                password_hash: vars.admin_password_hash.unwrap_or_default(),
                secret_key: vars.admin_secret_key.unwrap_or_default(),
                host: vars.admin_host.unwrap_or_else(|| "0.0.0.0".to_string()),
                port: vars.admin_port.or(vars.port).unwrap_or(5000),
            },
            business: BusinessConfig {
                name: vars
                    .business_name
                    .unwrap_or_else(|| "Dana's Beauty Salon".to_string()),
                phone: vars.business_phone.unwrap_or_default(),
                address: vars.business_address.unwrap_or_default(),
                website: vars.business_website.unwrap_or_default(),
            },
        }
    }

    /// Fail fast when the admin panel cannot be run securely.
    pub fn validate_admin(&self) -> Result<()> {
        if self.admin.secret_key.is_empty() {
            return Err(ConciergeError::Config(
                "ADMIN_SECRET_KEY must be set (required for session signing)".into(),
            ));
        }
        if self.admin.username.is_empty() {
            return Err(ConciergeError::Config("ADMIN_USERNAME must be set".into()));
        }
        if self.admin.password.is_empty() && self.admin.password_hash.is_empty() {
            return Err(ConciergeError::Config(
                "either ADMIN_PASSWORD_HASH (recommended) or ADMIN_PASSWORD must be set".into(),
            ));
        }
        Ok(())
    }
}

//! Composition root: wires storage, the RAG index, the LLM pipeline, the
//! services, the Telegram adapter, and the admin panel into one process.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use teloxide::Bot;
use tracing::{error, info, warn};

use concierge_admin::AdminState;
use concierge_bot::{Orchestrator, TelegramAdapter, TelegramTransport};
use concierge_core::config::Config;
use concierge_core::transport::{ChatTransport, SendError};
use concierge_hours::HoursService;
use concierge_llm::{AnswerPipeline, ChatProvider, OpenAiProvider, Summarizer};
use concierge_rag::embedder::{Embedder, OpenAiEmbedder};
use concierge_rag::engine::RagParams;
use concierge_rag::IndexManager;
use concierge_services::{
    Dispatcher, LiveChatService, RateLimiter, ReferralService, VacationService,
};
use concierge_store::Store;

mod seed;

#[derive(Parser, Debug)]
#[command(name = "concierge", about = "AI service agent for a small business")]
struct Cli {
    /// Run only the Telegram bot.
    #[arg(long)]
    bot: bool,

    /// Run only the admin panel.
    #[arg(long)]
    admin: bool,

    /// Load demo seed data (knowledge base, hours, settings) and exit.
    #[arg(long)]
    seed: bool,
}

/// Stand-in transport when no bot token is configured: every send fails
/// with a typed error the services already know how to absorb.
struct DisabledTransport;

#[async_trait]
impl ChatTransport for DisabledTransport {
    async fn send_text(&self, _chat_id: &str, _text: &str) -> Result<(), SendError> {
        Err(SendError::Other("telegram transport disabled".into()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    std::fs::create_dir_all(&config.paths.data_dir)?;
    if let Some(parent) = config.paths.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = Arc::new(Store::open(&config.paths.db_path)?);

    if cli.seed {
        seed::load_seed_data(&store)?;
        info!("seed data loaded");
        return Ok(());
    }

    let run_bot = cli.bot || !cli.admin;
    let run_admin = cli.admin || !cli.bot;

    let has_token = !config.telegram.bot_token.is_empty();
    if cli.bot && !has_token {
        error!("TELEGRAM_BOT_TOKEN is not set; cannot start the bot");
        std::process::exit(1);
    }
    let run_bot = run_bot && has_token;
    if !run_bot && !cli.admin {
        warn!("TELEGRAM_BOT_TOKEN is not set; running admin-only");
    }

    // Shared infrastructure.
    let embedder = if config.llm.api_key.is_empty() {
        Embedder::local_only()
    } else {
        Embedder::new(Box::new(OpenAiEmbedder::new(
            config.llm.api_key.clone(),
            config.llm.base_url.clone(),
            config.llm.embedding_model.clone(),
        )))
    };
    let index = Arc::new(IndexManager::new(
        config.paths.index_dir.clone(),
        Arc::clone(&store),
        embedder,
        RagParams {
            top_k: config.rag.top_k,
            min_relevance: config.rag.min_relevance,
            chunk_max_tokens: config.rag.chunk_max_tokens,
        },
    )?);

    let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiProvider::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
    ));
    let hours = Arc::new(HoursService::new(Arc::clone(&store)));
    let pipeline = Arc::new(AnswerPipeline::new(
        Arc::clone(&provider),
        Arc::clone(&index),
        Arc::clone(&store),
        Arc::clone(&hours),
        config.business.name.clone(),
        config.llm.max_tokens,
        config.memory.context_window,
    ));
    let summarizer = Arc::new(Summarizer::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        config.memory.summary_threshold,
    ));

    let bot = has_token.then(|| Bot::new(&config.telegram.bot_token));
    let transport: Arc<dyn ChatTransport> = match &bot {
        Some(bot) => Arc::new(TelegramTransport::new(bot.clone())),
        None => Arc::new(DisabledTransport),
    };

    let live_chat = Arc::new(LiveChatService::new(
        Arc::clone(&store),
        Arc::clone(&transport),
    ));
    let vacation = Arc::new(VacationService::new(Arc::clone(&store)));
    let referral = Arc::new(ReferralService::new(
        Arc::clone(&store),
        Arc::clone(&transport),
        config.telegram.bot_username.clone(),
        config.referral.engaged_burst,
        config.referral.engaged_daily,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

    let mut tasks = Vec::new();

    if run_bot {
        // Close sessions a previous run left open, so customers are not
        // stuck talking to nobody.
        live_chat.cleanup_stale()?;

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&pipeline),
            Arc::clone(&summarizer),
            Arc::clone(&rate_limiter),
            Arc::clone(&live_chat),
            Arc::clone(&vacation),
            Arc::clone(&referral),
            Arc::clone(&hours),
            Arc::clone(&transport),
            config.telegram.owner_chat_id.clone(),
            config.business.name.clone(),
            config.rag.pricing_hint.clone(),
        ));
        let adapter = TelegramAdapter::new(
            bot.clone().expect("run_bot implies a configured token"),
            orchestrator,
        );
        tasks.push(tokio::spawn(async move {
            adapter.run().await;
        }));
    }

    if run_admin {
        config.validate_admin()?;
        let dispatcher = Dispatcher::new(run_bot.then(tokio::runtime::Handle::current));
        let admin_state = Arc::new(AdminState {
            store: Arc::clone(&store),
            index: Arc::clone(&index),
            live_chat: Arc::clone(&live_chat),
            vacation: Arc::clone(&vacation),
            referral: Arc::clone(&referral),
            transport: Arc::clone(&transport),
            dispatcher,
            admin: config.admin.clone(),
            business: config.business.clone(),
        });
        let router = concierge_admin::build_router(admin_state);
        let addr: SocketAddr = format!("{}:{}", config.admin.host, config.admin.port).parse()?;
        info!(%addr, "admin panel listening");

        tasks.push(tokio::spawn(async move {
            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    if let Err(e) = axum::serve(listener, router).await {
                        error!(error = %e, "admin server exited");
                    }
                }
                Err(e) => error!(error = %e, %addr, "admin server failed to bind"),
            }
        }));
    }

    if tasks.is_empty() {
        error!("nothing to run: no bot token and admin disabled");
        std::process::exit(1);
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

//! Telegram bot wired to a charla agent.
//!
//! Receives Telegram webhook updates over HTTP, runs each message through
//! the agent loop, and replies via the Bot API.
//!
//! # Usage
//!
//! ```bash
//! TELEGRAM_BOT_TOKEN=123:abc ALLOWED_CHAT_IDS=42,43 cargo run -p charla-bot
//! TELEGRAM_BOT_TOKEN=123:abc ALLOWED_CHAT_IDS=42 cargo run -p charla-bot -- --model qwen2.5 --port 8080
//! ```
//!
//! Environment:
//! - `TELEGRAM_BOT_TOKEN` (required) — Bot API token.
//! - `ALLOWED_CHAT_IDS` (required) — comma-separated chat ids allowed to
//!   talk to the bot; anyone else gets a fixed refusal.
//! - `WEATHER_API_KEY` (optional) — OpenWeatherMap key; without it the
//!   weather tool is not registered.
//! - Every flag can also be set through its env var: `AI_MODEL`, `AI_TEMP`,
//!   `AI_CTX`, `AI_MAX_TOOL_ITER`, `AI_CONTEXT_KEEP`, `AI_CONTEXT_MAX`,
//!   `AI_SYS_PROMPT`, `AI_STATS`, `OLLAMA_URL`, `BOT_PORT`, `DATA_DIR`.
//!   Flags win over env vars; env vars win over defaults.
//!
//! Point the Telegram webhook at `https://<host>/aibot`. `/start` greets,
//! `/wipe` deletes the chat's stored history.

use std::path::PathBuf;

use charla::agent::{Agent, TurnConfig};
use charla::context::store::ContextStore;
use charla::{OllamaClient, tools};
use charla_bot::telegram::{TelegramSender, Update};
use charla_bot::{build_router, start_server};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful personal assistant reachable over Telegram. Keep replies \
short and conversational. Use your tools whenever they help: check the \
clock and the weather, browse the web, do arithmetic, and keep notes in \
the drafts folder.";

/// Telegram webhook bot powered by the charla agent runtime.
#[derive(Parser)]
#[command(about = "Telegram bot driven by an Ollama tool-calling agent")]
struct Args {
    /// Model to use for conversation turns.
    #[arg(long, env = "AI_MODEL", default_value = "llama3.2")]
    model: String,

    /// Port for the webhook server.
    #[arg(long, env = "BOT_PORT", default_value_t = 8000)]
    port: u16,

    /// Base URL of the Ollama endpoint.
    #[arg(long, env = "OLLAMA_URL", default_value = charla::DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// Data root: drafts/plots/data folders for the disk tools, plus the
    /// persisted conversation histories under `history/`.
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Sampling temperature.
    #[arg(long, env = "AI_TEMP", default_value_t = 0.0)]
    temperature: f32,

    /// Context window size in tokens.
    #[arg(long, env = "AI_CTX", default_value_t = 8192)]
    num_ctx: u32,

    /// Maximum model iterations per turn.
    #[arg(long, env = "AI_MAX_TOOL_ITER", default_value_t = 6)]
    max_tool_iterations: u32,

    /// Messages kept by a context purge.
    #[arg(long, env = "AI_CONTEXT_KEEP", default_value_t = 10)]
    context_keep: usize,

    /// History length that triggers a context purge.
    #[arg(long, env = "AI_CONTEXT_MAX", default_value_t = 40)]
    context_max: usize,

    /// System prompt for fresh conversations.
    #[arg(long, env = "AI_SYS_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    system_prompt: String,

    /// Log per-call model statistics at info level.
    #[arg(long, env = "AI_STATS")]
    show_stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
        .map_err(|_| "Set TELEGRAM_BOT_TOKEN env var to your Telegram bot token")?;
    let allowed_chat_ids: Vec<i64> = std::env::var("ALLOWED_CHAT_IDS")
        .map_err(|_| "Set ALLOWED_CHAT_IDS env var to a comma-separated list of chat ids")?
        .split(',')
        .map(|id| {
            id.trim()
                .parse()
                .map_err(|e| format!("bad chat id '{id}' in ALLOWED_CHAT_IDS: {e}"))
        })
        .collect::<Result<_, _>>()?;
    let weather_api_key = std::env::var("WEATHER_API_KEY").ok();

    let client = OllamaClient::new(&args.ollama_url)
        .map_err(|e| e.to_string())?
        .with_stats_logging(args.show_stats);
    let registry =
        tools::default_registry(&args.data_dir, weather_api_key).map_err(|e| e.to_string())?;
    let store = ContextStore::new(args.data_dir.join("history")).map_err(|e| e.to_string())?;
    let sender = TelegramSender::new(&bot_token).map_err(|e| e.to_string())?;

    let config = TurnConfig::new(&args.model, &args.system_prompt)
        .with_temperature(args.temperature)
        .with_num_ctx(args.num_ctx)
        .with_max_tool_iterations(args.max_tool_iterations)
        .with_purge_thresholds(args.context_keep, args.context_max);
    let agent = Agent::new(&client, &registry, config);

    let (update_tx, mut update_rx) = mpsc::channel::<Update>(64);
    let addr = start_server(build_router(update_tx), ([0, 0, 0, 0], args.port).into()).await;
    info!("webhook listening on http://{addr}/aibot");
    info!("allowed chat ids: {allowed_chat_ids:?}");

    // One worker consumes the queue: turns run strictly one at a time, so
    // two updates for the same chat can never race on the stored history.
    while let Some(update) = update_rx.recv().await {
        handle_update(update, &agent, &store, &sender, &allowed_chat_ids).await;
    }
    Ok(())
}

async fn handle_update(
    update: Update,
    agent: &Agent<'_>,
    store: &ContextStore,
    sender: &TelegramSender,
    allowed_chat_ids: &[i64],
) {
    let Some(message) = update.message else {
        return;
    };
    let chat_id = message.chat.id;
    let Some(text) = message.text else {
        return;
    };

    match text.as_str() {
        "/start" => sender.send_reply(chat_id, "Welcome!").await,
        "/wipe" => {
            if let Err(e) = store.purge(&chat_id.to_string()) {
                warn!("could not wipe history for {chat_id}: {e}");
            }
        }
        _ => {
            if !allowed_chat_ids.contains(&chat_id) {
                warn!("message from {chat_id}: {text} [NOT ALLOWED USER]");
                sender
                    .send_reply(chat_id, "You're NOT allowed to use this bot")
                    .await;
                return;
            }
            info!("message from {chat_id}: {text}");
            match agent.interact(&text, &chat_id.to_string(), store).await {
                Ok(outcome) => sender.send_reply(chat_id, &outcome.text()).await,
                Err(e) => error!("turn failed for {chat_id}: {e}"),
            }
        }
    }
}

//! Chat Gateway - Entry Point

use chat_gateway::{
    store, AppState, CompletionClient, CompletionProxy, Config, Gateway, TelegramMessenger,
};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Chat Gateway v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: chat-gateway [--help]");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_TOKEN         Telegram bot token");
        println!("  OLLAMA_API_KEY         Completion API key");
        println!("  ADMIN_CHAT_ID          Admin user id (moderation + mirrored logs)");
        println!("  CHAT_API_URL           Completion endpoint");
        println!("  CHAT_MODEL             Model name");
        println!("  UPSTREAM_TIMEOUT_SECS  Completion stream timeout (default: 120)");
        println!("  REDIS_URL              Redis store (default: in-memory)");
        println!("  HISTORY_CHAR_BUDGET    History size budget (default: 4000)");
        println!("  HISTORY_TTL_SECS       History expiry (default: 86400)");
        println!("  IMAGE_ENDPOINT         Image generation base URL");
        println!("  BOT_USERNAME           Bot username for inline help");
        println!("  BIND_ADDR / PORT       Listener (default: 0.0.0.0:8787)");
        println!("  RUST_LOG               trace|debug|info|warn|error");
        println!("  LOG_FORMAT             'json' for JSON lines");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let json_logs = std::env::var("LOG_FORMAT")
        .map(|s| s.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Chat Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    if config.telegram_token.is_none() {
        warn!("TELEGRAM_TOKEN not set: replies will fail");
    }
    if config.upstream_api_key.is_none() {
        warn!("OLLAMA_API_KEY not set: chat and proxy requests will fail");
    }
    match &config.admin_chat_id {
        Some(admin) => info!("Admin user: {}", admin),
        None => info!("No admin configured: moderation commands disabled"),
    }

    let store = store::connect(config.redis_url.as_deref()).await?;
    let backend = Arc::new(CompletionClient::from_config(&config));
    let messenger = Arc::new(TelegramMessenger::new(config.telegram_token.as_deref()));

    let gateway = Gateway::from_config(&config, store, backend, messenger);
    let state = AppState::new(gateway, CompletionProxy::from_config(&config));

    chat_gateway::server::serve(config.socket_addr(), state).await?;

    Ok(())
}

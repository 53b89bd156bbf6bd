//! chatroom-gateway: Chat Room LLM Gateway Main Binary
//!
//! Usage:
//!   chatroom-gateway [CONFIG]     - Start with the given config file
//!   chatroom-gateway --help       - Show help
//!   chatroom-gateway --version    - Show version
//!
//! The bundled front-end is an interactive console that simulates a group
//! chat; a real deployment wires a messaging transport into the same
//! handler and loops.

mod console;
mod error;
mod handler;
mod messages;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use chatroom_core::{ChatRoomManager, Config, DifyClient, ModelRouter};

use crate::console::{ConsoleTransport, MemoryStore};
use crate::handler::BotState;

const DEFAULT_CONFIG_PATH: &str = "chatroom.toml";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const CONSOLE_STARTING_POINTS: i64 = 100;

/// Run mode
enum RunMode {
    /// Interactive console against the configured backend
    Console(String),
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args();

    let config_path = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("chatroom-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Console(path) => path,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_file(&config_path)
        .map_err(|e| anyhow::anyhow!("Config error ({}): {}", config_path, e))?;

    tracing::info!("Starting chatroom-gateway...");
    tracing::info!(
        "Default model: {}, {} models configured",
        config.default_model,
        config.models.len()
    );

    let dify = DifyClient::new(config.http_proxy.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to create Dify client: {}", e))?;
    let router = ModelRouter::new(&config);
    let (manager, flush_rx) = ChatRoomManager::new();

    let state = Arc::new(BotState {
        config,
        manager,
        router,
        dify,
        transport: Arc::new(ConsoleTransport),
        store: Arc::new(MemoryStore::new(CONSOLE_STARTING_POINTS)),
    });

    // Flushed buffers are dispatched independently of inbound handling
    tokio::spawn(handler::run_flush_loop(state.clone(), flush_rx));

    // Periodic idle sweep: auto-away and timeout notifications
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await; // the first tick fires immediately
        loop {
            ticker.tick().await;
            if let Err(e) = handler::notify_idle_users(&sweep_state).await {
                tracing::warn!("idle sweep notification failed: {}", e);
            }
        }
    });

    console::run_console(state).await?;
    Ok(())
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            other => config_path = other.to_string(),
        }
    }
    RunMode::Console(config_path)
}

/// Print help message
fn print_help() {
    println!("chatroom-gateway - Chat Room LLM Gateway");
    println!();
    println!("Usage:");
    println!("  chatroom-gateway [CONFIG]    Start the console (default config: {})", DEFAULT_CONFIG_PATH);
    println!("  chatroom-gateway --help      Show this help message");
    println!("  chatroom-gateway --version   Show version");
    println!();
    println!("Environment Variables:");
    println!("  RUST_LOG                     Log filter (default: info)");
}

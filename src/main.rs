//! Croupier Server Binary
//!
//! Wires the settlement engine to the HTTP/WebSocket surface with an
//! in-memory balance store.

use clap::Parser;
use croupier::api::{ApiConfig, ApiServer, AppState};
use croupier::config::EngineConfig;
use croupier::games::crash;
use croupier::games::settlement::SettlementCoordinator;
use croupier::store::InMemoryBalanceStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "croupier")]
#[command(about = "Game outcome & settlement engine server", long_about = None)]
struct Args {
    /// API server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// API server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Engine configuration file (TOML); built-in defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long, default_value = "*")]
    cors_origins: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "croupier=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let engine_config = match &args.config {
        Some(path) => {
            info!("📂 Loading engine configuration: {}", path.display());
            EngineConfig::from_toml_file(path)?
        }
        None => EngineConfig::default(),
    };
    engine_config.validate()?;
    let config = Arc::new(engine_config);

    info!("🎲 Starting Croupier settlement engine");
    info!(
        "   Dice: house edge {:.2}%, bets [{}, {}]",
        config.dice.house_edge * 100.0,
        config.dice.min_bet,
        config.dice.max_bet
    );
    info!(
        "   Slots: expected return {:.2}%, bets [{}, {}]",
        config.slots.expected_return() * 100.0,
        config.slots.min_bet,
        config.slots.max_bet
    );
    info!(
        "   Crash: house edge {:.2}%, cap {}x",
        config.crash.house_edge * 100.0,
        config.crash.max_multiplier
    );

    let store = Arc::new(InMemoryBalanceStore::new());
    let coordinator = Arc::new(SettlementCoordinator::new(store.clone(), config));
    let crash_handle = crash::spawn(coordinator.clone());

    let allowed_origins: Vec<String> = args
        .cors_origins
        .split(',')
        .map(|origin| origin.trim().to_string())
        .collect();

    let state = Arc::new(AppState {
        coordinator,
        store,
        crash: crash_handle,
    });

    let api_config = ApiConfig {
        host: args.host,
        port: args.port,
        allowed_origins,
        request_timeout_secs: args.timeout,
    };
    ApiServer::new(api_config, state).run().await
}

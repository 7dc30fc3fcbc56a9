//! Auraweave faucet - mints marketplace test tokens over HTTP
//!
//! Serves `POST /request-tokens` backed by the settlement client's mint
//! operation. If the ledger connection or the operator key cannot be set up,
//! the server still starts and answers mint requests with 503.

use anyhow::Result;
use auraweave_agent::api::{self, AppState, Faucet};
use auraweave_agent::config::Settings;
use auraweave_agent::tx::{AgentRole, AgentSigner};
use auraweave_agent::{init_logging, MarketClient};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "auraweave-faucet", version, about = "Marketplace token faucet")]
struct Args {
    /// Configuration file (defaults to $AURAWEAVE_CONFIG or config/default.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!("Starting Auraweave faucet v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    info!("Loaded configuration for network {}", settings.ledger.network);

    let faucet = match init_faucet(&settings).await {
        Ok(faucet) => {
            info!(
                "Faucet operator {:?} ready, minting {} tokens per request",
                faucet.signer.address(),
                faucet.mint_amount_units
            );
            Some(faucet)
        }
        Err(e) => {
            error!("Faucet initialization failed: {}", e);
            None
        }
    };

    let state = AppState::new(faucet).with_metrics(settings.metrics.enabled);
    api::run_server(&settings.faucet, state, shutdown_signal()).await?;

    info!("Auraweave faucet stopped");
    Ok(())
}

async fn init_faucet(settings: &Settings) -> Result<Faucet> {
    let client = MarketClient::connect(settings).await?;
    let signer = AgentSigner::from_env(AgentRole::Faucet, &settings.wallet.faucet_key_env)?;

    // Malformed mint amounts are a startup error
    client.to_base_units(&settings.faucet.mint_amount_units)?;

    Ok(Faucet {
        client: Arc::new(client),
        signer,
        mint_amount_units: settings.faucet.mint_amount_units.clone(),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}

//! Producer agent: upload a payload to the content store, then list it

use anyhow::{bail, Context, Result};
use auraweave_agent::config::Settings;
use auraweave_agent::content::{ContentAddress, StoreApiSource};
use auraweave_agent::tx::{AgentRole, AgentSigner};
use auraweave_agent::{init_logging, ListingDraft, MarketClient};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "producer-agent", version, about = "List data on the Auraweave marketplace")]
struct Args {
    /// Payload file to upload
    #[arg(short, long)]
    file: PathBuf,

    /// Listing name
    #[arg(short, long)]
    name: String,

    /// Listing description
    #[arg(short, long, default_value = "")]
    description: String,

    /// Price in whole token units
    #[arg(short, long)]
    price: String,

    /// Optional metadata file uploaded alongside the payload
    #[arg(long)]
    metadata_file: Option<PathBuf>,

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

    let settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    let Some(api_url) = settings.content.api_url() else {
        bail!("Uploading requires content.api_url to be configured");
    };
    let store = StoreApiSource::new(
        api_url,
        Duration::from_secs(settings.content.api_timeout_secs),
    )?;

    let producer = AgentSigner::from_env(AgentRole::Producer, &settings.wallet.producer_key_env)?;
    let client = MarketClient::connect(&settings).await?;
    info!("Producer {:?} on chain {}", producer.address(), client.chain_id());

    let data_cid = upload(&store, &args.file).await?;
    let metadata_cid = match &args.metadata_file {
        Some(path) => upload(&store, path).await?.to_string(),
        None => String::new(),
    };

    let draft = ListingDraft {
        name: args.name.clone(),
        description: args.description.clone(),
        data_cid: data_cid.to_string(),
        metadata_cid,
        price_units: args.price.clone(),
    };
    let receipt = client.list_data(&producer, &draft).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "name": draft.name,
            "dataCID": draft.data_cid,
            "metadataCID": draft.metadata_cid,
            "price": draft.price_units,
            "receipt": receipt,
        }))?
    );
    Ok(())
}

async fn upload(store: &StoreApiSource, path: &Path) -> Result<ContentAddress> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "payload".to_string());

    let address = store.add(&file_name, bytes).await?;
    Ok(address)
}

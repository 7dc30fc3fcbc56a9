//! Consumer agent: discover listings, buy one, fetch its payload

use anyhow::{bail, Context, Result};
use auraweave_agent::config::Settings;
use auraweave_agent::content::ContentFetcher;
use auraweave_agent::contracts::Listing;
use auraweave_agent::tx::{AgentRole, AgentSigner};
use auraweave_agent::{init_logging, MarketClient};
use clap::Parser;
use ethers::types::{Address, U256};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "consumer-agent", version, about = "Buy data on the Auraweave marketplace")]
struct Args {
    /// Buy this listing instead of picking one
    #[arg(short, long)]
    listing_id: Option<u64>,

    /// Page size for discovery
    #[arg(long, default_value_t = 10)]
    limit: u64,

    /// Page offset for discovery
    #[arg(long, default_value_t = 0)]
    offset: u64,

    /// Only list what is for sale
    #[arg(long)]
    dry_run: bool,

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

    let consumer = AgentSigner::from_env(AgentRole::Consumer, &settings.wallet.consumer_key_env)?;
    let client = MarketClient::connect(&settings).await?;
    let fetcher = ContentFetcher::from_config(&settings.content)?;
    let buyer = consumer.address();

    let (tokens, native) = futures::try_join!(
        client.token_balance(buyer),
        client.native_balance(buyer)
    )?;
    info!(
        "Consumer {:?}: {} tokens, {} wei",
        buyer,
        client.format_units(tokens),
        native
    );

    let listing_id = match args.listing_id {
        Some(id) => U256::from(id),
        None => {
            let listings = client.discover_listings(args.limit, args.offset).await;
            for listing in &listings {
                println!(
                    "#{} {} - {} tokens ({})",
                    listing.id,
                    listing.name,
                    client.format_units(listing.price),
                    listing.description
                );
            }
            if args.dry_run {
                return Ok(());
            }
            match select_listing(&listings, buyer, tokens) {
                Some(listing) => listing.id,
                None => {
                    warn!("No affordable active listings from other sellers");
                    return Ok(());
                }
            }
        }
    };

    if fetcher.source_count() == 0 {
        bail!("No content source configured; refusing to buy a payload that cannot be fetched");
    }

    let delivered = client
        .purchase_and_fetch(&consumer, listing_id, &fetcher)
        .await
        .with_context(|| format!("Purchase of listing {} failed", listing_id))?;

    println!("{}", serde_json::to_string_pretty(&delivered)?);
    Ok(())
}

/// First active listing from another seller that the buyer can afford
fn select_listing(listings: &[Listing], buyer: Address, balance: U256) -> Option<&Listing> {
    listings
        .iter()
        .find(|l| l.active && l.seller != buyer && l.price <= balance)
}

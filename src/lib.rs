//! Auraweave agent - transaction submission and settlement client for
//! data-marketplace agents
//!
//! Producers list data whose payload lives in a content-addressed store,
//! consumers buy listings with the marketplace token, and a faucet mints
//! test tokens. Every state-changing call goes through one pipeline:
//! estimate → fee plan → nonce → build → sign → broadcast → wait.

pub mod api;
pub mod chain;
pub mod client;
pub mod config;
pub mod content;
pub mod contracts;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod settlement;
pub mod tx;

pub use client::{ClientOptions, DeliveredPurchase, ListingDraft, MarketClient};
pub use error::{ClientError, ClientResult, Phase};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter; `json` switches to JSON lines.
pub fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,auraweave_agent=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

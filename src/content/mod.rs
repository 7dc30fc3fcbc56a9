//! Content retrieval from the content-addressed store
//!
//! Sources are tried in order (local store API first, then the public
//! gateway). Placeholder and empty addresses are rejected before any I/O.

mod store;

pub use store::{api_base_url, GatewaySource, StoreApiSource};

use crate::config::ContentConfig;
use crate::error::{ClientError, ClientResult};
use crate::metrics;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Marker left in listings whose payload was never uploaded
pub const PLACEHOLDER_MARKER: &str = "DUMMY_CID";

/// A validated content address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn parse(raw: &str) -> ClientResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidAddress("empty content address".to_string()));
        }
        if trimmed.contains(PLACEHOLDER_MARKER) {
            return Err(ClientError::InvalidAddress(format!(
                "{} is a placeholder",
                trimmed
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ClientError::InvalidAddress(format!(
                "{} contains invalid characters",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Retrieved payload, parsed as JSON when possible
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

impl Payload {
    pub fn decode(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Json(value) => match serde_json::to_string_pretty(value) {
                Ok(text) => f.write_str(&text),
                Err(_) => write!(f, "{}", value),
            },
            Payload::Text(text) => f.write_str(text),
        }
    }
}

/// One place content can be fetched from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Raw bytes stored under `address`
    async fn fetch(&self, address: &ContentAddress) -> ClientResult<Vec<u8>>;
}

/// Fetches payloads from an ordered list of sources
pub struct ContentFetcher {
    sources: Vec<Box<dyn ContentSource>>,
}

impl ContentFetcher {
    pub fn new(sources: Vec<Box<dyn ContentSource>>) -> Self {
        Self { sources }
    }

    /// Store API first, then gateway, as configured
    pub fn from_config(config: &ContentConfig) -> ClientResult<Self> {
        let mut sources: Vec<Box<dyn ContentSource>> = Vec::new();

        if let Some(api) = config.api_url() {
            sources.push(Box::new(StoreApiSource::new(
                api,
                Duration::from_secs(config.api_timeout_secs),
            )?));
        }
        if let Some(gateway) = config.gateway_url() {
            sources.push(Box::new(GatewaySource::new(
                gateway,
                Duration::from_secs(config.gateway_timeout_secs),
            )?));
        }

        if sources.is_empty() {
            warn!("Content fetcher has no sources configured");
        }
        Ok(Self::new(sources))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetch and decode the payload at `raw_address`
    pub async fn fetch(&self, raw_address: &str) -> ClientResult<Payload> {
        let address = ContentAddress::parse(raw_address)?;
        let mut last_error = String::from("no content sources configured");

        for source in &self.sources {
            match source.fetch(&address).await {
                Ok(bytes) => {
                    metrics::record_content_fetch(source.name(), true);
                    info!(
                        "Fetched {} bytes for {} from {}",
                        bytes.len(),
                        address,
                        source.name()
                    );
                    return Ok(Payload::decode(&bytes));
                }
                Err(e) => {
                    metrics::record_content_fetch(source.name(), false);
                    warn!("Fetching {} from {} failed: {}", address, source.name(), e);
                    last_error = format!("{}: {}", source.name(), e);
                }
            }
        }

        Err(ClientError::ContentNotFound {
            address: address.to_string(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    const CID: &str = "bafkreifysyerz2fucm62r5u3746kfukuklaj54urpcx5uy3xkbsxzrnzdq";

    fn failing(name: &'static str) -> MockContentSource {
        let mut source = MockContentSource::new();
        source.expect_name().return_const(name);
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Err(ClientError::Connectivity("connection refused".into())));
        source
    }

    fn serving(name: &'static str, body: &'static [u8]) -> MockContentSource {
        let mut source = MockContentSource::new();
        source.expect_name().return_const(name);
        source
            .expect_fetch()
            .with(eq(ContentAddress(CID.to_string())))
            .times(1)
            .returning(move |_| Ok(body.to_vec()));
        source
    }

    #[test]
    fn test_address_validation() {
        assert!(ContentAddress::parse(CID).is_ok());
        assert!(matches!(
            ContentAddress::parse("   "),
            Err(ClientError::InvalidAddress(_))
        ));
        assert!(matches!(
            ContentAddress::parse("DUMMY_CID_sensor_data_1"),
            Err(ClientError::InvalidAddress(_))
        ));
        assert!(ContentAddress::parse("../etc/passwd").is_err());
    }

    #[test]
    fn test_payload_decoding() {
        let json = Payload::decode(br#"{"temperature": 21.5}"#);
        assert_eq!(json.as_json().unwrap()["temperature"], 21.5);

        let text = Payload::decode(b"plain reading");
        assert_eq!(text, Payload::Text("plain reading".into()));

        let lossy = Payload::decode(&[0x66, 0xff, 0x6f]);
        assert!(matches!(lossy, Payload::Text(ref t) if t.starts_with('f')));
    }

    #[tokio::test]
    async fn test_falls_back_to_gateway() {
        let fetcher = ContentFetcher::new(vec![
            Box::new(failing("store_api")),
            Box::new(serving("gateway", br#"{"humidity": 40}"#)),
        ]);

        let payload = fetcher.fetch(CID).await.unwrap();
        assert_eq!(payload.as_json().unwrap()["humidity"], 40);
    }

    #[tokio::test]
    async fn test_first_source_wins() {
        let mut gateway = MockContentSource::new();
        gateway.expect_name().return_const("gateway");
        gateway.expect_fetch().never();

        let fetcher = ContentFetcher::new(vec![
            Box::new(serving("store_api", b"reading")),
            Box::new(gateway),
        ]);

        assert_eq!(
            fetcher.fetch(CID).await.unwrap(),
            Payload::Text("reading".into())
        );
    }

    #[tokio::test]
    async fn test_all_sources_failing() {
        let fetcher = ContentFetcher::new(vec![
            Box::new(failing("store_api")),
            Box::new(failing("gateway")),
        ]);

        let err = fetcher.fetch(CID).await.unwrap_err();
        match err {
            ClientError::ContentNotFound {
                address,
                last_error,
            } => {
                assert_eq!(address, CID);
                assert!(last_error.starts_with("gateway"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_placeholder_makes_no_requests() {
        let mut source = MockContentSource::new();
        source.expect_name().return_const("store_api");
        source.expect_fetch().never();

        let fetcher = ContentFetcher::new(vec![Box::new(source)]);
        let err = fetcher.fetch("DUMMY_CID_weather").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidAddress(_)));
    }
}

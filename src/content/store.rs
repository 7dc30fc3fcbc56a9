//! HTTP content sources: the store's RPC API and a public read gateway

use super::{ContentAddress, ContentSource};
use crate::error::{ClientError, ClientResult};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Normalize a store API location to an http(s) base URL.
///
/// Accepts plain URLs and multiaddrs such as `/ip4/127.0.0.1/tcp/5001/http`.
pub fn api_base_url(raw: &str) -> ClientResult<String> {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Ok(raw.trim_end_matches('/').to_string());
    }

    let parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [proto, host, "tcp", port, rest @ ..] => {
            let scheme = match rest {
                [] | ["http"] => "http",
                ["https"] => "https",
                _ => {
                    return Err(ClientError::Config(format!(
                        "Unsupported multiaddr suffix in {}",
                        raw
                    )))
                }
            };
            let host = match *proto {
                "ip4" | "dns" | "dns4" | "dns6" => host.to_string(),
                "ip6" => format!("[{}]", host),
                other => {
                    return Err(ClientError::Config(format!(
                        "Unsupported multiaddr protocol {} in {}",
                        other, raw
                    )))
                }
            };
            port.parse::<u16>()
                .map_err(|_| ClientError::Config(format!("Invalid port in {}", raw)))?;
            Ok(format!("{}://{}:{}", scheme, host, port))
        }
        _ => Err(ClientError::Config(format!(
            "Unrecognized content store address: {}",
            raw
        ))),
    }
}

fn http_client(timeout: Duration) -> ClientResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Config(format!("HTTP client: {}", e)))
}

fn transport_error(e: reqwest::Error) -> ClientError {
    ClientError::Connectivity(e.to_string())
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// The store's RPC API (`/api/v0/...`)
pub struct StoreApiSource {
    client: reqwest::Client,
    base_url: String,
}

impl StoreApiSource {
    pub fn new(api: &str, timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: api_base_url(api)?,
        })
    }

    /// Upload bytes and return their content address
    pub async fn add(&self, file_name: &str, bytes: Vec<u8>) -> ClientResult<ContentAddress> {
        let size = bytes.len();
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        let response: AddResponse = self
            .client
            .post(format!("{}/api/v0/add", self.base_url))
            .query(&[("pin", "true")])
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        let address = ContentAddress::parse(&response.hash)?;
        info!("Uploaded {} ({} bytes) as {}", file_name, size, address);
        Ok(address)
    }
}

#[async_trait]
impl ContentSource for StoreApiSource {
    fn name(&self) -> &'static str {
        "store_api"
    }

    async fn fetch(&self, address: &ContentAddress) -> ClientResult<Vec<u8>> {
        debug!("Fetching {} via store API {}", address, self.base_url);
        let bytes = self
            .client
            .post(format!("{}/api/v0/cat", self.base_url))
            .query(&[("arg", address.as_str())])
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?
            .bytes()
            .await
            .map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

/// Public HTTP gateway serving `{gateway}/{address}`
pub struct GatewaySource {
    client: reqwest::Client,
    base_url: String,
}

impl GatewaySource {
    pub fn new(gateway: &str, timeout: Duration) -> ClientResult<Self> {
        let base_url = gateway.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Config("Empty gateway URL".to_string()));
        }
        Ok(Self {
            client: http_client(timeout)?,
            base_url,
        })
    }

    pub fn url_for(&self, address: &ContentAddress) -> String {
        format!("{}/{}", self.base_url, address)
    }
}

#[async_trait]
impl ContentSource for GatewaySource {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn fetch(&self, address: &ContentAddress) -> ClientResult<Vec<u8>> {
        let url = self.url_for(address);
        debug!("Fetching {} via gateway", url);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?
            .bytes()
            .await
            .map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

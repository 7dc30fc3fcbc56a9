//! Configuration management for Auraweave agents
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Private keys never live in the file; the file names the environment
//! variables that hold them.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ledger: LedgerConfig,
    pub contracts: ContractsConfig,
    pub content: ContentConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub faucet: FaucetConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub network: String,
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Chains that always get a legacy fee plan (local dev nodes)
    #[serde(default = "default_legacy_chain_ids")]
    pub legacy_chain_ids: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub data_registry: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    /// Deployment JSON written by the contract deploy script
    pub deployment_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    pub api_url: Option<String>,
    pub gateway_url: Option<String>,
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
}

impl ContentConfig {
    /// Store API location, if set and non-empty
    pub fn api_url(&self) -> Option<&str> {
        non_empty(&self.api_url)
    }

    /// Gateway base URL, if set and non-empty
    pub fn gateway_url(&self) -> Option<&str> {
        non_empty(&self.gateway_url)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_producer_key_env")]
    pub producer_key_env: String,
    #[serde(default = "default_consumer_key_env")]
    pub consumer_key_env: String,
    #[serde(default = "default_faucet_key_env")]
    pub faucet_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaucetConfig {
    pub host: String,
    pub port: u16,
    pub mint_amount_units: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            mint_amount_units: "100".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_legacy_chain_ids() -> Vec<u64> {
    vec![1337, 31337]
}

fn default_token_decimals() -> u32 {
    18
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_gateway_timeout_secs() -> u64 {
    60
}

fn default_producer_key_env() -> String {
    "PRODUCER_PRIVATE_KEY".to_string()
}

fn default_consumer_key_env() -> String {
    "CONSUMER_PRIVATE_KEY".to_string()
}

fn default_faucet_key_env() -> String {
    "FAUCET_OPERATOR_PRIVATE_KEY".to_string()
}

/// Contract section of a deployment file
#[derive(Debug, Deserialize)]
struct DeployedContract {
    address: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentInfo {
    #[serde(rename = "DataRegistry")]
    data_registry: DeployedContract,
    #[serde(rename = "MockERC20")]
    token: Option<DeployedContract>,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("AURAWEAVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let mut settings = Self::from_toml(&config_str)?;
        settings.apply_deployment_file()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Parse settings from TOML text after substituting environment variables
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);
        toml::from_str(&config_str).with_context(|| "Failed to parse configuration")
    }

    /// Fill missing contract addresses from the deployment file, if any
    fn apply_deployment_file(&mut self) -> Result<()> {
        let Some(path) = self.contracts.deployment_file.clone() else {
            return Ok(());
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read deployment file: {}", path))?;
        let info: DeploymentInfo = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse deployment file: {}", path))?;

        if self.contracts.data_registry.is_empty() {
            self.contracts.data_registry = info.data_registry.address;
        }
        if self.contracts.token.is_empty() {
            if let Some(token) = info.token {
                self.contracts.token = token.address;
            }
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.ledger.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            anyhow::bail!("Network {} has no RPC URLs configured", self.ledger.network);
        }

        if self.contracts.data_registry.is_empty() {
            anyhow::bail!("No DataRegistry address configured");
        }

        if self.contracts.token.is_empty() {
            anyhow::bail!("No token address configured");
        }

        if self.content.api_url().is_none() && self.content.gateway_url().is_none() {
            tracing::warn!("No content store configured - payload retrieval will fail");
        }

        Ok(())
    }
}

lazy_static! {
    static ref ENV_VAR: regex::Regex = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

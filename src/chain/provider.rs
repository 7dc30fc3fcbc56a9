//! Chain provider with multi-RPC support and automatic failover

use super::{FeeMarket, LedgerRpc};
use crate::config::LedgerConfig;
use crate::error::{ClientError, ClientResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::keccak256;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Network name, used in logs
    network: String,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: &LedgerConfig) -> ClientResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(config.poll_interval_ms));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for {}: {}", config.network, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ClientError::Config(format!(
                "No valid RPC providers for network {}",
                config.network
            )));
        }

        Ok(Self {
            network: config.network.clone(),
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        self.http_providers[idx % self.http_providers.len()].clone()
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("{} failover to provider {}", self.network, next);
    }

    /// Run an idempotent read against each provider in turn until one answers
    async fn read<T, F, Fut>(&self, what: &str, op: F) -> ClientResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for _ in 0..self.http_providers.len() {
            match op(self.http()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    // A JSON-RPC error is the node's answer, not an outage
                    if let Some(resp) = RpcError::as_error_response(&e) {
                        return Err(ClientError::Contract(format!("{}: {}", what, resp.message)));
                    }
                    warn!("Failed to {} on {}: {}", what, self.network, e);
                    last_error = Some(e.to_string());
                    self.failover();
                }
            }
        }

        Err(ClientError::Connectivity(format!(
            "All providers failed to {}: {}",
            what,
            last_error.unwrap_or_default()
        )))
    }
}

#[async_trait]
impl LedgerRpc for ChainProvider {
    async fn chain_id(&self) -> ClientResult<u64> {
        let id = self.read("get chain id", |p| async move { p.get_chainid().await }).await?;
        Ok(id.as_u64())
    }

    async fn block_number(&self) -> ClientResult<u64> {
        let block = self
            .read("get block number", |p| async move { p.get_block_number().await })
            .await?;
        Ok(block.as_u64())
    }

    async fn balance(&self, account: Address) -> ClientResult<U256> {
        self.read("get balance", |p| async move { p.get_balance(account, None).await })
            .await
    }

    async fn transaction_count(&self, account: Address) -> ClientResult<U256> {
        self.read("get transaction count", |p| async move {
            p.get_transaction_count(account, Some(BlockNumber::Pending.into()))
                .await
        })
        .await
    }

    async fn fee_market(&self) -> ClientResult<FeeMarket> {
        let block = self
            .read("get latest block", |p| async move {
                p.get_block(BlockNumber::Latest).await
            })
            .await?
            .ok_or_else(|| ClientError::Connectivity("Node returned no latest block".to_string()))?;

        Ok(FeeMarket::from_base_fee(block.base_fee_per_gas))
    }

    async fn gas_price(&self) -> ClientResult<U256> {
        self.read("get gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> ClientResult<U256> {
        self.read("estimate gas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(&tx, None).await }
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256> {
        // Single attempt, no failover
        let tx_hash = H256::from(keccak256(&raw));
        let provider = self.http();
        let sent = provider
            .send_raw_transaction(raw)
            .await
            .map(|pending| pending.tx_hash());
        match sent {
            Ok(hash) => Ok(hash),
            Err(e) => match RpcError::as_error_response(&e) {
                Some(resp) => Err(ClientError::broadcast(resp.message.clone())),
                // The node may have accepted it before the connection dropped
                None => Err(ClientError::BroadcastUncertain {
                    tx_hash,
                    reason: format!("send raw transaction on {}: {}", self.network, e),
                }),
            },
        }
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> ClientResult<Option<TransactionReceipt>> {
        self.read("get transaction receipt", |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    async fn call(&self, tx: &TypedTransaction) -> ClientResult<Bytes> {
        self.read("call contract", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, None).await }
        })
        .await
    }
}

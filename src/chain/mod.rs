//! Chain module - the ledger RPC surface used by every component
//!
//! This module provides:
//! - `LedgerRpc`, the call surface the client needs from a node
//! - `ChainProvider`, an HTTP implementation with multi-RPC failover
//! - `FeeMarket`, the node's fee-market capability for the latest block

pub mod provider;

pub use provider::ChainProvider;

use crate::error::ClientResult;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};

/// Fee-market capability of the chain as seen in the latest block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMarket {
    /// No base fee reported; a single gas price applies
    Legacy,
    /// Base-fee-aware chain
    Dynamic { base_fee: U256 },
}

impl FeeMarket {
    /// Derive the capability from an optional block base fee
    pub fn from_base_fee(base_fee: Option<U256>) -> Self {
        match base_fee {
            Some(base_fee) => FeeMarket::Dynamic { base_fee },
            None => FeeMarket::Legacy,
        }
    }
}

/// Remote ledger calls used by the settlement client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Chain ID reported by the node
    async fn chain_id(&self) -> ClientResult<u64>;

    /// Latest block number; doubles as the connectivity check
    async fn block_number(&self) -> ClientResult<u64>;

    /// Native balance of an account
    async fn balance(&self, account: Address) -> ClientResult<U256>;

    /// Transaction count of an account, including pending transactions
    async fn transaction_count(&self, account: Address) -> ClientResult<U256>;

    /// Fee-market capability of the latest block
    async fn fee_market(&self) -> ClientResult<FeeMarket>;

    /// Node's currently suggested flat gas price
    async fn gas_price(&self) -> ClientResult<U256>;

    /// Simulate a call and return its gas usage
    async fn estimate_gas(&self, tx: &TypedTransaction) -> ClientResult<U256>;

    /// Submit a signed transaction, returning its hash on acceptance
    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256>;

    /// Receipt for a transaction, if it has been included
    async fn transaction_receipt(&self, tx_hash: H256) -> ClientResult<Option<TransactionReceipt>>;

    /// Read-only contract call
    async fn call(&self, tx: &TypedTransaction) -> ClientResult<Bytes>;
}

//! Inclusion tracking for broadcast transactions

use crate::chain::LedgerRpc;
use crate::error::{ClientError, ClientResult};

use ethers::types::{TransactionReceipt, H256, U256, U64};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Execution status reported in a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Receipt of an included transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub gas_used: Option<U256>,
}

impl TxReceipt {
    /// `None` while the receipt has no block yet
    pub fn from_receipt(receipt: &TransactionReceipt) -> Option<Self> {
        let block_number = receipt.block_number?.as_u64();
        let status = if receipt.status == Some(U64::one()) {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Reverted
        };

        Some(Self {
            tx_hash: receipt.transaction_hash,
            block_number,
            status,
            gas_used: receipt.gas_used,
        })
    }
}

/// Polls the node until a transaction is included or the wait runs out
#[derive(Debug, Clone, Copy)]
pub struct ReceiptWaiter {
    poll_interval: Duration,
}

impl ReceiptWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Wait for inclusion. A reverted receipt and an expired wait are both
    /// errors; the latter leaves the outcome unknown.
    pub async fn wait(
        &self,
        rpc: &dyn LedgerRpc,
        tx_hash: H256,
        timeout: Duration,
    ) -> ClientResult<TxReceipt> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            match rpc.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    if let Some(receipt) = TxReceipt::from_receipt(&receipt) {
                        return match receipt.status {
                            ReceiptStatus::Success => {
                                info!(
                                    "Transaction {:?} included in block {}",
                                    tx_hash, receipt.block_number
                                );
                                Ok(receipt)
                            }
                            ReceiptStatus::Reverted => {
                                warn!(
                                    "Transaction {:?} reverted in block {}",
                                    tx_hash, receipt.block_number
                                );
                                Err(ClientError::ReceiptReverted {
                                    tx_hash,
                                    block_number: receipt.block_number,
                                })
                            }
                        };
                    }
                }
                Ok(None) => {
                    debug!("No receipt yet for {:?}", tx_hash);
                }
                Err(e) => {
                    // The transaction is already out; keep polling
                    warn!("Receipt poll for {:?} failed: {}", tx_hash, e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_secs = now.duration_since(started).as_secs();
                warn!("Gave up waiting for {:?} after {}s", tx_hash, waited_secs);
                return Err(ClientError::ReceiptTimeout {
                    tx_hash,
                    waited_secs,
                });
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

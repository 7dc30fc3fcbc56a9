//! Fee plan selection for base-fee-aware and legacy chains

use crate::chain::{FeeMarket, LedgerRpc};
use crate::error::{ClientError, ClientResult};
use crate::metrics;

use ethers::types::U256;
use tracing::{debug, warn};

/// Fees attached to a transaction. Exactly one scheme applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePlan {
    Legacy {
        gas_price: U256,
    },
    Dynamic {
        max_priority_fee: U256,
        max_fee: U256,
    },
}

impl FeePlan {
    /// Dynamic plan with headroom for two base-fee doublings.
    /// `None` when the base fee is too large to price.
    pub fn dynamic(base_fee: U256, max_priority_fee: U256) -> Option<Self> {
        let max_fee = base_fee
            .checked_mul(U256::from(2))?
            .checked_add(max_priority_fee)?;
        Some(FeePlan::Dynamic {
            max_priority_fee,
            max_fee,
        })
    }

    /// Worst-case fee cost in wei for `gas_limit`
    pub fn max_cost(&self, gas_limit: U256) -> U256 {
        match self {
            FeePlan::Legacy { gas_price } => gas_limit.saturating_mul(*gas_price),
            FeePlan::Dynamic { max_fee, .. } => gas_limit.saturating_mul(*max_fee),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, FeePlan::Dynamic { .. })
    }
}

/// Ordered fee strategies, tried until one yields a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeeStrategy {
    BaseFee,
    FlatGasPrice,
}

impl FeeStrategy {
    fn name(&self) -> &'static str {
        match self {
            FeeStrategy::BaseFee => "base_fee",
            FeeStrategy::FlatGasPrice => "flat_gas_price",
        }
    }

    /// `Ok(None)` means the strategy does not apply to this chain
    async fn attempt(
        &self,
        rpc: &dyn LedgerRpc,
        priority_fee: U256,
    ) -> ClientResult<Option<FeePlan>> {
        match self {
            FeeStrategy::BaseFee => match rpc.fee_market().await? {
                FeeMarket::Dynamic { base_fee } => FeePlan::dynamic(base_fee, priority_fee)
                    .map(Some)
                    .ok_or_else(|| {
                        ClientError::FeePlanUnavailable(format!("base fee {} out of range", base_fee))
                    }),
                FeeMarket::Legacy => Ok(None),
            },
            FeeStrategy::FlatGasPrice => {
                let gas_price = rpc.gas_price().await?;
                Ok(Some(FeePlan::Legacy { gas_price }))
            }
        }
    }
}

/// Chooses the fee plan for each transaction
#[derive(Debug, Clone, Copy)]
pub struct FeeStrategySelector {
    legacy_chain: bool,
}

impl FeeStrategySelector {
    /// `legacy_chain` forces the flat gas price plan (local dev chains)
    pub fn new(legacy_chain: bool) -> Self {
        Self { legacy_chain }
    }

    fn strategies(&self) -> &'static [FeeStrategy] {
        if self.legacy_chain {
            &[FeeStrategy::FlatGasPrice]
        } else {
            &[FeeStrategy::BaseFee, FeeStrategy::FlatGasPrice]
        }
    }

    /// Select a plan, falling back through the strategy list
    pub async fn select(&self, rpc: &dyn LedgerRpc, priority_fee: U256) -> ClientResult<FeePlan> {
        let mut last_error = String::from("no fee strategy applies");

        for strategy in self.strategies() {
            match strategy.attempt(rpc, priority_fee).await {
                Ok(Some(plan)) => {
                    debug!("Fee plan via {}: {:?}", strategy.name(), plan);
                    return Ok(plan);
                }
                Ok(None) => {
                    debug!("Fee strategy {} not applicable", strategy.name());
                }
                Err(e) => {
                    warn!("Fee strategy {} failed: {}", strategy.name(), e);
                    metrics::record_fee_fallback(strategy.name());
                    last_error = e.to_string();
                }
            }
        }

        Err(ClientError::FeePlanUnavailable(last_error))
    }
}

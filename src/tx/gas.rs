//! Gas limit estimation with per-operation margins

use super::builder::OperationKind;
use crate::chain::LedgerRpc;
use crate::metrics;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::{debug, warn};

/// Where a gas limit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSource {
    Estimated,
    Default,
}

/// Final gas limit, always including the operation's margin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasLimit {
    units: U256,
    source: GasSource,
}

impl GasLimit {
    /// `None` when the estimate plus margin does not fit in a U256
    pub fn estimated(estimate: U256, operation: OperationKind) -> Option<Self> {
        let units = estimate.checked_add(U256::from(operation.gas_margin()))?;
        Some(Self {
            units,
            source: GasSource::Estimated,
        })
    }

    pub fn defaulted(operation: OperationKind) -> Self {
        Self {
            units: U256::from(operation.default_gas() + operation.gas_margin()),
            source: GasSource::Default,
        }
    }

    pub fn units(&self) -> U256 {
        self.units
    }

    pub fn source(&self) -> GasSource {
        self.source
    }
}

/// Gas estimator for transactions
#[derive(Debug, Clone, Copy, Default)]
pub struct GasEstimator;

impl GasEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Estimate gas for `call`. Estimation failure is not fatal: the
    /// operation's default is used instead.
    pub async fn estimate(
        &self,
        rpc: &dyn LedgerRpc,
        call: &TypedTransaction,
        operation: OperationKind,
    ) -> GasLimit {
        let failure = match rpc.estimate_gas(call).await {
            Ok(estimate) => match GasLimit::estimated(estimate, operation) {
                Some(limit) => {
                    debug!(
                        "Gas for {}: estimate {} + margin {} = {}",
                        operation,
                        estimate,
                        operation.gas_margin(),
                        limit.units()
                    );
                    return limit;
                }
                None => format!("estimate {} out of range", estimate),
            },
            Err(e) => e.to_string(),
        };

        let limit = GasLimit::defaulted(operation);
        metrics::record_gas_fallback(operation.name());
        warn!(
            "Gas estimation for {} failed: {}. Using default {}",
            operation,
            failure,
            limit.units()
        );
        limit
    }
}

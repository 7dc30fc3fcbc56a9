//! Transaction pipeline: estimate, price, sequence, sign, broadcast, confirm

use super::builder::{TransactionBuilder, TransactionIntent};
use super::fees::{FeePlan, FeeStrategySelector};
use super::gas::{GasEstimator, GasLimit};
use super::nonce::NonceSequencer;
use super::receipt::{ReceiptWaiter, TxReceipt};
use super::signer::{AgentSigner, SignedTransaction};
use crate::chain::LedgerRpc;
use crate::error::{ClientError, ClientResult};
use crate::metrics;

use ethers::types::{H256, U256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// A transaction the node accepted into its pool
#[derive(Debug, Clone)]
pub struct SubmittedTransaction {
    pub tx_hash: H256,
    pub nonce: U256,
    pub gas_limit: GasLimit,
    pub fee_plan: FeePlan,
}

/// Hands a signed transaction to the node exactly once
pub struct Broadcaster {
    rpc: Arc<dyn LedgerRpc>,
}

impl Broadcaster {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// Broadcast and consume the signed bytes. No retry: a second attempt
    /// needs a fresh nonce and fee plan. A send lost in transit is reported
    /// as uncertain, never as unsent.
    pub async fn broadcast(&self, signed: SignedTransaction) -> ClientResult<H256> {
        let local_hash = signed.hash();

        match timeout(SEND_TIMEOUT, self.rpc.send_raw_transaction(signed.into_raw())).await {
            Ok(Ok(tx_hash)) => {
                if tx_hash != local_hash {
                    warn!(
                        "Node reported hash {:?}, locally computed {:?}",
                        tx_hash, local_hash
                    );
                }
                Ok(tx_hash)
            }
            Ok(Err(ClientError::Connectivity(reason))) => Err(ClientError::BroadcastUncertain {
                tx_hash: local_hash,
                reason,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClientError::BroadcastUncertain {
                tx_hash: local_hash,
                reason: format!("no answer after {}s", SEND_TIMEOUT.as_secs()),
            }),
        }
    }
}

/// Runs every state-changing operation through one ordered pipeline
pub struct TransactionSender {
    rpc: Arc<dyn LedgerRpc>,
    builder: TransactionBuilder,
    fees: FeeStrategySelector,
    gas: GasEstimator,
    nonces: NonceSequencer,
    broadcaster: Broadcaster,
    receipts: ReceiptWaiter,
}

impl TransactionSender {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        chain_id: u64,
        legacy_chain: bool,
        poll_interval: Duration,
    ) -> Self {
        Self {
            broadcaster: Broadcaster::new(rpc.clone()),
            rpc,
            builder: TransactionBuilder::new(chain_id),
            fees: FeeStrategySelector::new(legacy_chain),
            gas: GasEstimator::new(),
            nonces: NonceSequencer::new(),
            receipts: ReceiptWaiter::new(poll_interval),
        }
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        &self.rpc
    }

    pub fn chain_id(&self) -> u64 {
        self.builder.chain_id()
    }

    /// Submit without waiting for inclusion
    pub async fn submit(
        &self,
        signer: &AgentSigner,
        intent: &TransactionIntent,
    ) -> ClientResult<SubmittedTransaction> {
        let operation = intent.operation();
        let result = self.submit_inner(signer, intent).await;

        match &result {
            Ok(submitted) => {
                metrics::record_tx_submitted(operation.name());
                info!(
                    "{} {} sent by {:?}: {:?} (nonce {})",
                    signer.role(),
                    operation,
                    signer.address(),
                    submitted.tx_hash,
                    submitted.nonce
                );
            }
            Err(e) => {
                metrics::record_tx_failed(operation.name(), e.phase().as_str());
                warn!("{} {} failed in {}: {}", signer.role(), operation, e.phase(), e);
            }
        }

        result
    }

    /// Submit and wait for the receipt, using the intent's timeout
    pub async fn submit_and_confirm(
        &self,
        signer: &AgentSigner,
        intent: &TransactionIntent,
    ) -> ClientResult<TxReceipt> {
        let started = Instant::now();
        let submitted = self.submit(signer, intent).await?;
        let operation = intent.operation();

        match self.wait_for_receipt(submitted.tx_hash, intent.receipt_timeout()).await {
            Ok(receipt) => {
                metrics::record_tx_confirmed(operation.name(), started.elapsed().as_secs_f64());
                Ok(receipt)
            }
            Err(e) => {
                metrics::record_tx_failed(operation.name(), e.phase().as_str());
                Err(e)
            }
        }
    }

    /// Wait for a previously submitted transaction
    pub async fn wait_for_receipt(&self, tx_hash: H256, wait: Duration) -> ClientResult<TxReceipt> {
        self.receipts.wait(self.rpc.as_ref(), tx_hash, wait).await
    }

    async fn submit_inner(
        &self,
        signer: &AgentSigner,
        intent: &TransactionIntent,
    ) -> ClientResult<SubmittedTransaction> {
        if signer.role() != intent.role() {
            return Err(ClientError::Validation(format!(
                "{} must be signed by the {} agent, not {}",
                intent.operation(),
                intent.role(),
                signer.role()
            )));
        }

        let from = signer.address();
        let operation = intent.operation();
        let data = intent.encode()?;

        let call = self.builder.call_request(from, intent, data.clone());
        let gas_limit = self.gas.estimate(self.rpc.as_ref(), &call, operation).await;

        let fee_plan = self
            .fees
            .select(self.rpc.as_ref(), operation.priority_fee())
            .await?;

        // Held until the broadcast outcome is known
        let lease = self.nonces.lease(self.rpc.as_ref(), from).await?;
        let nonce = lease.nonce();

        debug!(
            "{} nonce {} gas {} worst-case fee {} wei",
            operation,
            nonce,
            gas_limit.units(),
            fee_plan.max_cost(gas_limit.units())
        );

        let tx = self
            .builder
            .build(from, intent, data, nonce, &gas_limit, &fee_plan);
        let signed = signer.sign(&tx).await?;
        let tx_hash = self.broadcaster.broadcast(signed).await?;

        lease.commit();

        Ok(SubmittedTransaction {
            tx_hash,
            nonce,
            gas_limit,
            fee_plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{FeeMarket, MockLedgerRpc};
    use crate::tx::signer::AgentRole;
    use ethers::types::{Address, TransactionReceipt, U64};
    use ethers::utils::keccak256;

    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn faucet() -> AgentSigner {
        AgentSigner::from_key(AgentRole::Faucet, DEV_KEY).unwrap()
    }

    fn consumer() -> AgentSigner {
        AgentSigner::from_key(AgentRole::Consumer, DEV_KEY).unwrap()
    }

    fn mint_intent() -> TransactionIntent {
        TransactionIntent::mint(
            Address::repeat_byte(0x22),
            Address::repeat_byte(0xab),
            U256::from(100),
        )
    }

    fn healthy_rpc() -> MockLedgerRpc {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_estimate_gas().returning(|_| Ok(U256::from(50_000)));
        rpc.expect_fee_market().returning(|| {
            Ok(FeeMarket::Dynamic {
                base_fee: U256::from(1_000_000_000u64),
            })
        });
        rpc.expect_transaction_count()
            .returning(|_| Ok(U256::zero()));
        rpc
    }

    #[tokio::test]
    async fn test_submit_returns_locally_derived_hash() {
        let mut rpc = healthy_rpc();
        rpc.expect_send_raw_transaction()
            .times(1)
            .returning(|raw| Ok(H256::from(keccak256(&raw))));

        let sender = TransactionSender::new(Arc::new(rpc), 31337, false, Duration::from_millis(5));
        let submitted = sender.submit(&faucet(), &mint_intent()).await.unwrap();

        assert_eq!(submitted.nonce, U256::zero());
        assert_eq!(submitted.gas_limit.units(), U256::from(70_000));
        assert!(submitted.fee_plan.is_dynamic());
    }

    #[tokio::test]
    async fn test_rejected_broadcast_reuses_nonce() {
        let mut rpc = healthy_rpc();
        let mut attempt = 0;
        rpc.expect_send_raw_transaction().times(2).returning(move |raw| {
            attempt += 1;
            if attempt == 1 {
                Err(ClientError::broadcast("insufficient funds for gas * price + value"))
            } else {
                Ok(H256::from(keccak256(&raw)))
            }
        });

        let sender = TransactionSender::new(Arc::new(rpc), 31337, false, Duration::from_millis(5));
        let err = sender.submit(&faucet(), &mint_intent()).await.unwrap_err();
        assert!(!err.funds_may_have_moved());

        let submitted = sender.submit(&faucet(), &mint_intent()).await.unwrap();
        assert_eq!(submitted.nonce, U256::zero());
    }

    #[tokio::test]
    async fn test_lost_send_is_uncertain_not_retryable() {
        let mut rpc = healthy_rpc();
        let seen = Arc::new(std::sync::Mutex::new(None));
        let captured = seen.clone();
        rpc.expect_send_raw_transaction().times(1).returning(move |raw| {
            *captured.lock().unwrap() = Some(H256::from(keccak256(&raw)));
            Err(ClientError::Connectivity("connection reset".into()))
        });

        let sender = TransactionSender::new(Arc::new(rpc), 31337, false, Duration::from_millis(5));
        let purchase = TransactionIntent::purchase(Address::repeat_byte(0x33), U256::from(7));
        let err = sender.submit(&consumer(), &purchase).await.unwrap_err();

        let sent_hash = seen.lock().unwrap().expect("transaction was sent");
        assert!(matches!(err, ClientError::BroadcastUncertain { tx_hash, .. } if tx_hash == sent_hash));
        assert_eq!(err.phase(), crate::error::Phase::Broadcast);
        assert!(err.funds_may_have_moved());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_role_rejected_before_any_call() {
        let rpc = MockLedgerRpc::new();
        let sender = TransactionSender::new(Arc::new(rpc), 31337, false, Duration::from_millis(5));

        let err = sender.submit(&consumer(), &mint_intent()).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(!err.funds_may_have_moved());
    }

    #[tokio::test]
    async fn test_fee_failure_stops_before_signing() {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_estimate_gas().returning(|_| Ok(U256::from(50_000)));
        rpc.expect_fee_market()
            .returning(|| Err(ClientError::Connectivity("down".into())));
        rpc.expect_gas_price()
            .returning(|| Err(ClientError::Connectivity("down".into())));
        rpc.expect_transaction_count().never();
        rpc.expect_send_raw_transaction().never();

        let sender = TransactionSender::new(Arc::new(rpc), 1, false, Duration::from_millis(5));
        let err = sender.submit(&faucet(), &mint_intent()).await.unwrap_err();
        assert!(matches!(err, ClientError::FeePlanUnavailable(_)));
    }

    #[tokio::test]
    async fn test_submit_and_confirm_reverted() {
        let mut rpc = healthy_rpc();
        rpc.expect_send_raw_transaction()
            .returning(|raw| Ok(H256::from(keccak256(&raw))));
        rpc.expect_transaction_receipt().returning(|hash| {
            Ok(Some(TransactionReceipt {
                transaction_hash: hash,
                block_number: Some(U64::from(3)),
                status: Some(U64::zero()),
                ..Default::default()
            }))
        });

        let sender = TransactionSender::new(Arc::new(rpc), 31337, false, Duration::from_millis(5));
        let err = sender
            .submit_and_confirm(&faucet(), &mint_intent())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ReceiptReverted { block_number: 3, .. }));
    }
}

//! Approve-then-purchase settlement
//!
//! A purchase pulls the listing price from the buyer through the token's
//! allowance mechanism. The gate reads the current allowance, approves the
//! exact price only when it falls short, and never submits the purchase
//! unless the approval was confirmed.

use crate::contracts::{read_contract, single_uint, ContractAddresses, ContractKind};
use crate::error::{ClientError, ClientResult};
use crate::tx::{AgentSigner, TransactionIntent, TransactionSender, TxReceipt};

use ethers::abi::Token;
use ethers::types::{Address, U256};
use serde::Serialize;
use tracing::{debug, info};

/// Steps of a purchase flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PurchaseState {
    Start,
    CheckAllowance,
    Approving,
    Approved,
    Purchasing,
    Purchased,
    ApprovalFailed,
    PurchaseFailed,
}

/// Outcome of a completed purchase
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub listing_id: U256,
    pub price: U256,
    /// Present only when an approval had to be submitted
    pub approval: Option<TxReceipt>,
    pub purchase: TxReceipt,
    /// Terminal step the flow reached
    pub state: PurchaseState,
}

/// Ensures spending rights exist before purchasing
pub struct AllowanceGate<'a> {
    sender: &'a TransactionSender,
    contracts: ContractAddresses,
}

impl<'a> AllowanceGate<'a> {
    pub fn new(sender: &'a TransactionSender, contracts: ContractAddresses) -> Self {
        Self { sender, contracts }
    }

    /// Amount `owner` lets the registry pull from their token balance
    pub async fn current_allowance(&self, owner: Address) -> ClientResult<U256> {
        let tokens = read_contract(
            self.sender.rpc().as_ref(),
            ContractKind::Token,
            self.contracts.token,
            "allowance",
            &[
                Token::Address(owner),
                Token::Address(self.contracts.data_registry),
            ],
        )
        .await?;
        single_uint(tokens, "allowance")
    }

    /// Approve if needed, then purchase `listing_id` at `price`
    pub async fn purchase(
        &self,
        buyer: &AgentSigner,
        listing_id: U256,
        price: U256,
    ) -> ClientResult<PurchaseReceipt> {
        let mut state = PurchaseState::Start;
        advance(&mut state, PurchaseState::CheckAllowance, listing_id);

        let allowance = self.current_allowance(buyer.address()).await?;
        let needs_approval = allowance < price;

        let approval = if needs_approval {
            info!(
                "Allowance {} below price {} for listing {}, approving",
                allowance, price, listing_id
            );
            advance(&mut state, PurchaseState::Approving, listing_id);

            let intent = TransactionIntent::approve(
                self.contracts.token,
                self.contracts.data_registry,
                price,
            );
            match self.sender.submit_and_confirm(buyer, &intent).await {
                Ok(receipt) => {
                    advance(&mut state, PurchaseState::Approved, listing_id);
                    Some(receipt)
                }
                Err(e) => {
                    advance(&mut state, PurchaseState::ApprovalFailed, listing_id);
                    return Err(ClientError::ApprovalFailed(Box::new(e)));
                }
            }
        } else {
            debug!("Allowance {} covers price {}", allowance, price);
            None
        };

        advance(&mut state, PurchaseState::Purchasing, listing_id);
        let intent = TransactionIntent::purchase(self.contracts.data_registry, listing_id)
            .chained(needs_approval);

        match self.sender.submit_and_confirm(buyer, &intent).await {
            Ok(purchase) => {
                advance(&mut state, PurchaseState::Purchased, listing_id);
                Ok(PurchaseReceipt {
                    listing_id,
                    price,
                    approval,
                    purchase,
                    state,
                })
            }
            Err(e) => {
                advance(&mut state, PurchaseState::PurchaseFailed, listing_id);
                Err(e)
            }
        }
    }
}

fn advance(state: &mut PurchaseState, next: PurchaseState, listing_id: U256) {
    debug!("Purchase of listing {}: {:?} -> {:?}", listing_id, state, next);
    *state = next;
}

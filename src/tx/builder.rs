//! Transaction intents, per-operation profiles and request assembly

use super::fees::FeePlan;
use super::gas::GasLimit;
use super::signer::AgentRole;
use crate::contracts::ContractKind;
use crate::error::ClientResult;

use ethers::abi::Token;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;

const GWEI: u64 = 1_000_000_000;

/// Top-level transactional operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Mint,
    ListData,
    Approve,
    Purchase,
}

impl OperationKind {
    /// Name used in logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Mint => "mint",
            OperationKind::ListData => "list_data",
            OperationKind::Approve => "approve",
            OperationKind::Purchase => "purchase",
        }
    }

    /// Safety margin added to every gas limit
    pub fn gas_margin(&self) -> u64 {
        match self {
            OperationKind::Mint => 20_000,
            OperationKind::ListData => 30_000,
            OperationKind::Approve => 20_000,
            OperationKind::Purchase => 30_000,
        }
    }

    /// Gas used when estimation fails
    pub fn default_gas(&self) -> u64 {
        match self {
            OperationKind::Mint => 200_000,
            OperationKind::ListData => 500_000,
            OperationKind::Approve => 100_000,
            OperationKind::Purchase => 300_000,
        }
    }

    /// Priority fee for base-fee-aware chains
    pub fn priority_fee(&self) -> U256 {
        match self {
            OperationKind::Mint => U256::from(2 * GWEI),
            OperationKind::ListData | OperationKind::Approve | OperationKind::Purchase => {
                U256::from(3 * GWEI / 2)
            }
        }
    }

    /// How long to wait for inclusion. Flows chaining approval and purchase
    /// get the longer budget.
    pub fn receipt_timeout(&self, chained: bool) -> Duration {
        match (self, chained) {
            (OperationKind::Approve, _) | (OperationKind::Purchase, true) => {
                Duration::from_secs(240)
            }
            _ => Duration::from_secs(180),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What an agent wants the ledger to do. Immutable once built.
#[derive(Debug, Clone)]
pub struct TransactionIntent {
    operation: OperationKind,
    role: AgentRole,
    contract: ContractKind,
    target: Address,
    method: &'static str,
    args: Vec<Token>,
    chained: bool,
}

impl TransactionIntent {
    /// Token `mint(recipient, amount)`
    pub fn mint(token: Address, recipient: Address, amount: U256) -> Self {
        Self::new(
            OperationKind::Mint,
            AgentRole::Faucet,
            ContractKind::Token,
            token,
            "mint",
            vec![Token::Address(recipient), Token::Uint(amount)],
        )
    }

    /// Registry `listData(name, description, dataCID, metadataCID, price)`
    pub fn list_data(
        registry: Address,
        name: &str,
        description: &str,
        data_cid: &str,
        metadata_cid: &str,
        price: U256,
    ) -> Self {
        Self::new(
            OperationKind::ListData,
            AgentRole::Producer,
            ContractKind::DataRegistry,
            registry,
            "listData",
            vec![
                Token::String(name.to_string()),
                Token::String(description.to_string()),
                Token::String(data_cid.to_string()),
                Token::String(metadata_cid.to_string()),
                Token::Uint(price),
            ],
        )
    }

    /// Token `approve(spender, amount)`, sized exactly to `amount`
    pub fn approve(token: Address, spender: Address, amount: U256) -> Self {
        Self::new(
            OperationKind::Approve,
            AgentRole::Consumer,
            ContractKind::Token,
            token,
            "approve",
            vec![Token::Address(spender), Token::Uint(amount)],
        )
    }

    /// Registry `purchaseData(listingId)`
    pub fn purchase(registry: Address, listing_id: U256) -> Self {
        Self::new(
            OperationKind::Purchase,
            AgentRole::Consumer,
            ContractKind::DataRegistry,
            registry,
            "purchaseData",
            vec![Token::Uint(listing_id)],
        )
    }

    fn new(
        operation: OperationKind,
        role: AgentRole,
        contract: ContractKind,
        target: Address,
        method: &'static str,
        args: Vec<Token>,
    ) -> Self {
        Self {
            operation,
            role,
            contract,
            target,
            method,
            args,
            chained: false,
        }
    }

    /// Mark this intent as one step of a chained approve-then-purchase flow
    pub fn chained(mut self, chained: bool) -> Self {
        self.chained = chained;
        self
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn receipt_timeout(&self) -> Duration {
        self.operation.receipt_timeout(self.chained)
    }

    /// ABI-encoded call data
    pub fn encode(&self) -> ClientResult<Bytes> {
        self.contract.encode_call(self.method, &self.args)
    }
}

/// Assembles transaction requests. Pure, performs no I/O.
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    chain_id: u64,
}

impl TransactionBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Unsigned call description used for gas estimation
    pub fn call_request(
        &self,
        from: Address,
        intent: &TransactionIntent,
        data: Bytes,
    ) -> TypedTransaction {
        let tx = TransactionRequest::new()
            .from(from)
            .to(intent.target())
            .data(data)
            .chain_id(self.chain_id);
        TypedTransaction::Legacy(tx)
    }

    /// Read-only call request
    pub fn view_request(to: Address, data: Bytes) -> TypedTransaction {
        TypedTransaction::Legacy(TransactionRequest::new().to(to).data(data))
    }

    /// Complete request; fee plan and gas limit must already be resolved
    pub fn build(
        &self,
        from: Address,
        intent: &TransactionIntent,
        data: Bytes,
        nonce: U256,
        gas_limit: &GasLimit,
        fee_plan: &FeePlan,
    ) -> TypedTransaction {
        match *fee_plan {
            FeePlan::Legacy { gas_price } => {
                let tx = TransactionRequest::new()
                    .from(from)
                    .to(intent.target())
                    .data(data)
                    .nonce(nonce)
                    .gas(gas_limit.units())
                    .gas_price(gas_price)
                    .chain_id(self.chain_id);
                TypedTransaction::Legacy(tx)
            }
            FeePlan::Dynamic {
                max_priority_fee,
                max_fee,
            } => {
                let tx = Eip1559TransactionRequest::new()
                    .from(from)
                    .to(intent.target())
                    .data(data)
                    .nonce(nonce)
                    .gas(gas_limit.units())
                    .max_fee_per_gas(max_fee)
                    .max_priority_fee_per_gas(max_priority_fee)
                    .chain_id(self.chain_id);
                TypedTransaction::Eip1559(tx)
            }
        }
    }
}

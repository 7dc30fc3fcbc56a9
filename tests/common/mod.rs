//! In-process ledger that executes signed marketplace transactions

#![allow(dead_code)]

use async_trait::async_trait;
use auraweave_agent::chain::{FeeMarket, LedgerRpc};
use auraweave_agent::content::{ContentAddress, ContentSource};
use auraweave_agent::contracts::{ContractAddresses, ContractKind, Listing};
use auraweave_agent::{ClientError, ClientOptions, ClientResult, MarketClient};
use ethers::abi::{Function, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use ethers::utils::keccak256;
use ethers::utils::rlp::Rlp;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FAUCET_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const PRODUCER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const CONSUMER_KEY: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

pub fn token_address() -> Address {
    Address::repeat_byte(0x22)
}

pub fn registry_address() -> Address {
    Address::repeat_byte(0x33)
}

/// Whole token units at 18 decimals
pub fn units(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

/// A state-changing call the ledger accepted
#[derive(Debug, Clone)]
pub struct SentCall {
    pub hash: H256,
    pub from: Address,
    pub to: Address,
    pub nonce: U256,
    pub method: String,
    pub args: Vec<Token>,
    pub dynamic_fee: bool,
    pub gas: U256,
    /// Legacy gas price
    pub gas_price: Option<U256>,
    pub max_fee: Option<U256>,
    pub max_priority_fee: Option<U256>,
    pub succeeded: bool,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    listings: BTreeMap<U256, Listing>,
    nonces: HashMap<Address, U256>,
    receipts: HashMap<H256, TransactionReceipt>,
    sent: Vec<SentCall>,
    reverting: HashSet<String>,
    rejecting_sends: Option<String>,
    block: u64,
}

pub struct FakeLedger {
    chain_id: u64,
    base_fee: Option<U256>,
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn local() -> Arc<Self> {
        Arc::new(Self::new(LOCAL_CHAIN_ID, None))
    }

    pub fn with_base_fee(chain_id: u64, base_fee: U256) -> Arc<Self> {
        Arc::new(Self::new(chain_id, Some(base_fee)))
    }

    fn new(chain_id: u64, base_fee: Option<U256>) -> Self {
        Self {
            chain_id,
            base_fee,
            state: Mutex::new(LedgerState {
                block: 100,
                ..Default::default()
            }),
        }
    }

    pub fn set_token_balance(&self, account: Address, amount: U256) {
        self.state.lock().unwrap().balances.insert(account, amount);
    }

    pub fn set_allowance(&self, owner: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((owner, spender), amount);
    }

    pub fn insert_listing(&self, listing: Listing) {
        self.state.lock().unwrap().listings.insert(listing.id, listing);
    }

    /// Transactions calling `method` are included but revert
    pub fn revert_method(&self, method: &str) {
        self.state.lock().unwrap().reverting.insert(method.to_string());
    }

    /// Every broadcast is refused by the node with `message`
    pub fn reject_sends(&self, message: &str) {
        self.state.lock().unwrap().rejecting_sends = Some(message.to_string());
    }

    pub fn token_balance_of(&self, account: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    pub fn allowance_of(&self, owner: Address, spender: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<SentCall> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_methods(&self) -> Vec<String> {
        self.sent().into_iter().map(|c| c.method).collect()
    }

    pub fn listing(&self, id: u64) -> Option<Listing> {
        self.state.lock().unwrap().listings.get(&U256::from(id)).cloned()
    }

    fn contract_at(to: Address) -> Option<ContractKind> {
        if to == token_address() {
            Some(ContractKind::Token)
        } else if to == registry_address() {
            Some(ContractKind::DataRegistry)
        } else {
            None
        }
    }

    fn decode_call(to: Address, data: &[u8]) -> ClientResult<(ContractKind, Function, Vec<Token>)> {
        let kind = Self::contract_at(to)
            .ok_or_else(|| ClientError::Contract(format!("no contract at {:?}", to)))?;
        if data.len() < 4 {
            return Err(ClientError::Contract("call data too short".into()));
        }
        let function = kind
            .abi()
            .functions()
            .find(|f| f.short_signature()[..] == data[..4])
            .cloned()
            .ok_or_else(|| ClientError::Contract("unknown selector".into()))?;
        let args = function
            .decode_input(&data[4..])
            .map_err(|e| ClientError::Contract(e.to_string()))?;
        Ok((kind, function, args))
    }

    /// Apply a state-changing call; `false` means it reverted
    fn execute(state: &mut LedgerState, from: Address, method: &str, args: &[Token]) -> bool {
        if state.reverting.contains(method) {
            return false;
        }

        match (method, args) {
            ("mint", [Token::Address(to), Token::Uint(amount)]) => {
                *state.balances.entry(*to).or_default() += *amount;
                true
            }
            ("approve", [Token::Address(spender), Token::Uint(amount)]) => {
                state.allowances.insert((from, *spender), *amount);
                true
            }
            (
                "listData",
                [Token::String(name), Token::String(description), Token::String(data_cid), Token::String(metadata_cid), Token::Uint(price)],
            ) => {
                let id = state
                    .listings
                    .keys()
                    .next_back()
                    .map(|id| *id + 1)
                    .unwrap_or_else(U256::one);
                state.listings.insert(
                    id,
                    Listing {
                        id,
                        seller: from,
                        name: name.clone(),
                        description: description.clone(),
                        data_cid: data_cid.clone(),
                        metadata_cid: metadata_cid.clone(),
                        price: *price,
                        active: true,
                    },
                );
                true
            }
            ("purchaseData", [Token::Uint(id)]) => {
                let Some(listing) = state.listings.get(id).cloned() else {
                    return false;
                };
                let allowance = state
                    .allowances
                    .get(&(from, registry_address()))
                    .copied()
                    .unwrap_or_default();
                let balance = state.balances.get(&from).copied().unwrap_or_default();
                if !listing.active || allowance < listing.price || balance < listing.price {
                    return false;
                }
                state
                    .allowances
                    .insert((from, registry_address()), allowance - listing.price);
                state.balances.insert(from, balance - listing.price);
                *state.balances.entry(listing.seller).or_default() += listing.price;
                true
            }
            _ => false,
        }
    }

    fn view(state: &LedgerState, method: &str, args: &[Token]) -> ClientResult<Token> {
        match (method, args) {
            ("balanceOf", [Token::Address(account)]) => Ok(Token::Uint(
                state.balances.get(account).copied().unwrap_or_default(),
            )),
            ("allowance", [Token::Address(owner), Token::Address(spender)]) => Ok(Token::Uint(
                state
                    .allowances
                    .get(&(*owner, *spender))
                    .copied()
                    .unwrap_or_default(),
            )),
            ("getListing", [Token::Uint(id)]) => state
                .listings
                .get(id)
                .cloned()
                .map(Listing::into_token)
                .ok_or_else(|| ClientError::Contract("execution reverted: no such listing".into())),
            ("getActiveListingsDetails", [Token::Uint(limit), Token::Uint(offset)]) => {
                let page = state
                    .listings
                    .values()
                    .filter(|l| l.active)
                    .skip(offset.as_usize())
                    .take(limit.as_usize())
                    .cloned()
                    .map(Listing::into_token)
                    .collect();
                Ok(Token::Array(page))
            }
            _ => Err(ClientError::Contract(format!("{} is not a view", method))),
        }
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn chain_id(&self) -> ClientResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> ClientResult<u64> {
        Ok(self.state.lock().unwrap().block)
    }

    async fn balance(&self, _account: Address) -> ClientResult<U256> {
        Ok(units(10))
    }

    async fn transaction_count(&self, account: Address) -> ClientResult<U256> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .nonces
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    async fn fee_market(&self) -> ClientResult<FeeMarket> {
        Ok(FeeMarket::from_base_fee(self.base_fee))
    }

    async fn gas_price(&self) -> ClientResult<U256> {
        Ok(U256::from(1_000_000_000u64))
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> ClientResult<U256> {
        Ok(U256::from(60_000))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ClientResult<H256> {
        let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(&raw))
            .map_err(|e| ClientError::broadcast(format!("invalid transaction: {}", e)))?;
        let from = signature
            .recover(tx.sighash())
            .map_err(|e| ClientError::broadcast(format!("invalid signature: {}", e)))?;
        let to = tx
            .to_addr()
            .copied()
            .ok_or_else(|| ClientError::broadcast("contract creation not supported"))?;
        let nonce = tx.nonce().copied().unwrap_or_default();
        let data = tx.data().cloned().unwrap_or_default();
        let (_, function, args) = Self::decode_call(to, &data)?;

        let hash = H256::from(keccak256(&raw));
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.rejecting_sends {
            return Err(ClientError::broadcast(message.clone()));
        }

        let expected = state.nonces.get(&from).copied().unwrap_or_default();
        if nonce != expected {
            return Err(ClientError::broadcast(format!(
                "nonce too low: next nonce {}, tx nonce {}",
                expected, nonce
            )));
        }
        state.nonces.insert(from, expected + 1);

        let succeeded = Self::execute(&mut state, from, &function.name, &args);
        state.block += 1;
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(state.block)),
            status: Some(U64::from(succeeded as u64)),
            from,
            to: Some(to),
            gas_used: Some(U256::from(55_000)),
            ..Default::default()
        };
        state.receipts.insert(hash, receipt);
        state.sent.push(SentCall {
            hash,
            from,
            to,
            nonce,
            method: function.name.clone(),
            args,
            dynamic_fee: matches!(tx, TypedTransaction::Eip1559(_)),
            gas: tx.gas().copied().unwrap_or_default(),
            gas_price: match &tx {
                TypedTransaction::Legacy(inner) => inner.gas_price,
                _ => None,
            },
            max_fee: match &tx {
                TypedTransaction::Eip1559(inner) => inner.max_fee_per_gas,
                _ => None,
            },
            max_priority_fee: match &tx {
                TypedTransaction::Eip1559(inner) => inner.max_priority_fee_per_gas,
                _ => None,
            },
            succeeded,
        });

        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> ClientResult<Option<TransactionReceipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }

    async fn call(&self, tx: &TypedTransaction) -> ClientResult<Bytes> {
        let to = tx
            .to_addr()
            .copied()
            .ok_or_else(|| ClientError::Contract("call without target".into()))?;
        let data = tx.data().cloned().unwrap_or_default();
        let (_, function, args) = Self::decode_call(to, &data)?;

        let state = self.state.lock().unwrap();
        let output = Self::view(&state, &function.name, &args)?;
        Ok(Bytes::from(ethers::abi::encode(&[output])))
    }
}

/// Client options pointing at the fake contracts
pub fn options() -> ClientOptions {
    ClientOptions {
        contracts: ContractAddresses {
            data_registry: registry_address(),
            token: token_address(),
        },
        token_decimals: 18,
        legacy_chain_ids: vec![1337, LOCAL_CHAIN_ID],
        poll_interval: Duration::from_millis(10),
    }
}

pub async fn connect(ledger: &Arc<FakeLedger>) -> MarketClient {
    MarketClient::with_rpc(ledger.clone(), options())
        .await
        .expect("client connects to fake ledger")
}

pub fn listing(id: u64, seller: Address, price: U256) -> Listing {
    Listing {
        id: U256::from(id),
        seller,
        name: format!("Sensor feed {}", id),
        description: "Temp, Humidity, CO2".to_string(),
        data_cid: "bafkreifysyerz2fucm62r5u3746kfukuklaj54urpcx5uy3xkbsxzrnzdq".to_string(),
        metadata_cid: String::new(),
        price,
        active: true,
    }
}

/// Content source serving fixed bytes and counting requests
pub struct CountingSource {
    pub name: &'static str,
    pub body: Option<Vec<u8>>,
    pub requests: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn serving(name: &'static str, body: &[u8]) -> Self {
        Self {
            name,
            body: Some(body.to_vec()),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unreachable(name: &'static str) -> Self {
        Self {
            name,
            body: None,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ContentSource for CountingSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _address: &ContentAddress) -> ClientResult<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.body
            .clone()
            .ok_or_else(|| ClientError::Connectivity(format!("{} unreachable", self.name)))
    }
}

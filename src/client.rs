//! Marketplace client shared by the producer, consumer and faucet agents

use crate::chain::{ChainProvider, LedgerRpc};
use crate::config::Settings;
use crate::content::{ContentAddress, ContentFetcher, Payload};
use crate::contracts::{
    format_base_units, parse_address, read_contract, single_uint, to_base_units,
    ContractAddresses, ContractKind, Listing,
};
use crate::discovery::ListingDiscovery;
use crate::error::{ClientError, ClientResult};
use crate::settlement::{AllowanceGate, PurchaseReceipt};
use crate::tx::{AgentSigner, SubmittedTransaction, TransactionIntent, TransactionSender, TxReceipt};

use ethers::abi::Token;
use ethers::types::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Connection parameters that do not depend on the transport
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub contracts: ContractAddresses,
    pub token_decimals: u32,
    pub legacy_chain_ids: Vec<u64>,
    pub poll_interval: Duration,
}

impl ClientOptions {
    pub fn from_settings(settings: &Settings) -> ClientResult<Self> {
        let contracts =
            ContractAddresses::parse(&settings.contracts.data_registry, &settings.contracts.token)
                .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            contracts,
            token_decimals: settings.contracts.token_decimals,
            legacy_chain_ids: settings.ledger.legacy_chain_ids.clone(),
            poll_interval: Duration::from_millis(settings.ledger.poll_interval_ms),
        })
    }
}

/// A new listing, with the price in whole token units
#[derive(Debug, Clone, Default)]
pub struct ListingDraft {
    pub name: String,
    pub description: String,
    pub data_cid: String,
    pub metadata_cid: String,
    pub price_units: String,
}

/// A purchase together with the payload it paid for
#[derive(Debug, Clone, Serialize)]
pub struct DeliveredPurchase {
    pub listing: Listing,
    pub receipt: PurchaseReceipt,
    pub payload: Payload,
}

/// Connected client context. Built once and shared by every operation.
pub struct MarketClient {
    chain_id: u64,
    contracts: ContractAddresses,
    token_decimals: u32,
    sender: TransactionSender,
    discovery: ListingDiscovery,
}

impl MarketClient {
    /// Connect using configured RPC endpoints
    pub async fn connect(settings: &Settings) -> ClientResult<Self> {
        let provider = ChainProvider::new(&settings.ledger)?;
        let options = ClientOptions::from_settings(settings)?;
        Self::with_rpc(Arc::new(provider), options).await
    }

    /// Connect over an existing ledger transport
    pub async fn with_rpc(rpc: Arc<dyn LedgerRpc>, options: ClientOptions) -> ClientResult<Self> {
        let block = rpc.block_number().await.map_err(|e| match e {
            ClientError::Connectivity(_) => e,
            other => ClientError::Connectivity(other.to_string()),
        })?;
        let chain_id = rpc.chain_id().await?;
        let legacy_chain = options.legacy_chain_ids.contains(&chain_id);

        info!(
            "Connected to chain {} at block {}{}",
            chain_id,
            block,
            if legacy_chain { " (legacy fees)" } else { "" }
        );

        Ok(Self {
            chain_id,
            contracts: options.contracts,
            token_decimals: options.token_decimals,
            sender: TransactionSender::new(rpc.clone(), chain_id, legacy_chain, options.poll_interval),
            discovery: ListingDiscovery::new(rpc, options.contracts.data_registry),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn contracts(&self) -> &ContractAddresses {
        &self.contracts
    }

    pub fn token_decimals(&self) -> u32 {
        self.token_decimals
    }

    fn rpc(&self) -> &dyn LedgerRpc {
        self.sender.rpc().as_ref()
    }

    /// Whole token units to base units
    pub fn to_base_units(&self, units: &str) -> ClientResult<U256> {
        to_base_units(units, self.token_decimals)
    }

    /// Base units to whole token units
    pub fn format_units(&self, amount: U256) -> String {
        format_base_units(amount, self.token_decimals)
    }

    fn mint_intent(&self, recipient: &str, amount_units: &str) -> ClientResult<TransactionIntent> {
        let recipient = parse_address(recipient)?;
        let amount = self.to_base_units(amount_units)?;
        if amount.is_zero() {
            return Err(ClientError::Validation("Mint amount must be positive".to_string()));
        }
        Ok(TransactionIntent::mint(self.contracts.token, recipient, amount))
    }

    /// Mint tokens to `recipient` without waiting for inclusion
    pub async fn mint_tokens(
        &self,
        faucet: &AgentSigner,
        recipient: &str,
        amount_units: &str,
    ) -> ClientResult<SubmittedTransaction> {
        let intent = self.mint_intent(recipient, amount_units)?;
        self.sender.submit(faucet, &intent).await
    }

    /// Mint tokens and wait for the receipt
    pub async fn mint_and_confirm(
        &self,
        faucet: &AgentSigner,
        recipient: &str,
        amount_units: &str,
    ) -> ClientResult<TxReceipt> {
        let intent = self.mint_intent(recipient, amount_units)?;
        self.sender.submit_and_confirm(faucet, &intent).await
    }

    /// Publish a listing
    pub async fn list_data(&self, producer: &AgentSigner, draft: &ListingDraft) -> ClientResult<TxReceipt> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(ClientError::Validation("Listing name is required".to_string()));
        }

        let data_cid = ContentAddress::parse(&draft.data_cid)
            .map_err(|e| ClientError::Validation(format!("Data CID: {}", e)))?;
        let metadata_cid = if draft.metadata_cid.trim().is_empty() {
            String::new()
        } else {
            ContentAddress::parse(&draft.metadata_cid)
                .map_err(|e| ClientError::Validation(format!("Metadata CID: {}", e)))?
                .to_string()
        };

        let price = self.to_base_units(&draft.price_units)?;
        if price.is_zero() {
            return Err(ClientError::Validation("Listing price must be positive".to_string()));
        }

        let intent = TransactionIntent::list_data(
            self.contracts.data_registry,
            name,
            &draft.description,
            data_cid.as_str(),
            &metadata_cid,
            price,
        );
        let receipt = self.sender.submit_and_confirm(producer, &intent).await?;
        info!(
            "Listed '{}' at {} tokens in block {}",
            name, draft.price_units, receipt.block_number
        );
        Ok(receipt)
    }

    /// Purchase a listing, approving the price first if needed
    pub async fn purchase(&self, consumer: &AgentSigner, listing_id: U256) -> ClientResult<PurchaseReceipt> {
        let listing = self.get_listing(listing_id).await?;
        self.purchase_listing(consumer, &listing).await
    }

    async fn purchase_listing(
        &self,
        consumer: &AgentSigner,
        listing: &Listing,
    ) -> ClientResult<PurchaseReceipt> {
        let buyer = consumer.address();

        if !listing.active {
            return Err(ClientError::PurchaseAborted(format!(
                "listing {} is not active",
                listing.id
            )));
        }
        if listing.seller == buyer {
            return Err(ClientError::PurchaseAborted(format!(
                "listing {} belongs to the buyer",
                listing.id
            )));
        }

        let balance = self.token_balance(buyer).await?;
        if balance < listing.price {
            return Err(ClientError::PurchaseAborted(format!(
                "balance {} is below price {}",
                self.format_units(balance),
                self.format_units(listing.price)
            )));
        }

        AllowanceGate::new(&self.sender, self.contracts)
            .purchase(consumer, listing.id, listing.price)
            .await
    }

    /// Purchase a listing and retrieve its payload
    pub async fn purchase_and_fetch(
        &self,
        consumer: &AgentSigner,
        listing_id: U256,
        fetcher: &ContentFetcher,
    ) -> ClientResult<DeliveredPurchase> {
        let listing = self.get_listing(listing_id).await?;
        let receipt = self.purchase_listing(consumer, &listing).await?;

        let payload = fetcher.fetch(&listing.data_cid).await.map_err(|e| {
            warn!(
                "Listing {} purchased in tx {:?} but payload retrieval failed",
                listing.id, receipt.purchase.tx_hash
            );
            e
        })?;

        Ok(DeliveredPurchase {
            listing,
            receipt,
            payload,
        })
    }

    /// Token balance in base units
    pub async fn token_balance(&self, account: Address) -> ClientResult<U256> {
        let tokens = read_contract(
            self.rpc(),
            ContractKind::Token,
            self.contracts.token,
            "balanceOf",
            &[Token::Address(account)],
        )
        .await?;
        single_uint(tokens, "balanceOf")
    }

    /// Amount `owner` has approved the registry to spend
    pub async fn allowance(&self, owner: Address) -> ClientResult<U256> {
        AllowanceGate::new(&self.sender, self.contracts)
            .current_allowance(owner)
            .await
    }

    /// Native balance in wei
    pub async fn native_balance(&self, account: Address) -> ClientResult<U256> {
        self.rpc().balance(account).await
    }

    pub async fn get_listing(&self, listing_id: U256) -> ClientResult<Listing> {
        self.discovery.get_listing(listing_id).await
    }

    /// Active listings; failures are logged and yield an empty list
    pub async fn discover_listings(&self, limit: u64, offset: u64) -> Vec<Listing> {
        self.discovery.discover(limit, offset).await
    }

    /// Active listings, surfacing query failures
    pub async fn try_discover_listings(&self, limit: u64, offset: u64) -> ClientResult<Vec<Listing>> {
        self.discovery.try_discover(limit, offset).await
    }
}

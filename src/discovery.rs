//! Listing discovery against the DataRegistry contract

use crate::chain::LedgerRpc;
use crate::contracts::{read_contract, ContractKind, Listing};
use crate::error::{ClientError, ClientResult};

use ethers::abi::Token;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, error};

/// Read-only view over the registry's listings
pub struct ListingDiscovery {
    rpc: Arc<dyn LedgerRpc>,
    registry: Address,
}

impl ListingDiscovery {
    pub fn new(rpc: Arc<dyn LedgerRpc>, registry: Address) -> Self {
        Self { rpc, registry }
    }

    /// Active listings in the `[offset, offset + limit)` window
    pub async fn try_discover(&self, limit: u64, offset: u64) -> ClientResult<Vec<Listing>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let tokens = read_contract(
            self.rpc.as_ref(),
            ContractKind::DataRegistry,
            self.registry,
            "getActiveListingsDetails",
            &[Token::Uint(U256::from(limit)), Token::Uint(U256::from(offset))],
        )
        .await
        .map_err(|e| ClientError::Discovery(e.to_string()))?;

        let entries = match tokens.into_iter().next() {
            Some(Token::Array(entries)) => entries,
            other => {
                return Err(ClientError::Discovery(format!(
                    "Expected listing array, got {:?}",
                    other
                )))
            }
        };

        let mut listings = Vec::with_capacity(entries.len());
        for entry in entries {
            let listing =
                Listing::from_token(entry).map_err(|e| ClientError::Discovery(e.to_string()))?;
            if listing.active {
                listings.push(listing);
            }
        }

        debug!(
            "Discovered {} active listings (limit {}, offset {})",
            listings.len(),
            limit,
            offset
        );
        Ok(listings)
    }

    /// Like `try_discover`, but a failed query yields no listings
    pub async fn discover(&self, limit: u64, offset: u64) -> Vec<Listing> {
        match self.try_discover(limit, offset).await {
            Ok(listings) => listings,
            Err(e) => {
                error!("{}", e);
                Vec::new()
            }
        }
    }

    /// A single listing by id, active or not
    pub async fn get_listing(&self, listing_id: U256) -> ClientResult<Listing> {
        let tokens = read_contract(
            self.rpc.as_ref(),
            ContractKind::DataRegistry,
            self.registry,
            "getListing",
            &[Token::Uint(listing_id)],
        )
        .await?;

        let token = tokens
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Contract(format!("getListing({}) returned nothing", listing_id)))?;
        Listing::from_token(token)
    }
}

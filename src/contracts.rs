//! Contract call surface for the DataRegistry settlement contract and the
//! MockUSDC fungible token.
//!
//! Listings are decoded through a single schema, the 8-field tuple
//! `(id, seller, name, description, dataCID, metadataCID, price, active)`.

use crate::chain::LedgerRpc;
use crate::error::{ClientError, ClientResult};
use crate::tx::TransactionBuilder;

use ethers::abi::{parse_abi, Abi, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::{format_units, parse_units};
use lazy_static::lazy_static;
use serde::Serialize;

lazy_static! {
    pub static ref DATA_REGISTRY_ABI: Abi = parse_abi(&[
        "struct Listing { uint256 id; address seller; string name; string description; string dataCID; string metadataCID; uint256 price; bool active; }",
        "function listData(string name, string description, string dataCID, string metadataCID, uint256 price) external returns (uint256)",
        "function purchaseData(uint256 listingId) external",
        "function getListing(uint256 listingId) external view returns (Listing)",
        "function getActiveListingsDetails(uint256 limit, uint256 offset) external view returns (Listing[])",
    ])
    .unwrap();

    pub static ref TOKEN_ABI: Abi = parse_abi(&[
        "function mint(address to, uint256 amount) external",
        "function approve(address spender, uint256 amount) external returns (bool)",
        "function allowance(address owner, address spender) external view returns (uint256)",
        "function balanceOf(address account) external view returns (uint256)",
    ])
    .unwrap();
}

/// Number of fields in the listing tuple
pub const LISTING_FIELDS: usize = 8;

/// Contracts the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    DataRegistry,
    Token,
}

impl ContractKind {
    pub fn abi(&self) -> &'static Abi {
        match self {
            ContractKind::DataRegistry => &DATA_REGISTRY_ABI,
            ContractKind::Token => &TOKEN_ABI,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContractKind::DataRegistry => "DataRegistry",
            ContractKind::Token => "MockERC20",
        }
    }

    /// ABI-encode a call to `method`
    pub fn encode_call(&self, method: &str, args: &[Token]) -> ClientResult<Bytes> {
        let function = self
            .abi()
            .function(method)
            .map_err(|e| ClientError::Contract(format!("{}.{}: {}", self.name(), method, e)))?;

        function
            .encode_input(args)
            .map(Bytes::from)
            .map_err(|e| ClientError::Contract(format!("encode {}.{}: {}", self.name(), method, e)))
    }

    /// Decode the return data of `method`
    pub fn decode_output(&self, method: &str, data: &[u8]) -> ClientResult<Vec<Token>> {
        let function = self
            .abi()
            .function(method)
            .map_err(|e| ClientError::Contract(format!("{}.{}: {}", self.name(), method, e)))?;

        function
            .decode_output(data)
            .map_err(|e| ClientError::Contract(format!("decode {}.{}: {}", self.name(), method, e)))
    }
}

/// Addresses of the deployed contracts
#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub data_registry: Address,
    pub token: Address,
}

impl ContractAddresses {
    pub fn parse(data_registry: &str, token: &str) -> ClientResult<Self> {
        Ok(Self {
            data_registry: parse_address(data_registry)?,
            token: parse_address(token)?,
        })
    }
}

/// Parse a hex account address, rejecting anything malformed
pub fn parse_address(input: &str) -> ClientResult<Address> {
    let trimmed = input.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ClientError::Validation(format!("Invalid account address: {}", input)));
    }
    trimmed
        .parse::<Address>()
        .map_err(|e| ClientError::Validation(format!("Invalid account address {}: {}", input, e)))
}

/// A data listing as stored by the settlement contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub id: U256,
    pub seller: Address,
    pub name: String,
    pub description: String,
    pub data_cid: String,
    pub metadata_cid: String,
    pub price: U256,
    pub active: bool,
}

impl Listing {
    /// Decode a listing tuple
    pub fn from_token(token: Token) -> ClientResult<Self> {
        let fields = match token {
            Token::Tuple(fields) => fields,
            other => {
                return Err(ClientError::Contract(format!(
                    "Expected listing tuple, got {:?}",
                    other
                )))
            }
        };

        if fields.len() != LISTING_FIELDS {
            return Err(ClientError::Contract(format!(
                "Listing tuple has {} fields, expected {}",
                fields.len(),
                LISTING_FIELDS
            )));
        }

        let mut fields = fields.into_iter();
        let mut next = |what: &str| {
            fields
                .next()
                .ok_or_else(|| ClientError::Contract(format!("Listing missing {}", what)))
        };

        let id = next("id")?.into_uint();
        let seller = next("seller")?.into_address();
        let name = next("name")?.into_string();
        let description = next("description")?.into_string();
        let data_cid = next("dataCID")?.into_string();
        let metadata_cid = next("metadataCID")?.into_string();
        let price = next("price")?.into_uint();
        let active = next("active")?.into_bool();

        match (id, seller, name, description, data_cid, metadata_cid, price, active) {
            (
                Some(id),
                Some(seller),
                Some(name),
                Some(description),
                Some(data_cid),
                Some(metadata_cid),
                Some(price),
                Some(active),
            ) => Ok(Self {
                id,
                seller,
                name,
                description,
                data_cid,
                metadata_cid,
                price,
                active,
            }),
            _ => Err(ClientError::Contract("Listing tuple has mistyped fields".to_string())),
        }
    }

    /// Encode back to the on-chain tuple shape
    pub fn into_token(self) -> Token {
        Token::Tuple(vec![
            Token::Uint(self.id),
            Token::Address(self.seller),
            Token::String(self.name),
            Token::String(self.description),
            Token::String(self.data_cid),
            Token::String(self.metadata_cid),
            Token::Uint(self.price),
            Token::Bool(self.active),
        ])
    }
}

/// Convert whole token units (e.g. "0.25") to base units
pub fn to_base_units(units: &str, decimals: u32) -> ClientResult<U256> {
    parse_units(units.trim(), decimals)
        .map(U256::from)
        .map_err(|e| ClientError::Validation(format!("Invalid token amount {}: {}", units, e)))
}

/// Render base units as whole token units without trailing zeros
pub fn format_base_units(amount: U256, decimals: u32) -> String {
    let formatted = match format_units(amount, decimals) {
        Ok(formatted) => formatted,
        Err(_) => return amount.to_string(),
    };
    if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        formatted
    }
}

/// Run a read-only call against `target` and decode the outputs
pub async fn read_contract(
    rpc: &dyn LedgerRpc,
    kind: ContractKind,
    target: Address,
    method: &str,
    args: &[Token],
) -> ClientResult<Vec<Token>> {
    let data = kind.encode_call(method, args)?;
    let output = rpc.call(&TransactionBuilder::view_request(target, data)).await?;
    kind.decode_output(method, &output)
}

/// Pull the single uint out of a view call result
pub fn single_uint(tokens: Vec<Token>, what: &str) -> ClientResult<U256> {
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| ClientError::Contract(format!("{} returned no uint", what)))
}

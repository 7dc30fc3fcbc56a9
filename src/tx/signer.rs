//! Agent signing keys

use crate::error::{ClientError, ClientResult};

use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::keccak256;
use std::fmt;

/// Which agent a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Producer,
    Consumer,
    Faucet,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Producer => "producer",
            AgentRole::Consumer => "consumer",
            AgentRole::Faucet => "faucet",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed, encoded transaction ready for broadcast
pub struct SignedTransaction {
    raw: Bytes,
    hash: H256,
}

impl SignedTransaction {
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Hash derived locally from the signed encoding
    pub fn hash(&self) -> H256 {
        self.hash
    }

    pub fn into_raw(self) -> Bytes {
        self.raw
    }
}

/// A role's signing key. The key material never leaves this type.
#[derive(Clone)]
pub struct AgentSigner {
    role: AgentRole,
    wallet: LocalWallet,
}

impl AgentSigner {
    /// Load from a hex private key, with or without `0x`
    pub fn from_key(role: AgentRole, key: &str) -> ClientResult<Self> {
        let invalid = || ClientError::Signing(format!("Invalid private key for {} agent", role));

        let key = key.trim();
        let bytes = hex::decode(key.strip_prefix("0x").unwrap_or(key)).map_err(|_| invalid())?;
        if bytes.len() != 32 {
            return Err(invalid());
        }
        let wallet = LocalWallet::from_bytes(&bytes).map_err(|_| invalid())?;
        Ok(Self { role, wallet })
    }

    /// Load from the environment variable `var`
    pub fn from_env(role: AgentRole, var: &str) -> ClientResult<Self> {
        let key = std::env::var(var)
            .map_err(|_| ClientError::Config(format!("{} is not set for {} agent", var, role)))?;
        Self::from_key(role, &key)
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Sign a fully populated transaction
    pub async fn sign(&self, tx: &TypedTransaction) -> ClientResult<SignedTransaction> {
        check_complete(tx)?;

        let chain_id = tx
            .chain_id()
            .map(|id| id.as_u64())
            .ok_or_else(|| ClientError::Signing("missing chain id".to_string()))?;

        let wallet = self.wallet.clone().with_chain_id(chain_id);
        let signature = wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| ClientError::Signing(format!("{} agent: {}", self.role, e)))?;

        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        Ok(SignedTransaction { raw, hash })
    }
}

impl fmt::Debug for AgentSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSigner")
            .field("role", &self.role)
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for SignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTransaction")
            .field("hash", &self.hash)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}

/// Reject requests missing any field the signed encoding needs
fn check_complete(tx: &TypedTransaction) -> ClientResult<()> {
    let missing = if tx.to().is_none() {
        Some("recipient")
    } else if tx.nonce().is_none() {
        Some("nonce")
    } else if tx.gas().is_none() {
        Some("gas limit")
    } else if tx.chain_id().is_none() {
        Some("chain id")
    } else {
        match tx {
            TypedTransaction::Legacy(inner) if inner.gas_price.is_none() => Some("gas price"),
            TypedTransaction::Eip2930(inner) if inner.tx.gas_price.is_none() => Some("gas price"),
            TypedTransaction::Eip1559(inner)
                if inner.max_fee_per_gas.is_none() || inner.max_priority_fee_per_gas.is_none() =>
            {
                Some("dynamic fee fields")
            }
            _ => None,
        }
    };

    match missing {
        Some(field) => Err(ClientError::Signing(format!("transaction missing {}", field))),
        None => Ok(()),
    }
}

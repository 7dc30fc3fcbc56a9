//! Nonce sequencing for concurrent submissions from one account
//!
//! Each sender account has a slot holding the next nonce to use. A lease
//! locks the slot from nonce selection until the broadcast outcome is known,
//! so two concurrent submissions never share a nonce:
//! - `commit` after a successful broadcast advances the slot
//! - dropping an uncommitted lease clears the slot, and the next lease
//!   re-reads the pending transaction count from the node

use crate::chain::LedgerRpc;
use crate::error::ClientResult;

use dashmap::DashMap;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type NonceSlot = Arc<Mutex<Option<U256>>>;

/// Serializes nonce use per sender account
#[derive(Default)]
pub struct NonceSequencer {
    accounts: DashMap<Address, NonceSlot>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease the next nonce for `sender`, waiting for any in-flight lease
    pub async fn lease(&self, rpc: &dyn LedgerRpc, sender: Address) -> ClientResult<NonceLease> {
        let slot = self
            .accounts
            .entry(sender)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let guard = slot.lock_owned().await;

        let nonce = match *guard {
            Some(nonce) => nonce,
            None => {
                let nonce = rpc.transaction_count(sender).await?;
                debug!("Fetched nonce {} for {:?}", nonce, sender);
                nonce
            }
        };

        debug!("Leased nonce {} for {:?}", nonce, sender);
        Ok(NonceLease {
            sender,
            nonce,
            guard,
            committed: false,
        })
    }
}

/// Exclusive use of one nonce
pub struct NonceLease {
    sender: Address,
    nonce: U256,
    guard: OwnedMutexGuard<Option<U256>>,
    committed: bool,
}

impl NonceLease {
    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// The transaction was accepted; the next lease gets `nonce + 1`
    pub fn commit(mut self) {
        *self.guard = Some(self.nonce + 1);
        self.committed = true;
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        if !self.committed {
            debug!(
                "Nonce {} for {:?} not committed, resyncing on next use",
                self.nonce, self.sender
            );
            *self.guard = None;
        }
    }
}

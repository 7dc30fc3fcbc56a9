//! Error types for the Auraweave settlement client

use ethers::types::H256;
use thiserror::Error;

/// Pipeline phase in which an operation failed.
///
/// Phases before `Broadcast` mean no value moved. `Broadcast` may or may not
/// have reached the mempool. `Confirmation` means the transaction was accepted
/// by the node and its effect is either known-failed or uncertain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validation,
    Connectivity,
    FeePlanning,
    Signing,
    Broadcast,
    Confirmation,
    Approval,
    Retrieval,
    Discovery,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Validation => "validation",
            Phase::Connectivity => "connectivity",
            Phase::FeePlanning => "fee_planning",
            Phase::Signing => "signing",
            Phase::Broadcast => "broadcast",
            Phase::Confirmation => "confirmation",
            Phase::Approval => "approval",
            Phase::Retrieval => "retrieval",
            Phase::Discovery => "discovery",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the settlement client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fee plan unavailable: {0}")]
    FeePlanUnavailable(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Broadcast rejected ({kind}): {reason}")]
    Broadcast {
        kind: BroadcastRejection,
        reason: String,
    },

    /// The send failed in transit; the node may still have accepted it
    #[error("Broadcast of {tx_hash:?} unconfirmed: {reason}")]
    BroadcastUncertain { tx_hash: H256, reason: String },

    #[error("Transaction {tx_hash:?} reverted in block {block_number}")]
    ReceiptReverted { tx_hash: H256, block_number: u64 },

    #[error("No receipt for transaction {tx_hash:?} after {waited_secs}s")]
    ReceiptTimeout { tx_hash: H256, waited_secs: u64 },

    #[error("Purchase aborted: approval failed: {0}")]
    ApprovalFailed(#[source] Box<ClientError>),

    #[error("Purchase aborted: {0}")]
    PurchaseAborted(String),

    #[error("Invalid content address: {0}")]
    InvalidAddress(String),

    #[error("Content {address} not found: {last_error}")]
    ContentNotFound { address: String, last_error: String },

    #[error("Listing discovery failed: {0}")]
    Discovery(String),

    #[error("Contract error: {0}")]
    Contract(String),
}

/// Node rejection reasons recognised during broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastRejection {
    InsufficientFunds,
    NonceTooLow,
    Underpriced,
    Other,
}

impl BroadcastRejection {
    /// Classify a node rejection message
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("insufficient funds") {
            BroadcastRejection::InsufficientFunds
        } else if message.contains("nonce too low") || message.contains("already known") {
            BroadcastRejection::NonceTooLow
        } else if message.contains("underpriced") {
            BroadcastRejection::Underpriced
        } else {
            BroadcastRejection::Other
        }
    }
}

impl std::fmt::Display for BroadcastRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BroadcastRejection::InsufficientFunds => "insufficient funds",
            BroadcastRejection::NonceTooLow => "nonce too low",
            BroadcastRejection::Underpriced => "underpriced",
            BroadcastRejection::Other => "rejected",
        };
        f.write_str(s)
    }
}

impl ClientError {
    /// Build a broadcast error from a node rejection message
    pub fn broadcast(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        ClientError::Broadcast {
            kind: BroadcastRejection::classify(&reason),
            reason,
        }
    }

    /// Phase of the pipeline this error belongs to
    pub fn phase(&self) -> Phase {
        match self {
            ClientError::Config(_)
            | ClientError::Validation(_)
            | ClientError::PurchaseAborted(_)
            | ClientError::Contract(_) => Phase::Validation,
            ClientError::Connectivity(_) => Phase::Connectivity,
            ClientError::FeePlanUnavailable(_) => Phase::FeePlanning,
            ClientError::Signing(_) => Phase::Signing,
            ClientError::Broadcast { .. } | ClientError::BroadcastUncertain { .. } => {
                Phase::Broadcast
            }
            ClientError::ReceiptReverted { .. } | ClientError::ReceiptTimeout { .. } => {
                Phase::Confirmation
            }
            ClientError::ApprovalFailed(_) => Phase::Approval,
            ClientError::InvalidAddress(_) | ClientError::ContentNotFound { .. } => {
                Phase::Retrieval
            }
            ClientError::Discovery(_) => Phase::Discovery,
        }
    }

    /// True when a transaction reached the node, so fees (and possibly value)
    /// may have been spent.
    pub fn funds_may_have_moved(&self) -> bool {
        match self {
            ClientError::BroadcastUncertain { .. }
            | ClientError::ReceiptReverted { .. }
            | ClientError::ReceiptTimeout { .. } => true,
            ClientError::ApprovalFailed(inner) => inner.funds_may_have_moved(),
            _ => false,
        }
    }

    /// Check if the caller may retry with a fresh nonce and fee plan
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connectivity(_)
                | ClientError::Broadcast {
                    kind: BroadcastRejection::NonceTooLow | BroadcastRejection::Underpriced,
                    ..
                }
        )
    }

    /// The transaction may still be included; re-check before acting again
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            ClientError::BroadcastUncertain { .. } | ClientError::ReceiptTimeout { .. }
        )
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

//! Transaction submission module with nonce sequencing and fee planning

pub mod builder;
pub mod fees;
pub mod gas;
pub mod nonce;
pub mod receipt;
pub mod sender;
pub mod signer;

pub use builder::{OperationKind, TransactionBuilder, TransactionIntent};
pub use fees::{FeePlan, FeeStrategySelector};
pub use gas::{GasEstimator, GasLimit, GasSource};
pub use nonce::{NonceLease, NonceSequencer};
pub use receipt::{ReceiptStatus, ReceiptWaiter, TxReceipt};
pub use sender::{Broadcaster, SubmittedTransaction, TransactionSender};
pub use signer::{AgentRole, AgentSigner, SignedTransaction};

//! Error types for chain operations

use alloy_primitives::B256;

/// Errors that can occur while talking to the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    // Connection errors
    RpcError(String),

    // Round subscription errors
    SubscriptionError(String),
    FeedClosed,

    // Contract call errors
    ContractCallFailed(String),

    // Transaction errors
    SubmissionFailed(String),
    ReplacementRejected { tx_hash: B256, reason: String },
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::RpcError(msg) => write!(f, "RPC error: {}", msg),
            ChainError::SubscriptionError(msg) => write!(f, "Round subscription error: {}", msg),
            ChainError::FeedClosed => write!(f, "Round feed closed"),
            ChainError::ContractCallFailed(msg) => write!(f, "Contract call failed: {}", msg),
            ChainError::SubmissionFailed(msg) => write!(f, "Transaction submission failed: {}", msg),
            ChainError::ReplacementRejected { tx_hash, reason } => {
                write!(f, "Replacement for {} rejected: {}", tx_hash, reason)
            }
        }
    }
}

impl std::error::Error for ChainError {}

/// Outcome of waiting for a transaction to be mined, when it was not mined successfully.
///
/// `DeadlineExceeded` is kept apart from the rest: it is the only kind the
/// claim sequence recovers from (by replacing the transaction once).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmError {
    /// The client's confirmation deadline passed before a receipt showed up
    DeadlineExceeded { tx_hash: B256 },
    /// Mined, but execution reverted
    Reverted { tx_hash: B256, block_number: u64 },
    /// Receipt polling itself failed
    Rpc(String),
}

impl std::fmt::Display for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmError::DeadlineExceeded { tx_hash } => {
                write!(f, "Confirmation deadline exceeded for {}", tx_hash)
            }
            ConfirmError::Reverted { tx_hash, block_number } => {
                write!(f, "Transaction {} reverted in block {}", tx_hash, block_number)
            }
            ConfirmError::Rpc(msg) => write!(f, "Receipt polling failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfirmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_error_display() {
        let timeout = ConfirmError::DeadlineExceeded { tx_hash: B256::ZERO };
        let reverted = ConfirmError::Reverted {
            tx_hash: B256::ZERO,
            block_number: 7,
        };

        assert!(timeout.to_string().starts_with("Confirmation deadline exceeded"));
        assert!(reverted.to_string().ends_with("reverted in block 7"));
        assert_eq!(
            ConfirmError::Rpc("boom".to_string()).to_string(),
            "Receipt polling failed: boom"
        );
    }

    #[test]
    fn test_chain_error_display() {
        let err = ChainError::SubscriptionError("watcher gave up".to_string());
        assert_eq!(err.to_string(), "Round subscription error: watcher gave up");
        assert_eq!(ChainError::FeedClosed.to_string(), "Round feed closed");
    }
}

//! Error types for the transaction lifecycle manager

use thiserror::Error;

/// Failure reported by the node client (RPC session, signer, decoder)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Gas estimation failed: {0}")]
    Estimation(String),

    #[error("Malformed node response: {0}")]
    Decode(String),
}

/// Main error type for transaction operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Bad construction parameters or unresolvable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or account state could not be resolved before signing
    #[error("Failed to resolve {field}: {source}")]
    Resolution {
        field: &'static str,
        #[source]
        source: NodeError,
    },

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    /// Node refused the broadcast
    #[error("Broadcast rejected: {reason}")]
    Rejection { reason: String, permanent: bool },

    /// Transaction or receipt lookup failed
    #[error("Probe of {hash} failed: {source}")]
    Probe {
        hash: String,
        #[source]
        source: NodeError,
    },

    #[error("Invalid state: {0}")]
    State(#[from] StateError),

    #[error("Signing error: {0}")]
    Signing(String),
}

/// Operation called in a state that does not allow it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("no hash yet")]
    NoHash,

    #[error("account nonce {account} is past transaction nonce {record}")]
    NonceAdvanced { account: u64, record: u64 },
}

impl TxError {
    pub(crate) fn resolution(field: &'static str, source: NodeError) -> Self {
        TxError::Resolution { field, source }
    }

    /// Check if the failure is worth another attempt later
    pub fn is_retryable(&self) -> bool {
        match self {
            TxError::Resolution { source, .. } | TxError::Probe { source, .. } => {
                matches!(source, NodeError::Rpc(_))
            }
            TxError::Rejection { permanent, .. } => !permanent,
            TxError::State(StateError::NoHash) => true,
            _ => false,
        }
    }
}

/// Rejection reasons that no amount of resending will cure
const PERMANENT_REJECTIONS: &[&str] = &[
    "already known",
    "known transaction",
    "alreadyknown",
    "nonce too low",
    "replacement transaction underpriced",
    "already imported",
    "transaction already imported",
];

/// Classify a node rejection message as permanent (never retried)
pub fn is_permanent_rejection(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    PERMANENT_REJECTIONS.iter().any(|p| reason.contains(p))
}

/// Result type for transaction operations
pub type TxResult<T> = Result<T, TxError>;

//! Error taxonomy shared by every escrow subsystem.

use thiserror::Error;

/// Errors that can occur while driving or observing escrow operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscrowError {
    /// Transport failure talking to the chain. Safe to retry.
    #[error("Network error: {0}")]
    Network(String),

    /// The chain rejected the call; message passed through verbatim.
    #[error("Contract error: {0}")]
    Contract(String),

    /// Malformed signing key or signing failure.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The transaction was not mined within the wait ceiling.
    #[error("Transaction {tx_hash} not mined after {secs}s")]
    NotMined { tx_hash: String, secs: u64 },

    /// The transaction was mined but the expected creation event is missing.
    #[error("EscrowCreated event not found in transaction {0}")]
    EventNotFound(String),

    /// Persisted operation belongs to another identity.
    #[error("Persisted operation belongs to '{found}', active identity is '{expected}'")]
    StateMismatch { expected: String, found: String },

    /// No escrow record stored under this id.
    #[error("Escrow {0} not found")]
    NotFound(u64),

    /// Seller tried to claim before the buyer approved.
    #[error("Escrow {record_id} cannot be claimed yet (funded: {funded}, approvals: {approvals})")]
    NotClaimable {
        record_id: u64,
        funded: bool,
        approvals: u64,
    },

    /// Caller supplied an unusable argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Local state store failure.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Dispute ledger rejected or failed the request.
    #[error("Dispute ledger error: {0}")]
    Ledger(String),
}

impl EscrowError {
    /// Only transport failures are worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EscrowError::Network(_))
    }
}

/// Result type for escrow operations.
pub type EscrowResult<T> = Result<T, EscrowError>;

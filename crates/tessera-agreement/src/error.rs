use tessera_core::{Hash, NodeId, Position, VoteType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgreementError {
    #[error("Agreement used before restart")]
    NotInitialized,

    #[error("Fork block from {proposer}: {first} and {second}")]
    Fork {
        proposer: NodeId,
        first: Hash,
        second: Hash,
    },

    #[error("Fork vote from {voter} ({vote_type} at period {period}): {first} and {second}")]
    ForkVote {
        voter: NodeId,
        vote_type: VoteType,
        period: u64,
        first: Hash,
        second: Hash,
    },

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Insufficient votes: have {have}, need {need}")]
    InsufficientVotes { have: usize, need: usize },

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Node not in notary set: {0}")]
    NotInNotarySet(NodeId),

    #[error("Position mismatch: expected {expected}, got {got}")]
    PositionMismatch { expected: Position, got: Position },

    #[error("Agreement already confirmed")]
    AlreadyConfirmed,

    #[error("Unknown round {0}")]
    UnknownRound(u64),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] tessera_core::CoreError),
}

impl AgreementError {
    /// Whether this error reports equivocation by a peer
    pub fn is_fork(&self) -> bool {
        matches!(self, AgreementError::Fork { .. } | AgreementError::ForkVote { .. })
    }
}

use serde::{Deserialize, Serialize};

use crate::crypto::Hash;
use crate::types::node::NodeId;
use crate::types::position::Position;

/// What a pull request asks peers for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PullIdentity {
    /// Blocks by hash
    Block(Vec<Hash>),
    /// All votes seen for a position
    Vote(Position),
}

/// A request for blocks or votes missing locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub requester: NodeId,
    pub identity: PullIdentity,
}

impl PullRequest {
    pub fn blocks(requester: NodeId, hashes: Vec<Hash>) -> Self {
        PullRequest {
            requester,
            identity: PullIdentity::Block(hashes),
        }
    }

    pub fn votes(requester: NodeId, position: Position) -> Self {
        PullRequest {
            requester,
            identity: PullIdentity::Vote(position),
        }
    }
}

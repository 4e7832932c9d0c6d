use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Hash, PublicKey, Sig};
use crate::types::node::NodeId;
use crate::types::position::Position;

/// Sentinel block hash meaning "vote to skip this period"
pub const SKIP_BLOCK_HASH: Hash = Hash([0xff; 32]);

/// Sentinel block hash meaning "no value"
pub const NULL_BLOCK_HASH: Hash = Hash::ZERO;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteType {
    Fast,
    FastCom,
    Init,
    PreCommit,
    Commit,
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoteType::Fast => "fast",
            VoteType::FastCom => "fast-com",
            VoteType::Init => "init",
            VoteType::PreCommit => "pre-commit",
            VoteType::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// The signed part of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteHeader {
    pub voter: NodeId,
    pub vote_type: VoteType,
    pub block_hash: Hash,
    pub period: u64,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub header: VoteHeader,
    pub voter_pubkey: PublicKey,
    pub signature: Sig,
}

impl Vote {
    /// Create an unsigned vote; `Signer::sign_vote` fills in the voter
    pub fn new(vote_type: VoteType, block_hash: Hash, period: u64, position: Position) -> Self {
        Vote {
            header: VoteHeader {
                voter: NodeId::default(),
                vote_type,
                block_hash,
                period,
                position,
            },
            voter_pubkey: PublicKey::default(),
            signature: Sig::default(),
        }
    }

    pub fn voter(&self) -> NodeId {
        self.header.voter
    }

    pub fn vote_type(&self) -> VoteType {
        self.header.vote_type
    }

    pub fn block_hash(&self) -> Hash {
        self.header.block_hash
    }

    pub fn period(&self) -> u64 {
        self.header.period
    }

    pub fn position(&self) -> Position {
        self.header.position
    }
}

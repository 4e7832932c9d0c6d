use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{Block, NodeId, Position, Vote};
use tracing::warn;

use crate::error::AgreementError;
use crate::receiver::ForkReporter;

/// Tracks the first block seen from each proposer.
///
/// An agreement instance serves a single position, so one block per
/// `(proposer, position)` also bounds proposers to one block per period.
pub struct ForkDetector {
    reporter: Arc<dyn ForkReporter>,
    first_seen: HashMap<(NodeId, Position), Block>,
}

impl ForkDetector {
    pub fn new(reporter: Arc<dyn ForkReporter>) -> Self {
        ForkDetector {
            reporter,
            first_seen: HashMap::new(),
        }
    }

    /// Record a block.
    ///
    /// Returns `Ok(true)` for a first sighting, `Ok(false)` for a repeat of
    /// the recorded block and `Err(Fork)` for a conflicting one, which is
    /// also reported. The first block stays on record either way.
    pub fn observe(&mut self, block: &Block) -> Result<bool, AgreementError> {
        let key = (block.proposer_id, block.position);
        match self.first_seen.get(&key) {
            None => {
                self.first_seen.insert(key, block.clone());
                Ok(true)
            }
            Some(first) if first.hash == block.hash => Ok(false),
            Some(first) => {
                warn!(
                    "Fork detected from {} at {}: {} vs {}",
                    block.proposer_id, block.position, first.hash, block.hash
                );
                self.reporter.report_fork_block(first, block);
                Err(AgreementError::Fork {
                    proposer: block.proposer_id,
                    first: first.hash,
                    second: block.hash,
                })
            }
        }
    }

    /// Report two conflicting votes from one signer
    pub fn report_vote(&self, first: &Vote, second: &Vote) {
        self.reporter.report_fork_vote(first, second);
    }

    /// Drop the record of a block that was rejected after it was observed
    pub fn forget(&mut self, block: &Block) {
        let key = (block.proposer_id, block.position);
        if self.first_seen.get(&key).map_or(false, |b| b.hash == block.hash) {
            self.first_seen.remove(&key);
        }
    }

    #[cfg(test)]
    pub fn first(&self, proposer: &NodeId, position: &Position) -> Option<&Block> {
        self.first_seen.get(&(*proposer, *position))
    }

    #[cfg(test)]
    pub fn contains_hash(&self, hash: &tessera_core::Hash) -> bool {
        self.first_seen.values().any(|b| b.hash == *hash)
    }

    pub fn clear(&mut self) {
        self.first_seen.clear();
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::signer::verify_crs_signature;
use tessera_core::{hash_blake3, Block, Hash, NodeId, SKIP_BLOCK_HASH};
use tracing::{debug, warn};

use crate::error::AgreementError;
use crate::notary::NotarySet;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application-level check deciding whether a block may lead its period.
///
/// `Ok(false)` means "not yet": the block waits in the pending pool and is
/// re-evaluated later.
pub type ValidLeaderFn = Arc<dyn Fn(&Block) -> Result<bool, BoxError> + Send + Sync>;

/// Box a closure as a [`ValidLeaderFn`]
pub fn valid_leader_fn<F>(f: F) -> ValidLeaderFn
where
    F: Fn(&Block) -> Result<bool, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Picks the leading candidate block of an agreement instance
pub struct LeaderSelector {
    valid_leader: ValidLeaderFn,
    max_pending: usize,
    crs: Hash,
    best: Option<(Hash, Hash)>,
    candidates: HashMap<Hash, Block>,
    pending: HashMap<Hash, Block>,
}

impl LeaderSelector {
    pub fn new(valid_leader: ValidLeaderFn, max_pending: usize) -> Self {
        LeaderSelector {
            valid_leader,
            max_pending,
            crs: Hash::ZERO,
            best: None,
            candidates: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Deterministic leader of `period`: members in ascending order, indexed
    /// by `blake3(crs || period) mod n`
    pub fn leader_for(crs: &Hash, notary_set: &NotarySet, period: u64) -> Option<NodeId> {
        if notary_set.is_empty() {
            return None;
        }
        let mut seed = crs.to_vec();
        seed.extend_from_slice(&period.to_be_bytes());
        let digest = hash_blake3(&seed);

        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        let index = (u64::from_be_bytes(word) % notary_set.len() as u64) as usize;
        notary_set.members().nth(index).copied()
    }

    /// Drop all candidates and pending blocks and adopt a new CRS
    pub fn restart(&mut self, crs: Hash) {
        self.crs = crs;
        self.best = None;
        self.candidates.clear();
        self.pending.clear();
    }

    pub fn valid_leader_fn(&self) -> ValidLeaderFn {
        self.valid_leader.clone()
    }

    /// Lower is better
    pub fn rank(block: &Block) -> Hash {
        hash_blake3(block.crs_signature.as_bytes())
    }

    /// Run the validity predicate, mapping its error to `InvalidBlock`
    pub fn check_valid(&self, block: &Block) -> Result<bool, AgreementError> {
        (self.valid_leader)(block)
            .map_err(|e| AgreementError::InvalidBlock(format!("{}: {}", block.hash, e)))
    }

    /// Offer a block as a candidate.
    ///
    /// Blocks the predicate defers go to the pending pool, which is bounded;
    /// when it is full the block is dropped.
    pub fn process_block(&mut self, block: Block) -> Result<(), AgreementError> {
        verify_crs_signature(&block, &self.crs)
            .map_err(|e| AgreementError::InvalidBlock(format!("CRS signature: {}", e)))?;

        if self.candidates.contains_key(&block.hash) || self.pending.contains_key(&block.hash) {
            return Ok(());
        }

        if self.check_valid(&block)? {
            self.add_candidate(block);
            return Ok(());
        }

        if self.pending.len() >= self.max_pending {
            warn!(
                "Pending pool full ({}), dropping block {}",
                self.max_pending, block.hash
            );
            return Ok(());
        }
        debug!("Block {} pending leader validation", block.hash.short());
        self.pending.insert(block.hash, block);
        Ok(())
    }

    /// Re-evaluate pending blocks. Returns how many became candidates.
    pub fn process_pending_blocks(&mut self) -> usize {
        let hashes: Vec<Hash> = self.pending.keys().copied().collect();
        let mut promoted = 0;
        for hash in hashes {
            let verdict = match self.pending.get(&hash) {
                Some(block) => self.check_valid(block),
                None => continue,
            };
            match verdict {
                Ok(true) => {
                    if let Some(block) = self.pending.remove(&hash) {
                        self.add_candidate(block);
                        promoted += 1;
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Dropping pending block: {}", e);
                    self.pending.remove(&hash);
                }
            }
        }
        promoted
    }

    /// Promote a block already known to be valid, e.g. after deferred
    /// validation succeeded
    pub fn promote(&mut self, hash: &Hash) -> bool {
        match self.pending.remove(hash) {
            Some(block) => {
                self.add_candidate(block);
                true
            }
            None => self.candidates.contains_key(hash),
        }
    }

    fn add_candidate(&mut self, block: Block) {
        let rank = Self::rank(&block);
        let better = match self.best {
            None => true,
            Some((best_rank, best_hash)) => (rank, block.hash) < (best_rank, best_hash),
        };
        if better {
            self.best = Some((rank, block.hash));
        }
        debug!("Candidate block {} from {}", block.hash.short(), block.proposer_id);
        self.candidates.insert(block.hash, block);
    }

    pub fn find_pending_block(&self, hash: &Hash) -> Option<&Block> {
        self.pending.get(hash)
    }

    /// Candidate or pending block by hash
    pub fn find_block(&self, hash: &Hash) -> Option<&Block> {
        self.candidates.get(hash).or_else(|| self.pending.get(hash))
    }

    /// Hash of the best candidate, or the skip sentinel when there is none
    pub fn leader_block_hash(&self) -> Hash {
        self.best.map_or(SKIP_BLOCK_HASH, |(_, hash)| hash)
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

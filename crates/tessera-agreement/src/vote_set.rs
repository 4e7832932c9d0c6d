use std::collections::{BTreeMap, HashMap, HashSet};

use tessera_core::signer::verify_vote_signature;
use tessera_core::{Hash, NodeId, Position, Vote, VoteType, SKIP_BLOCK_HASH};
use tracing::debug;

use crate::error::AgreementError;
use crate::notary::NotarySet;
use crate::signal::{Signal, SignalType};

/// Vote collector that turns quorums into signals.
///
/// Votes are kept per `(period, type)`, one per signer. A quorum on a single
/// hash yields a Lock (Fast, PreCommit) or Decide (FastCom, Commit) signal;
/// Commit votes from a quorum of signers without a usable single-hash quorum
/// yield a Forward signal. Each signal kind is produced once per
/// `(period, type)`.
pub struct VoteSet {
    position: Position,
    notary_set: NotarySet,
    quorum: usize,
    votes: HashMap<(u64, VoteType), BTreeMap<NodeId, Vote>>,
    emitted: HashSet<(u64, VoteType, SignalType)>,
}

impl VoteSet {
    pub fn new(position: Position, notary_set: NotarySet) -> Self {
        let quorum = notary_set.quorum();
        VoteSet {
            position,
            notary_set,
            quorum,
            votes: HashMap::new(),
            emitted: HashSet::new(),
        }
    }

    /// The vote already recorded for this signer, period and type
    pub fn existing(&self, voter: &NodeId, period: u64, vote_type: VoteType) -> Option<&Vote> {
        self.votes
            .get(&(period, vote_type))
            .and_then(|by_voter| by_voter.get(voter))
    }

    /// Number of distinct signers seen for a period and type
    #[cfg(test)]
    pub fn count(&self, period: u64, vote_type: VoteType) -> usize {
        self.votes
            .get(&(period, vote_type))
            .map_or(0, |by_voter| by_voter.len())
    }

    /// Add a vote. Returns a signal when this vote completes a quorum.
    pub fn add_vote(&mut self, vote: Vote) -> Result<Option<Signal>, AgreementError> {
        if vote.position() != self.position {
            return Err(AgreementError::PositionMismatch {
                expected: self.position,
                got: vote.position(),
            });
        }
        if !self.notary_set.contains(&vote.voter()) {
            return Err(AgreementError::NotInNotarySet(vote.voter()));
        }
        verify_vote_signature(&vote)
            .map_err(|e| AgreementError::InvalidVote(format!("{}: {}", vote.voter(), e)))?;

        let key = (vote.period(), vote.vote_type());
        if let Some(existing) = self.existing(&vote.voter(), key.0, key.1) {
            if existing.block_hash() == vote.block_hash() {
                debug!("Duplicate {} vote from {}", vote.vote_type(), vote.voter());
                return Ok(None);
            }
            return Err(AgreementError::ForkVote {
                voter: vote.voter(),
                vote_type: vote.vote_type(),
                period: vote.period(),
                first: existing.block_hash(),
                second: vote.block_hash(),
            });
        }

        let hash = vote.block_hash();
        let by_voter = self.votes.entry(key).or_default();
        by_voter.insert(vote.voter(), vote);

        debug!(
            "Added {} vote for {} at period {}, total: {}/{}",
            key.1,
            hash.short(),
            key.0,
            by_voter.len(),
            self.quorum
        );

        Ok(self.check_quorum(key, hash))
    }

    fn check_quorum(&mut self, key: (u64, VoteType), hash: Hash) -> Option<Signal> {
        let (period, vote_type) = key;
        let by_voter = self.votes.get(&key)?;

        let matching: Vec<Vote> = by_voter
            .values()
            .filter(|v| v.block_hash() == hash)
            .take(self.quorum)
            .cloned()
            .collect();

        if matching.len() >= self.quorum {
            let signal_type = match vote_type {
                VoteType::Fast | VoteType::PreCommit => Some(SignalType::Lock),
                VoteType::FastCom => Some(SignalType::Decide),
                VoteType::Commit if hash != SKIP_BLOCK_HASH => Some(SignalType::Decide),
                VoteType::Commit | VoteType::Init => None,
            };
            if let Some(signal_type) = signal_type {
                if self.emitted.insert((period, vote_type, signal_type)) {
                    return Some(Signal::new(signal_type, matching));
                }
                return None;
            }
        }

        if vote_type == VoteType::Commit
            && by_voter.len() >= self.quorum
            && self.emitted.insert((period, vote_type, SignalType::Forward))
        {
            let votes = by_voter.values().take(self.quorum).cloned().collect();
            return Some(Signal::new(SignalType::Forward, votes));
        }

        None
    }
}

use std::collections::HashSet;

use tessera_core::signer::verify_vote_signature;
use tessera_core::{Hash, Position, Vote, VoteType};

use crate::error::AgreementError;
use crate::notary::NotarySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    /// Quorum of Fast or PreCommit votes for one block
    Lock,
    /// Quorum of FastCom or Commit votes for one block
    Decide,
    /// Quorum of Commit votes for a period, hashes may differ
    Forward,
}

impl SignalType {
    pub fn accepts(&self, vote_type: VoteType) -> bool {
        match self {
            SignalType::Lock => matches!(vote_type, VoteType::Fast | VoteType::PreCommit),
            SignalType::Decide => matches!(vote_type, VoteType::FastCom | VoteType::Commit),
            SignalType::Forward => vote_type == VoteType::Commit,
        }
    }

    fn requires_single_hash(&self) -> bool {
        !matches!(self, SignalType::Forward)
    }
}

/// A quorum-bearing set of votes
#[derive(Debug, Clone)]
pub struct Signal {
    pub signal_type: SignalType,
    pub votes: Vec<Vote>,
}

/// Facts established by `Signal::verify`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedSignal {
    pub signal_type: SignalType,
    pub vote_type: VoteType,
    pub period: u64,
    /// Shared block hash; for Forward signals the hash of the first vote
    pub block_hash: Hash,
}

impl Signal {
    pub fn new(signal_type: SignalType, votes: Vec<Vote>) -> Self {
        Signal { signal_type, votes }
    }

    /// Distinct block hashes referenced by the votes, in vote order
    pub fn block_hashes(&self) -> Vec<Hash> {
        let mut seen = HashSet::new();
        self.votes
            .iter()
            .map(|v| v.block_hash())
            .filter(|h| seen.insert(*h))
            .collect()
    }

    /// Check shape, membership, signatures and quorum.
    pub fn verify(
        &self,
        position: Position,
        notary_set: &NotarySet,
    ) -> Result<VerifiedSignal, AgreementError> {
        let first = self
            .votes
            .first()
            .ok_or_else(|| AgreementError::InvalidSignal("signal carries no votes".into()))?;
        let vote_type = first.vote_type();
        let period = first.period();
        let block_hash = first.block_hash();

        if !self.signal_type.accepts(vote_type) {
            return Err(AgreementError::InvalidSignal(format!(
                "{:?} signal cannot carry {} votes",
                self.signal_type, vote_type
            )));
        }

        let mut voters = HashSet::with_capacity(self.votes.len());
        for vote in &self.votes {
            if vote.position() != position {
                return Err(AgreementError::PositionMismatch {
                    expected: position,
                    got: vote.position(),
                });
            }
            if vote.vote_type() != vote_type || vote.period() != period {
                return Err(AgreementError::InvalidSignal(
                    "votes disagree on type or period".into(),
                ));
            }
            if self.signal_type.requires_single_hash() && vote.block_hash() != block_hash {
                return Err(AgreementError::InvalidSignal(
                    "votes disagree on block hash".into(),
                ));
            }
            if !notary_set.contains(&vote.voter()) {
                return Err(AgreementError::NotInNotarySet(vote.voter()));
            }
            if !voters.insert(vote.voter()) {
                return Err(AgreementError::ProtocolViolation(format!(
                    "voter {} appears twice in signal",
                    vote.voter()
                )));
            }
            verify_vote_signature(vote)
                .map_err(|e| AgreementError::InvalidVote(format!("{}: {}", vote.voter(), e)))?;
        }

        let need = notary_set.quorum();
        if voters.len() < need {
            return Err(AgreementError::InsufficientVotes {
                have: voters.len(),
                need,
            });
        }

        Ok(VerifiedSignal {
            signal_type: self.signal_type,
            vote_type,
            period,
            block_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestCommittee;
    use tessera_core::KeyPair;

    #[test]
    fn test_quorum_signal_verifies() {
        let committee = TestCommittee::new(4);
        let hash = Hash::random();
        let signal = committee.signal(SignalType::Lock, VoteType::PreCommit, hash, 2, 3);

        let verified = signal.verify(committee.position, &committee.notary_set).unwrap();
        assert_eq!(verified.vote_type, VoteType::PreCommit);
        assert_eq!(verified.period, 2);
        assert_eq!(verified.block_hash, hash);
    }

    #[test]
    fn test_below_quorum_rejected() {
        let committee = TestCommittee::new(4);
        let signal = committee.signal(SignalType::Decide, VoteType::Commit, Hash::random(), 2, 2);
        assert!(matches!(
            signal.verify(committee.position, &committee.notary_set),
            Err(AgreementError::InsufficientVotes { have: 2, need: 3 })
        ));
    }

    #[test]
    fn test_wrong_vote_type_rejected() {
        let committee = TestCommittee::new(4);
        let signal = committee.signal(SignalType::Lock, VoteType::Commit, Hash::random(), 2, 3);
        assert!(matches!(
            signal.verify(committee.position, &committee.notary_set),
            Err(AgreementError::InvalidSignal(_))
        ));
    }

    #[test]
    fn test_mixed_hashes_only_for_forward() {
        let committee = TestCommittee::new(4);
        let votes: Vec<_> = (0..3)
            .map(|i| committee.vote(i, VoteType::Commit, Hash::random(), 2))
            .collect();

        let decide = Signal::new(SignalType::Decide, votes.clone());
        assert!(decide.verify(committee.position, &committee.notary_set).is_err());

        let forward = Signal::new(SignalType::Forward, votes);
        forward.verify(committee.position, &committee.notary_set).unwrap();
        assert_eq!(forward.block_hashes().len(), 3);
    }

    #[test]
    fn test_duplicate_voter_rejected() {
        let committee = TestCommittee::new(4);
        let hash = Hash::random();
        let vote = committee.vote(0, VoteType::PreCommit, hash, 2);
        let votes = vec![
            vote.clone(),
            vote,
            committee.vote(1, VoteType::PreCommit, hash, 2),
        ];
        let signal = Signal::new(SignalType::Lock, votes);
        assert!(matches!(
            signal.verify(committee.position, &committee.notary_set),
            Err(AgreementError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_outsider_and_bad_signature_rejected() {
        let committee = TestCommittee::new(4);
        let hash = Hash::random();

        let mut votes: Vec<_> = (0..2)
            .map(|i| committee.vote(i, VoteType::PreCommit, hash, 2))
            .collect();
        let outsider = tessera_core::Signer::new(KeyPair::generate());
        let mut foreign = Vote::new(VoteType::PreCommit, hash, 2, committee.position);
        outsider.sign_vote(&mut foreign);
        votes.push(foreign);
        let signal = Signal::new(SignalType::Lock, votes);
        assert!(matches!(
            signal.verify(committee.position, &committee.notary_set),
            Err(AgreementError::NotInNotarySet(_))
        ));

        let mut votes: Vec<_> = (0..3)
            .map(|i| committee.vote(i, VoteType::PreCommit, hash, 2))
            .collect();
        votes[2].signature = votes[1].signature;
        let signal = Signal::new(SignalType::Lock, votes);
        assert!(matches!(
            signal.verify(committee.position, &committee.notary_set),
            Err(AgreementError::InvalidVote(_))
        ));
    }

    #[test]
    fn test_empty_signal_rejected() {
        let committee = TestCommittee::new(4);
        let signal = Signal::new(SignalType::Forward, Vec::new());
        assert!(matches!(
            signal.verify(committee.position, &committee.notary_set),
            Err(AgreementError::InvalidSignal(_))
        ));
    }
}

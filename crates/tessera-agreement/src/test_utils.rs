//! Committee fixtures shared by the unit tests.

use tessera_core::{Block, Hash, KeyPair, NodeId, Position, Signer, Vote, VoteType};

use crate::notary::NotarySet;
use crate::signal::{Signal, SignalType};

pub(crate) struct TestCommittee {
    pub signers: Vec<Signer>,
    pub keypairs: Vec<KeyPair>,
    pub notary_set: NotarySet,
    pub position: Position,
}

impl TestCommittee {
    pub fn new(n: usize) -> Self {
        let keypairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate()).collect();
        let signers = keypairs.iter().cloned().map(Signer::new).collect();
        let notary_set = NotarySet::new(keypairs.iter().map(|k| k.node_id()));
        TestCommittee {
            signers,
            keypairs,
            notary_set,
            position: Position::new(0, 0, 1),
        }
    }

    pub fn node_id(&self, i: usize) -> NodeId {
        self.signers[i].node_id()
    }

    pub fn vote(&self, i: usize, vote_type: VoteType, hash: Hash, period: u64) -> Vote {
        let mut vote = Vote::new(vote_type, hash, period, self.position);
        self.signers[i].sign_vote(&mut vote);
        vote
    }

    /// Signal built from the first `count` members' votes
    pub fn signal(
        &self,
        signal_type: SignalType,
        vote_type: VoteType,
        hash: Hash,
        period: u64,
        count: usize,
    ) -> Signal {
        let votes = (0..count)
            .map(|i| self.vote(i, vote_type, hash, period))
            .collect();
        Signal::new(signal_type, votes)
    }

    /// A block proposed by member `i`, signed over its hash and `crs`
    pub fn block(&self, i: usize, crs: &Hash) -> Block {
        let mut block = Block::new(
            self.keypairs[i].public,
            self.position,
            Hash::random().to_vec(),
        )
        .expect("block hash");
        self.signers[i].sign_block(&mut block).expect("sign block");
        self.signers[i].sign_crs(&mut block, crs).expect("sign crs");
        block
    }
}

//! Signing and verification of votes, blocks and CRS proofs.
//!
//! Every signed message is prefixed with a domain tag so a signature made
//! for one purpose cannot be replayed as another:
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `agreement_vote:` | votes of every type |
//! | `block:` | proposer signature over a block hash |
//! | `crs:` | proposer signature over the round CRS |

use crate::crypto::{sign, verify, Hash, KeyPair, PublicKey};
use crate::error::CoreError;
use crate::types::{Block, NodeId, Vote, VoteHeader, VoteType};

pub const DOMAIN_VOTE: &[u8] = b"agreement_vote:";
pub const DOMAIN_BLOCK: &[u8] = b"block:";
pub const DOMAIN_CRS: &[u8] = b"crs:";

fn vote_type_tag(vote_type: VoteType) -> u8 {
    match vote_type {
        VoteType::Fast => 0,
        VoteType::FastCom => 1,
        VoteType::Init => 2,
        VoteType::PreCommit => 3,
        VoteType::Commit => 4,
    }
}

/// Build the signing message for a vote.
///
/// Format: `agreement_vote:` || voter || type || block_hash || period ||
/// round || chain_id || height
pub fn vote_message(header: &VoteHeader) -> Vec<u8> {
    let mut message = Vec::with_capacity(128);
    message.extend_from_slice(DOMAIN_VOTE);
    message.extend_from_slice(header.voter.hash().as_bytes());
    message.push(vote_type_tag(header.vote_type));
    message.extend_from_slice(header.block_hash.as_bytes());
    message.extend_from_slice(&header.period.to_le_bytes());
    message.extend_from_slice(&header.position.round.to_le_bytes());
    message.extend_from_slice(&header.position.chain_id.to_le_bytes());
    message.extend_from_slice(&header.position.height.to_le_bytes());
    message
}

pub fn block_message(block_hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_BLOCK.len() + 32);
    message.extend_from_slice(DOMAIN_BLOCK);
    message.extend_from_slice(block_hash.as_bytes());
    message
}

pub fn crs_message(crs: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_CRS.len() + 32);
    message.extend_from_slice(DOMAIN_CRS);
    message.extend_from_slice(crs.as_bytes());
    message
}

fn check_identity(public_key: &PublicKey, claimed: &NodeId) -> Result<(), CoreError> {
    if public_key.node_id() != *claimed {
        return Err(CoreError::NodeIdMismatch(claimed.to_string()));
    }
    Ok(())
}

/// Holds a node's key pair and signs on its behalf
#[derive(Debug, Clone)]
pub struct Signer {
    keypair: KeyPair,
    node_id: NodeId,
}

impl Signer {
    pub fn new(keypair: KeyPair) -> Self {
        let node_id = keypair.node_id();
        Signer { keypair, node_id }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    /// Stamp the vote with this node's identity and sign it
    pub fn sign_vote(&self, vote: &mut Vote) {
        vote.header.voter = self.node_id;
        vote.voter_pubkey = self.keypair.public;
        vote.signature = sign(&self.keypair.secret, &vote_message(&vote.header));
    }

    /// Sign a block this node proposed
    pub fn sign_block(&self, block: &mut Block) -> Result<(), CoreError> {
        check_identity(&self.keypair.public, &block.proposer_id)?;
        block.verify_hash()?;
        block.signature = sign(&self.keypair.secret, &block_message(&block.hash));
        Ok(())
    }

    /// Attach this node's signature over the round CRS to a block
    pub fn sign_crs(&self, block: &mut Block, crs: &Hash) -> Result<(), CoreError> {
        check_identity(&self.keypair.public, &block.proposer_id)?;
        block.crs_signature = sign(&self.keypair.secret, &crs_message(crs));
        Ok(())
    }
}

pub fn verify_vote_signature(vote: &Vote) -> Result<(), CoreError> {
    check_identity(&vote.voter_pubkey, &vote.header.voter)?;
    verify(&vote.voter_pubkey, &vote_message(&vote.header), &vote.signature)
}

pub fn verify_block_signature(block: &Block) -> Result<(), CoreError> {
    check_identity(&block.proposer_pubkey, &block.proposer_id)?;
    block.verify_hash()?;
    verify(&block.proposer_pubkey, &block_message(&block.hash), &block.signature)
}

pub fn verify_crs_signature(block: &Block, crs: &Hash) -> Result<(), CoreError> {
    check_identity(&block.proposer_pubkey, &block.proposer_id)?;
    verify(&block.proposer_pubkey, &crs_message(crs), &block.crs_signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    #[test]
    fn test_vote_sign_and_verify() {
        let signer = Signer::new(KeyPair::generate());
        let mut vote = Vote::new(VoteType::Init, Hash::random(), 2, Position::default());
        signer.sign_vote(&mut vote);

        assert_eq!(vote.voter(), signer.node_id());
        verify_vote_signature(&vote).unwrap();
    }

    #[test]
    fn test_vote_tampering_detected() {
        let signer = Signer::new(KeyPair::generate());
        let mut vote = Vote::new(VoteType::Commit, Hash::random(), 2, Position::default());
        signer.sign_vote(&mut vote);

        let mut other_period = vote.clone();
        other_period.header.period = 3;
        assert!(verify_vote_signature(&other_period).is_err());

        let mut other_type = vote.clone();
        other_type.header.vote_type = VoteType::PreCommit;
        assert!(verify_vote_signature(&other_type).is_err());
    }

    #[test]
    fn test_vote_with_foreign_key_rejected() {
        let signer = Signer::new(KeyPair::generate());
        let mut vote = Vote::new(VoteType::Fast, Hash::random(), 1, Position::default());
        signer.sign_vote(&mut vote);
        vote.voter_pubkey = KeyPair::generate().public;
        assert!(matches!(
            verify_vote_signature(&vote),
            Err(CoreError::NodeIdMismatch(_))
        ));
    }

    #[test]
    fn test_block_and_crs_signatures() {
        let kp = KeyPair::generate();
        let signer = Signer::new(kp.clone());
        let crs = Hash::random();
        let mut block = Block::new(kp.public, Position::default(), vec![1, 2, 3]).unwrap();
        signer.sign_block(&mut block).unwrap();
        signer.sign_crs(&mut block, &crs).unwrap();

        verify_block_signature(&block).unwrap();
        verify_crs_signature(&block, &crs).unwrap();
        assert!(verify_crs_signature(&block, &Hash::random()).is_err());
    }

    #[test]
    fn test_cannot_sign_foreign_block() {
        let signer = Signer::new(KeyPair::generate());
        let other = KeyPair::generate();
        let mut block = Block::new(other.public, Position::default(), vec![]).unwrap();
        assert!(signer.sign_block(&mut block).is_err());
    }
}

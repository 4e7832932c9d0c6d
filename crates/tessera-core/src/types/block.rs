use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, Hash, PublicKey, Sig};
use crate::error::CoreError;
use crate::serialize;
use crate::types::node::NodeId;
use crate::types::position::Position;

/// Fields covered by the block hash
#[derive(Serialize)]
struct BlockContent<'a> {
    proposer_id: &'a NodeId,
    position: &'a Position,
    payload: &'a [u8],
}

/// A block proposed for one position.
///
/// `hash` identifies the block. `signature` is the proposer's signature
/// over the hash and `crs_signature` its signature over the round's CRS,
/// which ranks the block during leader selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub proposer_id: NodeId,
    pub proposer_pubkey: PublicKey,
    pub position: Position,
    pub payload: Vec<u8>,
    pub hash: Hash,
    pub signature: Sig,
    pub crs_signature: Sig,
}

impl Block {
    /// Create an unsigned block and compute its hash
    pub fn new(
        proposer_pubkey: PublicKey,
        position: Position,
        payload: Vec<u8>,
    ) -> Result<Self, CoreError> {
        let mut block = Block {
            proposer_id: proposer_pubkey.node_id(),
            proposer_pubkey,
            position,
            payload,
            hash: Hash::ZERO,
            signature: Sig::default(),
            crs_signature: Sig::default(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// Hash of proposer, position and payload
    pub fn compute_hash(&self) -> Result<Hash, CoreError> {
        let bytes = serialize::to_bytes(&BlockContent {
            proposer_id: &self.proposer_id,
            position: &self.position,
            payload: &self.payload,
        })?;
        Ok(hash_blake3(&bytes))
    }

    /// Check that `hash` matches the block content
    pub fn verify_hash(&self) -> Result<(), CoreError> {
        let computed = self.compute_hash()?;
        if computed != self.hash {
            return Err(CoreError::BlockHashMismatch {
                claimed: self.hash.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_block_hash_deterministic() {
        let kp = KeyPair::generate();
        let block = Block::new(kp.public, Position::new(0, 1, 2), b"payload".to_vec()).unwrap();
        assert_eq!(block.hash, block.compute_hash().unwrap());
        assert_eq!(block.proposer_id, kp.node_id());
        block.verify_hash().unwrap();
    }

    #[test]
    fn test_tampered_payload_fails_hash_check() {
        let kp = KeyPair::generate();
        let mut block = Block::new(kp.public, Position::default(), b"original".to_vec()).unwrap();
        block.payload = b"tampered".to_vec();
        assert!(matches!(
            block.verify_hash(),
            Err(CoreError::BlockHashMismatch { .. })
        ));
    }

    #[test]
    fn test_distinct_payloads_distinct_hashes() {
        let kp = KeyPair::generate();
        let a = Block::new(kp.public, Position::default(), vec![1]).unwrap();
        let b = Block::new(kp.public, Position::default(), vec![2]).unwrap();
        assert_ne!(a.hash, b.hash);
    }
}

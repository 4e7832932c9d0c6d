use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one agreement slot in the multi-chain ledger.
///
/// Ordering is lexicographic over `(round, chain_id, height)`; the derive
/// relies on the field order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Position {
    pub round: u64,
    pub chain_id: u32,
    pub height: u64,
}

impl Position {
    pub fn new(round: u64, chain_id: u32, height: u64) -> Self {
        Position {
            round,
            chain_id,
            height,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.round, self.chain_id, self.height)
    }
}

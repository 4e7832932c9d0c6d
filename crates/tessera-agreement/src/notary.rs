use std::collections::BTreeSet;

use tessera_core::{NodeId, PublicKey};

/// Byzantine quorum for `n` voters: `floor(n/3)*2 + 1`
pub fn quorum_size(n: usize) -> usize {
    n / 3 * 2 + 1
}

/// Voting membership for one position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotarySet {
    members: BTreeSet<NodeId>,
}

impl NotarySet {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        NotarySet {
            members: members.into_iter().collect(),
        }
    }

    pub fn from_public_keys(keys: &[PublicKey]) -> Self {
        Self::new(keys.iter().map(|k| k.node_id()))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in ascending order
    pub fn members(&self) -> impl Iterator<Item = &NodeId> {
        self.members.iter()
    }

    pub fn quorum(&self) -> usize {
        quorum_size(self.members.len())
    }
}

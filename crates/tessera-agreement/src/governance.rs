use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{Hash, NodeId, PublicKey};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AgreementError;
use crate::leader::LeaderSelector;
use crate::notary::NotarySet;

/// Per-round membership and randomness, owned by the outer system
pub trait Governance: Send + Sync {
    fn notary_set(&self, round: u64) -> Option<Vec<PublicKey>>;
    fn dkg_set(&self, round: u64) -> Option<Vec<PublicKey>>;
    fn crs(&self, round: u64) -> Option<Hash>;
}

/// Everything an agreement needs to know about one round
#[derive(Debug, Clone)]
pub struct RoundSets {
    pub round: u64,
    pub notary_set: NotarySet,
    pub dkg_set: NotarySet,
    pub crs: Hash,
}

/// Read-mostly cache of per-round node sets, shared by all instances
pub struct NodeSetCache {
    governance: Arc<dyn Governance>,
    rounds: RwLock<HashMap<u64, Arc<RoundSets>>>,
}

impl NodeSetCache {
    pub fn new(governance: Arc<dyn Governance>) -> Self {
        NodeSetCache {
            governance,
            rounds: RwLock::new(HashMap::new()),
        }
    }

    /// Sets for `round`, fetched from governance on first use
    pub async fn round(&self, round: u64) -> Result<Arc<RoundSets>, AgreementError> {
        if let Some(sets) = self.rounds.read().await.get(&round) {
            return Ok(sets.clone());
        }

        let notary = self
            .governance
            .notary_set(round)
            .ok_or(AgreementError::UnknownRound(round))?;
        let dkg = self
            .governance
            .dkg_set(round)
            .ok_or(AgreementError::UnknownRound(round))?;
        let crs = self
            .governance
            .crs(round)
            .ok_or(AgreementError::UnknownRound(round))?;

        let sets = Arc::new(RoundSets {
            round,
            notary_set: NotarySet::from_public_keys(&notary),
            dkg_set: NotarySet::from_public_keys(&dkg),
            crs,
        });
        debug!(
            "Cached round {}: {} notaries, {} dkg members",
            round,
            sets.notary_set.len(),
            sets.dkg_set.len()
        );

        let mut rounds = self.rounds.write().await;
        Ok(rounds.entry(round).or_insert(sets).clone())
    }

    pub async fn notary_set(&self, round: u64) -> Result<NotarySet, AgreementError> {
        Ok(self.round(round).await?.notary_set.clone())
    }

    pub async fn crs(&self, round: u64) -> Result<Hash, AgreementError> {
        Ok(self.round(round).await?.crs)
    }

    pub async fn is_notary(&self, round: u64, id: &NodeId) -> Result<bool, AgreementError> {
        Ok(self.round(round).await?.notary_set.contains(id))
    }

    /// Leader of `period` in `round`
    pub async fn leader(&self, round: u64, period: u64) -> Result<NodeId, AgreementError> {
        let sets = self.round(round).await?;
        LeaderSelector::leader_for(&sets.crs, &sets.notary_set, period)
            .ok_or_else(|| AgreementError::Config(format!("round {} has no notaries", round)))
    }

    /// Drop every round below `round`
    pub async fn purge(&self, round: u64) {
        let mut rounds = self.rounds.write().await;
        rounds.retain(|r, _| *r >= round);
    }

    pub async fn cached_rounds(&self) -> usize {
        self.rounds.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_core::KeyPair;

    struct StaticGovernance {
        keys: Vec<PublicKey>,
        crs: Hash,
        fetches: AtomicUsize,
    }

    impl Governance for StaticGovernance {
        fn notary_set(&self, round: u64) -> Option<Vec<PublicKey>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            (round < 10).then(|| self.keys.clone())
        }

        fn dkg_set(&self, round: u64) -> Option<Vec<PublicKey>> {
            (round < 10).then(|| self.keys[..2].to_vec())
        }

        fn crs(&self, round: u64) -> Option<Hash> {
            (round < 10).then_some(self.crs)
        }
    }

    fn governance() -> Arc<StaticGovernance> {
        Arc::new(StaticGovernance {
            keys: (0..4).map(|_| KeyPair::generate().public).collect(),
            crs: Hash::random(),
            fetches: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_rounds_are_cached() {
        let gov = governance();
        let cache = NodeSetCache::new(gov.clone());

        let sets = cache.round(1).await.unwrap();
        assert_eq!(sets.notary_set.len(), 4);
        assert_eq!(sets.dkg_set.len(), 2);
        assert_eq!(cache.crs(1).await.unwrap(), gov.crs);
        assert!(cache.is_notary(1, &gov.keys[3].node_id()).await.unwrap());
        assert_eq!(gov.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_round() {
        let cache = NodeSetCache::new(governance());
        assert!(matches!(
            cache.notary_set(42).await,
            Err(AgreementError::UnknownRound(42))
        ));
    }

    #[tokio::test]
    async fn test_leader_matches_selector() {
        let gov = governance();
        let cache = NodeSetCache::new(gov.clone());

        let leader = cache.leader(2, 1).await.unwrap();
        let notary = cache.notary_set(2).await.unwrap();
        assert_eq!(Some(leader), LeaderSelector::leader_for(&gov.crs, &notary, 1));
    }

    #[tokio::test]
    async fn test_purge_drops_old_rounds() {
        let cache = NodeSetCache::new(governance());
        for round in 0..5 {
            cache.round(round).await.unwrap();
        }
        cache.purge(3).await;
        assert_eq!(cache.cached_rounds().await, 2);
    }
}

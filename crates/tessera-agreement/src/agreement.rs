use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tessera_core::signer::verify_block_signature;
use tessera_core::{
    Block, Hash, NodeId, Position, Signer, Vote, VoteType, NULL_BLOCK_HASH, SKIP_BLOCK_HASH,
};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AgreementConfig;
use crate::error::AgreementError;
use crate::fork::ForkDetector;
use crate::leader::{LeaderSelector, ValidLeaderFn};
use crate::notary::NotarySet;
use crate::receiver::{ForkReporter, Receiver};
use crate::signal::{Signal, SignalType};
use crate::state::AgreementState;
use crate::vote_set::VoteSet;

/// Mutable state of one position
struct AgreementData {
    position: Position,
    notary_set: NotarySet,
    /// Fast-path leader
    leader: NodeId,
    period: u64,
    lock_value: Hash,
    lock_iter: u64,
    state: AgreementState,
    votes: VoteSet,
    proposed: bool,
    own_proposal: Option<Hash>,
    fast_voted: bool,
    fast_com_voted: bool,
    last_commit_vote: Option<Vote>,
    known_blocks: HashSet<Hash>,
    done: bool,
    confirmed: Option<Hash>,
}

impl AgreementData {
    fn new(position: Position, notary_set: NotarySet, leader: NodeId) -> Self {
        let votes = VoteSet::new(position, notary_set.clone());
        AgreementData {
            position,
            notary_set,
            leader,
            period: 1,
            lock_value: NULL_BLOCK_HASH,
            lock_iter: 0,
            state: AgreementState::Fast,
            votes,
            proposed: false,
            own_proposal: None,
            fast_voted: false,
            fast_com_voted: false,
            last_commit_vote: None,
            known_blocks: HashSet::new(),
            done: false,
            confirmed: None,
        }
    }

    fn is_locked(&self) -> bool {
        self.lock_iter > 0 && self.lock_value != NULL_BLOCK_HASH
    }
}

struct Inner {
    signer: Signer,
    receiver: Arc<dyn Receiver>,
    leader_selector: LeaderSelector,
    fork_detector: ForkDetector,
    data: Option<AgreementData>,
    /// Bumped on every restart; stale background tasks compare against it
    generation: u64,
    fast_vote_task: Option<JoinHandle<()>>,
    fast_vote_retry: Duration,
    done_tx: watch::Sender<bool>,
}

/// Sign a vote and hand it to the receiver
fn cast_vote(
    signer: &Signer,
    receiver: &dyn Receiver,
    data: &AgreementData,
    vote_type: VoteType,
    block_hash: Hash,
    period: u64,
) -> Vote {
    let mut vote = Vote::new(vote_type, block_hash, period, data.position);
    signer.sign_vote(&mut vote);
    debug!(
        "Voting {} for {} at period {} ({})",
        vote_type,
        block_hash.short(),
        period,
        data.position
    );
    receiver.propose_vote(vote.clone());
    vote
}

fn not_initialized() -> AgreementError {
    error!("Agreement used before restart");
    AgreementError::NotInitialized
}

impl Inner {
    fn fire_done(data: &mut AgreementData, done_tx: &watch::Sender<bool>) {
        if data.done {
            return;
        }
        data.done = true;
        done_tx.send_replace(true);
    }

    fn advance(&mut self) -> Result<(), AgreementError> {
        let Inner {
            signer,
            receiver,
            leader_selector,
            data,
            ..
        } = &mut *self;
        let data = data.as_mut().ok_or_else(not_initialized)?;
        if data.done {
            return Ok(());
        }

        let from = data.state;
        match from {
            AgreementState::Fast => {
                if data.leader == signer.node_id() && !data.proposed {
                    data.proposed = true;
                    data.own_proposal = receiver.propose_block();
                }
            }
            AgreementState::FastVote => {
                data.period = data.period.max(2);
            }
            AgreementState::Initial => {
                leader_selector.process_pending_blocks();
                if !data.proposed {
                    data.proposed = true;
                    data.own_proposal = receiver.propose_block();
                }
                if let Some(hash) = data.own_proposal {
                    cast_vote(signer, &**receiver, data, VoteType::Init, hash, data.period);
                }
            }
            AgreementState::PreCommit => {
                let hash = if data.is_locked() {
                    data.lock_value
                } else {
                    leader_selector.leader_block_hash()
                };
                cast_vote(signer, &**receiver, data, VoteType::PreCommit, hash, data.period);
            }
            AgreementState::Commit => {
                let hash = if data.is_locked() && data.lock_iter == data.period {
                    data.lock_value
                } else {
                    SKIP_BLOCK_HASH
                };
                let vote =
                    cast_vote(signer, &**receiver, data, VoteType::Commit, hash, data.period);
                data.last_commit_vote = Some(vote);
            }
            AgreementState::Forward => {}
            AgreementState::RepeatVote => {
                if let Some(vote) = &data.last_commit_vote {
                    debug!("Repeating commit vote at period {}", vote.period());
                    receiver.propose_vote(vote.clone());
                }
            }
        }

        data.state = from.next();
        debug!(
            "Agreement {} moved {} -> {} at period {}",
            data.position, from, data.state, data.period
        );
        Ok(())
    }

    /// Validate and record a block. Returns whether a fast vote should be
    /// attempted for it.
    fn process_block(&mut self, block: &Block) -> Result<bool, AgreementError> {
        let Inner {
            leader_selector,
            fork_detector,
            data,
            ..
        } = &mut *self;
        let data = data.as_mut().ok_or_else(not_initialized)?;
        if data.done {
            return Ok(false);
        }

        if block.position != data.position {
            return Err(AgreementError::PositionMismatch {
                expected: data.position,
                got: block.position,
            });
        }
        block
            .verify_hash()
            .map_err(|e| AgreementError::InvalidBlock(e.to_string()))?;
        if !data.notary_set.contains(&block.proposer_id) {
            return Err(AgreementError::NotInNotarySet(block.proposer_id));
        }
        verify_block_signature(block)
            .map_err(|e| AgreementError::InvalidBlock(format!("{}: {}", block.hash, e)))?;

        match fork_detector.observe(block) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => {
                // Known, so never pulled, but never a candidate either
                data.known_blocks.insert(block.hash);
                return Err(e);
            }
        }

        if let Err(e) = leader_selector.process_block(block.clone()) {
            fork_detector.forget(block);
            return Err(e);
        }
        data.known_blocks.insert(block.hash);

        Ok(block.proposer_id == data.leader && data.state.is_fast() && !data.fast_voted)
    }

    fn process_vote(&mut self, vote: Vote) -> Result<(), AgreementError> {
        let Inner {
            fork_detector,
            data,
            ..
        } = &mut *self;
        let data = data.as_mut().ok_or_else(not_initialized)?;
        if data.done {
            return Ok(());
        }

        let signal = match data.votes.add_vote(vote.clone()) {
            Ok(Some(signal)) => signal,
            Ok(None) => return Ok(()),
            Err(e @ AgreementError::ForkVote { .. }) => {
                let first = data
                    .votes
                    .existing(&vote.voter(), vote.period(), vote.vote_type());
                if let Some(first) = first {
                    fork_detector.report_vote(first, &vote);
                }
                warn!("{}", e);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        debug!(
            "Quorum of {} votes at period {} produced {:?}",
            vote.vote_type(),
            vote.period(),
            signal.signal_type
        );
        self.process_signal(signal)
    }

    fn process_signal(&mut self, signal: Signal) -> Result<(), AgreementError> {
        let Inner {
            signer,
            receiver,
            leader_selector,
            data,
            done_tx,
            ..
        } = &mut *self;
        let data = data.as_mut().ok_or_else(not_initialized)?;
        if data.done {
            return Ok(());
        }

        let verified = signal.verify(data.position, &data.notary_set)?;
        let (period, hash) = (verified.period, verified.block_hash);

        match (verified.signal_type, verified.vote_type) {
            (SignalType::Lock, VoteType::Fast) => {
                if !data.state.is_fast() || data.fast_com_voted || hash == SKIP_BLOCK_HASH {
                    return Ok(());
                }
                data.fast_com_voted = true;
                cast_vote(signer, &**receiver, data, VoteType::FastCom, hash, period);
                if data.lock_iter == 0 {
                    data.lock_value = hash;
                    data.lock_iter = 1;
                }
            }
            (SignalType::Lock, _) => {
                if period > data.period {
                    info!(
                        "Fast-forwarding {} from period {} to {}",
                        data.position, data.period, period
                    );
                    if hash != SKIP_BLOCK_HASH {
                        data.lock_value = hash;
                        data.lock_iter = period;
                    }
                    data.period = period;
                    Self::fire_done(data, done_tx);
                } else if period == data.period
                    && period > data.lock_iter
                    && hash != data.lock_value
                    && hash != SKIP_BLOCK_HASH
                {
                    debug!("Locking {} at period {}", hash.short(), period);
                    data.lock_value = hash;
                    data.lock_iter = period;
                } else {
                    debug!("Ignoring stale lock for {} at period {}", hash.short(), period);
                }
            }
            (SignalType::Decide, _) => {
                if hash == SKIP_BLOCK_HASH {
                    debug!("Skip decided at period {}", period);
                    return Ok(());
                }
                info!(
                    "Confirmed block {} at {} (period {})",
                    hash, data.position, period
                );
                data.confirmed = Some(hash);
                receiver.confirm_block(hash, signal.votes);
                Self::fire_done(data, done_tx);
            }
            (SignalType::Forward, _) => {
                if period < data.period {
                    debug!("Ignoring stale forward for period {}", period);
                    return Ok(());
                }
                data.period = period + 1;
                let missing: Vec<Hash> = signal
                    .block_hashes()
                    .into_iter()
                    .filter(|h| *h != SKIP_BLOCK_HASH && *h != NULL_BLOCK_HASH)
                    .filter(|h| {
                        !data.known_blocks.contains(h) && leader_selector.find_block(h).is_none()
                    })
                    .collect();
                info!(
                    "Forwarding {} to period {}, {} blocks missing",
                    data.position,
                    data.period,
                    missing.len()
                );
                if !missing.is_empty() {
                    receiver.pull_blocks(missing);
                }
                Self::fire_done(data, done_tx);
            }
        }
        Ok(())
    }

    fn abort_fast_vote(&mut self) {
        if let Some(task) = self.fast_vote_task.take() {
            task.abort();
        }
    }
}

/// BFT agreement for one position at a time.
///
/// An external driver calls [`Agreement::advance`] on a clock while blocks,
/// votes and signals arrive concurrently from the network. All mutation goes
/// through the instance lock.
#[derive(Clone)]
pub struct Agreement {
    inner: Arc<Mutex<Inner>>,
    done_rx: watch::Receiver<bool>,
    node_id: NodeId,
}

impl Agreement {
    pub fn new(
        signer: Signer,
        receiver: Arc<dyn Receiver>,
        fork_reporter: Arc<dyn ForkReporter>,
        valid_leader: ValidLeaderFn,
        config: &AgreementConfig,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        let node_id = signer.node_id();
        let inner = Inner {
            signer,
            receiver,
            leader_selector: LeaderSelector::new(valid_leader, config.max_pending_blocks),
            fork_detector: ForkDetector::new(fork_reporter),
            data: None,
            generation: 0,
            fast_vote_task: None,
            fast_vote_retry: config.fast_vote_retry(),
            done_tx,
        };
        Agreement {
            inner: Arc::new(Mutex::new(inner)),
            done_rx,
            node_id,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Start agreeing on `position` with fresh state
    pub async fn restart(
        &self,
        position: Position,
        notary_set: NotarySet,
        leader: NodeId,
        crs: Hash,
    ) {
        let mut inner = self.inner.lock().await;
        inner.abort_fast_vote();
        inner.generation += 1;
        inner.leader_selector.restart(crs);
        inner.fork_detector.clear();
        inner.data = Some(AgreementData::new(position, notary_set, leader));
        inner.done_tx.send_replace(false);
        info!("Agreement restarted at {} with leader {}", position, leader);
    }

    /// Perform the current state's action and move to the next state
    pub async fn advance(&self) -> Result<(), AgreementError> {
        self.inner.lock().await.advance()
    }

    /// Accept a proposed block.
    ///
    /// A block from the fast leader is validated in the background; its Fast
    /// vote shows up on the receiver some time after this returns.
    pub async fn process_block(&self, block: Block) -> Result<(), AgreementError> {
        let mut inner = self.inner.lock().await;
        if !inner.process_block(&block)? {
            return Ok(());
        }

        inner.abort_fast_vote();
        let task = spawn_fast_vote(
            self.inner.clone(),
            block,
            inner.generation,
            inner.leader_selector.valid_leader_fn(),
            inner.fast_vote_retry,
        );
        inner.fast_vote_task = Some(task);
        Ok(())
    }

    /// Tally a vote; a completed quorum is handled as a signal
    pub async fn process_vote(&self, vote: Vote) -> Result<(), AgreementError> {
        self.inner.lock().await.process_vote(vote)
    }

    /// Apply a quorum-bearing signal
    pub async fn process_signal(&self, signal: Signal) -> Result<(), AgreementError> {
        self.inner.lock().await.process_signal(signal)
    }

    /// Start a new run after a fast-forward ended the previous one.
    ///
    /// The instance continues from state Initial at its current period and
    /// keeps its lock. A no-op while the run is still active.
    pub async fn resume(&self) -> Result<(), AgreementError> {
        let mut inner = self.inner.lock().await;
        let Inner { data, done_tx, .. } = &mut *inner;
        let data = data.as_mut().ok_or_else(not_initialized)?;
        if data.confirmed.is_some() {
            return Err(AgreementError::AlreadyConfirmed);
        }
        if !data.done {
            return Ok(());
        }
        data.done = false;
        data.state = AgreementState::Initial;
        data.last_commit_vote = None;
        done_tx.send_replace(false);
        info!("Agreement {} resumed at period {}", data.position, data.period);
        Ok(())
    }

    /// Whether the instance is waiting on peers' votes
    pub async fn pull_votes(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .data
            .as_ref()
            .map_or(false, |d| !d.done && d.state == AgreementState::RepeatVote)
    }

    /// Ask peers for votes when stalled. Returns whether a request was made.
    pub async fn request_votes(&self) -> Result<bool, AgreementError> {
        let inner = self.inner.lock().await;
        let data = inner.data.as_ref().ok_or_else(not_initialized)?;
        if data.done || data.state != AgreementState::RepeatVote {
            return Ok(false);
        }
        inner.receiver.pull_votes(data.position);
        Ok(true)
    }

    /// Fires `true` when the current run ends
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }

    pub async fn is_done(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.data.as_ref().map_or(false, |d| d.done)
    }

    pub async fn confirmed(&self) -> Option<Hash> {
        let inner = self.inner.lock().await;
        inner.data.as_ref().and_then(|d| d.confirmed)
    }

    pub async fn position(&self) -> Option<Position> {
        let inner = self.inner.lock().await;
        inner.data.as_ref().map(|d| d.position)
    }

    pub async fn period(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.data.as_ref().map_or(0, |d| d.period)
    }

    /// `(lock_value, lock_iter)`
    pub async fn lock(&self) -> (Hash, u64) {
        let inner = self.inner.lock().await;
        inner
            .data
            .as_ref()
            .map_or((NULL_BLOCK_HASH, 0), |d| (d.lock_value, d.lock_iter))
    }

    pub async fn state(&self) -> Option<AgreementState> {
        let inner = self.inner.lock().await;
        inner.data.as_ref().map(|d| d.state)
    }

    pub async fn leader_block_hash(&self) -> Hash {
        self.inner.lock().await.leader_selector.leader_block_hash()
    }

    /// Candidate or pending block by hash
    pub async fn find_block(&self, hash: &Hash) -> Option<Block> {
        let inner = self.inner.lock().await;
        inner.leader_selector.find_block(hash).cloned()
    }
}

/// Validate the fast leader's block off the caller's path, then vote for it.
fn spawn_fast_vote(
    inner: Arc<Mutex<Inner>>,
    block: Block,
    generation: u64,
    valid_leader: ValidLeaderFn,
    retry: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let verdict = valid_leader(&block);

            let mut guard = inner.lock().await;
            if guard.generation != generation {
                return;
            }
            let Inner {
                signer,
                receiver,
                leader_selector,
                data,
                ..
            } = &mut *guard;
            let Some(data) = data.as_mut() else {
                return;
            };
            if data.done || data.fast_voted || !data.state.is_fast() {
                return;
            }

            match verdict {
                Ok(true) => {
                    leader_selector.promote(&block.hash);
                    data.fast_voted = true;
                    cast_vote(signer, &**receiver, data, VoteType::Fast, block.hash, 1);
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Fast leader block {} rejected: {}", block.hash, e);
                    return;
                }
            }
            drop(guard);
            tokio::time::sleep(retry).await;
        }
    })
}

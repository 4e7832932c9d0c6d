//! Outbound interfaces of an agreement instance.
//!
//! `Receiver` carries votes, proposals, decisions and pull requests to the
//! network/application layer; `ForkReporter` is told about equivocation.
//! Both are invoked while the instance lock is held, so calls arrive in the
//! order the state machine emitted them.

use std::sync::Arc;

use tessera_core::{Block, Hash, NodeId, Position, PullRequest, Vote};
use tokio::sync::mpsc;
use tracing::{error, warn};

pub trait Receiver: Send + Sync {
    /// Broadcast a signed vote
    fn propose_vote(&self, vote: Vote);

    /// Build and broadcast this node's block; returns its hash
    fn propose_block(&self) -> Option<Hash>;

    /// Deliver the final decision for the position
    fn confirm_block(&self, block_hash: Hash, votes: Vec<Vote>);

    /// Ask peers for blocks missing locally
    fn pull_blocks(&self, hashes: Vec<Hash>);

    /// Ask peers for the votes they hold for a position
    fn pull_votes(&self, _position: Position) {}
}

pub trait ForkReporter: Send + Sync {
    fn report_fork_vote(&self, first: &Vote, second: &Vote);
    fn report_fork_block(&self, first: &Block, second: &Block);
}

/// Fork reporter that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingForkReporter;

impl ForkReporter for TracingForkReporter {
    fn report_fork_vote(&self, first: &Vote, second: &Vote) {
        warn!(
            "Fork vote from {} ({} at period {}): {} vs {}",
            first.voter(),
            first.vote_type(),
            first.period(),
            first.block_hash(),
            second.block_hash()
        );
    }

    fn report_fork_block(&self, first: &Block, second: &Block) {
        warn!(
            "Fork block from {} at {}: {} vs {}",
            first.proposer_id, first.position, first.hash, second.hash
        );
    }
}

/// Everything an agreement instance emits, as queue items
#[derive(Debug, Clone)]
pub enum AgreementEvent {
    Vote(Vote),
    BlockProposed(Hash),
    Confirmed { block_hash: Hash, votes: Vec<Vote> },
    Pull(PullRequest),
    ForkVote(Box<Vote>, Box<Vote>),
    ForkBlock(Box<Block>, Box<Block>),
}

/// Produces this node's block when the state machine asks for one
pub type BlockProposerFn = Arc<dyn Fn() -> Option<Hash> + Send + Sync>;

/// Receiver backed by a bounded tokio channel.
///
/// Sends never block the state machine: when the queue is full the event is
/// dropped and logged.
pub struct ChannelReceiver {
    node_id: NodeId,
    tx: mpsc::Sender<AgreementEvent>,
    proposer: BlockProposerFn,
}

impl ChannelReceiver {
    /// `node_id` is stamped on outgoing pull requests
    pub fn new(
        node_id: NodeId,
        capacity: usize,
        proposer: BlockProposerFn,
    ) -> (Self, mpsc::Receiver<AgreementEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let receiver = ChannelReceiver {
            node_id,
            tx,
            proposer,
        };
        (receiver, rx)
    }

    fn emit(&self, event: AgreementEvent) {
        if let Err(e) = self.tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    error!("Agreement event queue full, dropping {:?}", event)
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("Agreement event queue closed")
                }
            }
        }
    }
}

impl Receiver for ChannelReceiver {
    fn propose_vote(&self, vote: Vote) {
        self.emit(AgreementEvent::Vote(vote));
    }

    fn propose_block(&self) -> Option<Hash> {
        let hash = (self.proposer)()?;
        self.emit(AgreementEvent::BlockProposed(hash));
        Some(hash)
    }

    fn confirm_block(&self, block_hash: Hash, votes: Vec<Vote>) {
        self.emit(AgreementEvent::Confirmed { block_hash, votes });
    }

    fn pull_blocks(&self, hashes: Vec<Hash>) {
        self.emit(AgreementEvent::Pull(PullRequest::blocks(self.node_id, hashes)));
    }

    fn pull_votes(&self, position: Position) {
        self.emit(AgreementEvent::Pull(PullRequest::votes(self.node_id, position)));
    }
}

impl ForkReporter for ChannelReceiver {
    fn report_fork_vote(&self, first: &Vote, second: &Vote) {
        self.emit(AgreementEvent::ForkVote(
            Box::new(first.clone()),
            Box::new(second.clone()),
        ));
    }

    fn report_fork_block(&self, first: &Block, second: &Block) {
        self.emit(AgreementEvent::ForkBlock(
            Box::new(first.clone()),
            Box::new(second.clone()),
        ));
    }
}

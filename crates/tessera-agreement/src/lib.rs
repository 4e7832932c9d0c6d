//! Tessera Agreement - Byzantine agreement on one block per position
//!
//! This crate provides the per-position agreement state machine together
//! with leader selection, vote aggregation, fork detection and the clock
//! driver that advances it.

pub mod agreement;
pub mod config;
pub mod driver;
pub mod error;
pub mod fork;
pub mod governance;
pub mod leader;
pub mod notary;
pub mod receiver;
pub mod signal;
pub mod state;
pub mod vote_set;

#[cfg(test)]
mod test_utils;

pub use agreement::Agreement;
pub use config::AgreementConfig;
pub use driver::AgreementDriver;
pub use error::AgreementError;
pub use fork::ForkDetector;
pub use governance::{Governance, NodeSetCache, RoundSets};
pub use leader::{valid_leader_fn, BoxError, LeaderSelector, ValidLeaderFn};
pub use notary::{quorum_size, NotarySet};
pub use receiver::{
    AgreementEvent, BlockProposerFn, ChannelReceiver, ForkReporter, Receiver,
    TracingForkReporter,
};
pub use signal::{Signal, SignalType, VerifiedSignal};
pub use state::AgreementState;
pub use vote_set::VoteSet;

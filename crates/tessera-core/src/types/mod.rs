pub mod block;
pub mod node;
pub mod position;
pub mod pull;
pub mod vote;

pub use block::Block;
pub use node::NodeId;
pub use position::Position;
pub use pull::{PullIdentity, PullRequest};
pub use vote::{Vote, VoteHeader, VoteType, NULL_BLOCK_HASH, SKIP_BLOCK_HASH};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Step of one agreement run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementState {
    Fast,
    FastVote,
    Initial,
    PreCommit,
    Commit,
    Forward,
    RepeatVote,
}

impl AgreementState {
    /// How many λ the driver waits in this state before advancing
    pub fn clocks(self) -> u32 {
        match self {
            AgreementState::Fast | AgreementState::Initial => 0,
            AgreementState::FastVote => 3,
            AgreementState::PreCommit | AgreementState::Commit => 2,
            AgreementState::Forward | AgreementState::RepeatVote => 4,
        }
    }

    pub fn next(self) -> AgreementState {
        match self {
            AgreementState::Fast => AgreementState::FastVote,
            AgreementState::FastVote => AgreementState::Initial,
            AgreementState::Initial => AgreementState::PreCommit,
            AgreementState::PreCommit => AgreementState::Commit,
            AgreementState::Commit => AgreementState::Forward,
            AgreementState::Forward => AgreementState::RepeatVote,
            AgreementState::RepeatVote => AgreementState::Forward,
        }
    }

    pub fn is_fast(self) -> bool {
        matches!(self, AgreementState::Fast | AgreementState::FastVote)
    }
}

impl fmt::Display for AgreementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgreementState::Fast => "fast",
            AgreementState::FastVote => "fast_vote",
            AgreementState::Initial => "initial",
            AgreementState::PreCommit => "pre_commit",
            AgreementState::Commit => "commit",
            AgreementState::Forward => "forward",
            AgreementState::RepeatVote => "repeat_vote",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progression_cycles_after_commit() {
        let mut state = AgreementState::Fast;
        let mut seen = vec![state];
        for _ in 0..7 {
            state = state.next();
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                AgreementState::Fast,
                AgreementState::FastVote,
                AgreementState::Initial,
                AgreementState::PreCommit,
                AgreementState::Commit,
                AgreementState::Forward,
                AgreementState::RepeatVote,
                AgreementState::Forward,
            ]
        );
    }

    #[test]
    fn test_clocks() {
        assert_eq!(AgreementState::Fast.clocks(), 0);
        assert_eq!(AgreementState::FastVote.clocks(), 3);
        assert_eq!(AgreementState::Commit.clocks(), 2);
        assert_eq!(AgreementState::RepeatVote.clocks(), 4);
    }
}

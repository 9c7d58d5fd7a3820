use distribute_ledger::{AccountId, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId([u8; 32]);

impl ProjectId {
    pub fn derive(proposer: &AccountId, nonce: u64, content_hash: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(proposer.as_bytes());
        hasher.update(&nonce.to_le_bytes());
        hasher.update(content_hash);
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Lifecycle states with a fixed transition graph.
pub trait LifecycleState: Clone + fmt::Debug {
    fn is_terminal(&self) -> bool;

    fn can_transition_to(&self, next: &Self) -> bool;
}

/// Project lifecycle. Codes match the numbering used by external tooling,
/// which leaves 1 unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectState {
    Proposed,
    Staked,
    Active,
    Validating,
    Voting,
    Complete,
    Failed,
    Expired,
}

impl ProjectState {
    pub fn code(&self) -> u8 {
        match self {
            ProjectState::Proposed => 0,
            ProjectState::Staked => 2,
            ProjectState::Active => 3,
            ProjectState::Validating => 4,
            ProjectState::Voting => 5,
            ProjectState::Complete => 6,
            ProjectState::Failed => 7,
            ProjectState::Expired => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ProjectState::Proposed),
            2 => Some(ProjectState::Staked),
            3 => Some(ProjectState::Active),
            4 => Some(ProjectState::Validating),
            5 => Some(ProjectState::Voting),
            6 => Some(ProjectState::Complete),
            7 => Some(ProjectState::Failed),
            8 => Some(ProjectState::Expired),
            _ => None,
        }
    }

    /// Complete or Failed: the states in which task settlement happens.
    pub fn is_settling(&self) -> bool {
        matches!(self, ProjectState::Complete | ProjectState::Failed)
    }
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl LifecycleState for ProjectState {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProjectState::Complete | ProjectState::Failed | ProjectState::Expired
        )
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use ProjectState::*;
        matches!(
            (self, next),
            (Proposed, Staked)
                | (Proposed, Expired)
                | (Staked, Active)
                | (Active, Validating)
                | (Validating, Voting)
                | (Voting, Complete)
                | (Voting, Failed)
        )
    }
}

/// Final determination for a task, fixed once when the project ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Unresolved,
    AffirmativeWin,
    NegativeWin,
    NoValidation,
}

impl TaskOutcome {
    /// The validation side that won, if any.
    pub fn winning_side(&self) -> Option<bool> {
        match self {
            TaskOutcome::AffirmativeWin => Some(true),
            TaskOutcome::NegativeWin => Some(false),
            TaskOutcome::Unresolved | TaskOutcome::NoValidation => None,
        }
    }
}

/// A validator's entry on a task. Absence from the map means the account
/// never validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorRecord {
    Recorded {
        affirmative: bool,
        /// Arrival position within its side.
        index: usize,
        entry_fee: Amount,
    },
    Claimed,
}

/// What a validator received from `reward_validator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidatorPayout {
    pub tokens_refunded: Amount,
    pub tokens_burned: Amount,
    pub wei_reward: Amount,
}

/// What a worker received from `reward_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerPayout {
    pub wei_reward: Amount,
    pub reputation_reward: Amount,
}

/// Hash identifying one task in a committed task list.
pub fn task_hash(description: &str, weighting: u8) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(description.as_bytes());
    hasher.update(&[weighting]);
    *hasher.finalize().as_bytes()
}

/// Hash stakers commit to when agreeing on a task list.
pub fn task_list_hash(task_hashes: &[[u8; 32]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for hash in task_hashes {
        hasher.update(hash);
    }
    *hasher.finalize().as_bytes()
}

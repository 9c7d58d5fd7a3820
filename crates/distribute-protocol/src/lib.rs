//! Distribute protocol core.
//!
//! Projects are proposed with a cost, funded by token and reputation
//! stakers, broken into weighted tasks, worked on, validated and finally
//! settled. Contested validations go to a commit-reveal poll.
//!
//! # Module Structure
//!
//! - `project`: per-project state machine and money accounting
//! - `stake`: per-project stake ledger and staker weights
//! - `task`: task claims, validation sides and reward shares
//! - `registry`: async entry points that wire projects to the ledgers
//! - `config`: protocol parameters
//!
//! Ledgers live in `distribute-ledger` and are injected as trait objects.

pub mod config;
pub mod error;
pub mod project;
pub mod registry;
pub mod stake;
pub mod task;
pub mod types;

pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};
pub use project::{proposer_stake_wei, reputation_cost, Project, Proposal};
pub use registry::{ProjectLifecycle, ProjectRegistry, ReputationRegistry, TokenRegistry};
pub use stake::{StakeAuthority, StakeLedger, StakeRecord};
pub use task::{reward_share, Task};
pub use types::{
    task_hash, task_list_hash, LifecycleState, ProjectId, ProjectState, TaskOutcome,
    ValidatorPayout, ValidatorRecord, WorkerPayout,
};

//! Ledgers consumed by the Distribute protocol core.
//!
//! The protocol never owns balances itself. It talks to three collaborators
//! through the traits defined here:
//!
//! - [`TokenLedger`]: fungible token with a currency pool behind it
//! - [`ReputationLedger`]: non-transferable reputation
//! - [`VotingLedger`]: commit-reveal polls with per-voter weight accounts
//!
//! In-memory implementations of each are provided for tests and the node's
//! demo mode. Time is injected through [`Clock`].

pub mod clock;
pub mod error;
pub mod reputation;
pub mod token;
pub mod types;
pub mod voting;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LedgerError, Result};
pub use reputation::{MemoryReputationLedger, ReputationLedger};
pub use token::{MemoryTokenLedger, TokenLedger};
pub use types::{
    vote_commitment, AccountId, Amount, PollId, PollResult, QuorumParams, WeightKind,
};
pub use voting::{MemoryVotingLedger, VotingLedger};

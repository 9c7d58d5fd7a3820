use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account not registered: {0}")]
    AccountNotRegistered(String),

    #[error("Account already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Poll not found: {0}")]
    PollNotFound(u64),

    #[error("Poll {poll} is not in the {expected} phase")]
    InvalidPollPhase { poll: u64, expected: String },

    #[error("Commitment mismatch for poll {0}")]
    CommitmentMismatch(u64),

    #[error("Duplicate commit from {voter} on poll {poll}")]
    DuplicateCommit { voter: String, poll: u64 },

    #[error("No commit from {voter} on poll {poll}")]
    CommitNotFound { voter: String, poll: u64 },

    #[error("Insufficient voting weight: requested {requested}, unlocked {unlocked}")]
    InsufficientVotingWeight { requested: u64, unlocked: u64 },

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

use distribute_ledger::LedgerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("Deadline not reached: deadline {deadline}, now {now}")]
    DeadlineNotReached { deadline: i64, now: i64 },

    #[error("Deadline expired: deadline {deadline}, now {now}")]
    DeadlineExpired { deadline: i64, now: i64 },

    #[error("Already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("Insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Insufficient stake: requested {requested}, staked {staked}")]
    InsufficientStake { requested: u64, staked: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Still pending: {0}")]
    StillPending(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Quorum not met: {0}")]
    QuorumNotMet(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Task not found: project {project}, index {index}")]
    TaskNotFound { project: String, index: usize },

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl ProtocolError {
    pub fn invalid_state(expected: impl Into<String>, actual: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }
}

impl From<LedgerError> for ProtocolError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { needed, available } => {
                ProtocolError::InsufficientBalance { needed, available }
            }
            LedgerError::InvalidAmount(reason) => ProtocolError::InvalidAmount(reason),
            other => ProtocolError::Ledger(other),
        }
    }
}

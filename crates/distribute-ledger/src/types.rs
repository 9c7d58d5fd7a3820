use serde::{Deserialize, Serialize};
use std::fmt;

/// Base-unit amount. Native currency is counted in wei, tokens and
/// reputation in whole units.
pub type Amount = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic account derived from a human-readable label.
    pub fn from_label(label: &str) -> Self {
        Self(*blake3::hash(label.as_bytes()).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 bytes as hex, the form used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Which balance a stake or a vote is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightKind {
    Token,
    Reputation,
}

impl fmt::Display for WeightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightKind::Token => write!(f, "token"),
            WeightKind::Reputation => write!(f, "reputation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollId(pub u64);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poll#{}", self.0)
    }
}

/// Parameters fixed when a poll is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumParams {
    /// Percentage of revealed weight the affirmative side must exceed.
    pub vote_quorum: u8,
    pub commit_duration: i64,
    pub reveal_duration: i64,
}

impl Default for QuorumParams {
    fn default() -> Self {
        Self {
            vote_quorum: 50,
            commit_duration: 3 * 24 * 3600,
            reveal_duration: 3 * 24 * 3600,
        }
    }
}

/// Result of a finished poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResult {
    pub affirmative: Amount,
    pub negative: Amount,
    pub passed: bool,
}

/// Commitment a voter publishes during the commit phase.
pub fn vote_commitment(affirmative: bool, salt: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[affirmative as u8]);
    hasher.update(&salt.to_le_bytes());
    *hasher.finalize().as_bytes()
}

use crate::error::{ProtocolError, Result};
use distribute_ledger::QuorumParams;
use serde::{Deserialize, Serialize};

const DAY: i64 = 24 * 3600;

/// Protocol parameters shared by every project in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Proposer stake is `cost / propose_proportion`.
    pub propose_proportion: u64,
    /// Shortest allowed distance between proposal and staking deadline.
    pub staking_period_min: i64,
    pub active_period: i64,
    pub validate_period: i64,
    pub voting_commit_period: i64,
    pub voting_reveal_period: i64,
    /// Percentage of revealed weight the affirmative side must exceed.
    pub vote_quorum: u8,
    /// A project fails when more than this percentage of its weighting did
    /// not end in an affirmative outcome.
    pub fail_threshold: u8,
    pub max_validators_per_side: usize,
    pub validation_reward_percent: u8,
    pub originator_reward_percent: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            propose_proportion: 20,
            staking_period_min: 0,
            active_period: 7 * DAY,
            validate_period: 7 * DAY,
            voting_commit_period: 3 * DAY,
            voting_reveal_period: 3 * DAY,
            vote_quorum: 50,
            fail_threshold: 50,
            max_validators_per_side: 5,
            validation_reward_percent: 5,
            originator_reward_percent: 1,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.propose_proportion == 0 {
            return Err(ProtocolError::InvalidConfiguration(
                "propose_proportion must be positive".to_string(),
            ));
        }
        if self.vote_quorum > 100 || self.fail_threshold > 100 {
            return Err(ProtocolError::InvalidConfiguration(
                "percentages must not exceed 100".to_string(),
            ));
        }
        if self.validation_reward_percent as u16 + self.originator_reward_percent as u16 > 100 {
            return Err(ProtocolError::InvalidConfiguration(
                "reward percentages exceed project cost".to_string(),
            ));
        }
        if self.max_validators_per_side == 0 || self.max_validators_per_side > 5 {
            return Err(ProtocolError::InvalidConfiguration(
                "max_validators_per_side must be between 1 and 5".to_string(),
            ));
        }
        let periods = [
            self.staking_period_min,
            self.active_period,
            self.validate_period,
            self.voting_commit_period,
            self.voting_reveal_period,
        ];
        if periods.iter().any(|p| *p < 0) {
            return Err(ProtocolError::InvalidConfiguration(
                "periods must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn quorum_params(&self) -> QuorumParams {
        QuorumParams {
            vote_quorum: self.vote_quorum,
            commit_duration: self.voting_commit_period,
            reveal_duration: self.voting_reveal_period,
        }
    }

    pub fn voting_period(&self) -> i64 {
        self.voting_commit_period + self.voting_reveal_period
    }
}

use crate::config::ProtocolConfig;
use crate::error::{ProtocolError, Result};
use crate::stake::{StakeAuthority, StakeLedger};
use crate::task::Task;
use crate::types::{
    task_list_hash, LifecycleState, ProjectId, ProjectState, TaskOutcome, ValidatorPayout,
    WorkerPayout,
};
use distribute_ledger::{AccountId, Amount, PollId, PollResult, WeightKind};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// `floor(a * b / c)` without intermediate overflow.
pub(crate) fn mul_div(a: Amount, b: Amount, c: Amount) -> Result<Amount> {
    if c == 0 {
        return Ok(0);
    }
    Amount::try_from(a as u128 * b as u128 / c as u128)
        .map_err(|_| ProtocolError::Overflow(format!("{} * {} / {}", a, b, c)))
}

/// Wei-valued stake a proposer must put up.
pub fn proposer_stake_wei(cost: Amount, propose_proportion: u64) -> Amount {
    cost / propose_proportion.max(1)
}

/// Reputation a project needs staked, priced against the token pool.
pub fn reputation_cost(cost: Amount, reputation_supply: Amount, pool: Amount) -> Result<Amount> {
    mul_div(cost, reputation_supply, pool)
}

/// Parameters of a new proposal, already priced by the registry.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub proposer: AccountId,
    pub proposer_type: WeightKind,
    pub proposer_stake: Amount,
    pub cost: Amount,
    pub reputation_cost: Amount,
    pub staking_deadline: i64,
    pub content_hash: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct Project {
    pub id: ProjectId,
    pub proposer: AccountId,
    pub proposer_type: WeightKind,
    pub proposer_stake: Amount,
    pub proposer_refunded: bool,
    pub cost: Amount,
    pub reputation_cost: Amount,
    pub content_hash: [u8; 32],
    pub state: ProjectState,
    pub staking_deadline: i64,
    pub next_deadline: i64,
    /// Native currency held for this project.
    pub escrow: Amount,
    pub stakes: StakeLedger,
    pub task_hash_commits: HashMap<AccountId, [u8; 32]>,
    pub task_list_hash: Option<[u8; 32]>,
    pub hash_list_submitted: bool,
    pub tasks: Vec<Task>,
    pub originator: Option<AccountId>,
    pub originator_reward: Amount,
    pub originator_paid: bool,
    pub validation_reward: Amount,
}

impl Project {
    pub fn new(id: ProjectId, proposal: Proposal, config: &ProtocolConfig, now: i64) -> Result<Self> {
        if proposal.cost == 0 {
            return Err(ProtocolError::InvalidAmount("project cost must be positive".to_string()));
        }
        if proposal.staking_deadline <= now + config.staking_period_min {
            return Err(ProtocolError::DeadlineExpired {
                deadline: proposal.staking_deadline,
                now,
            });
        }
        if proposal.proposer_stake == 0 {
            return Err(ProtocolError::InvalidAmount("proposer stake rounds to zero".to_string()));
        }

        Ok(Self {
            id,
            proposer: proposal.proposer,
            proposer_type: proposal.proposer_type,
            proposer_stake: proposal.proposer_stake,
            proposer_refunded: false,
            cost: proposal.cost,
            reputation_cost: proposal.reputation_cost,
            content_hash: proposal.content_hash,
            state: ProjectState::Proposed,
            staking_deadline: proposal.staking_deadline,
            next_deadline: proposal.staking_deadline,
            escrow: 0,
            stakes: StakeLedger::new(),
            task_hash_commits: HashMap::new(),
            task_list_hash: None,
            hash_list_submitted: false,
            tasks: Vec::new(),
            originator: None,
            originator_reward: mul_div(proposal.cost, config.originator_reward_percent as u64, 100)?,
            originator_paid: false,
            validation_reward: mul_div(proposal.cost, config.validation_reward_percent as u64, 100)?,
        })
    }

    fn require_state(&self, expected: ProjectState) -> Result<()> {
        if self.state != expected {
            return Err(ProtocolError::invalid_state(expected.to_string(), self.state));
        }
        Ok(())
    }

    fn require_settling(&self) -> Result<()> {
        if !self.state.is_settling() {
            return Err(ProtocolError::invalid_state("Complete or Failed", self.state));
        }
        Ok(())
    }

    fn require_deadline_passed(&self, now: i64) -> Result<()> {
        if now < self.next_deadline {
            return Err(ProtocolError::DeadlineNotReached {
                deadline: self.next_deadline,
                now,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: ProjectState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(ProtocolError::invalid_state(
                format!("state that can reach {}", next),
                self.state,
            ));
        }
        info!(
            project = %self.id.short(),
            from = %self.state,
            to = %next,
            escrow = self.escrow,
            "🔄 Project state transition"
        );
        self.state = next;
        Ok(())
    }

    fn debit_escrow(&mut self, wei: Amount) -> Result<()> {
        self.escrow = self
            .escrow
            .checked_sub(wei)
            .ok_or(ProtocolError::InsufficientBalance {
                needed: wei,
                available: self.escrow,
            })?;
        Ok(())
    }

    pub fn task(&self, index: usize) -> Result<&Task> {
        self.tasks.get(index).ok_or_else(|| ProtocolError::TaskNotFound {
            project: self.id.short(),
            index,
        })
    }

    fn task_mut(&mut self, index: usize) -> Result<&mut Task> {
        let project = self.id.short();
        self.tasks
            .get_mut(index)
            .ok_or(ProtocolError::TaskNotFound { project, index })
    }

    pub fn remaining_cost(&self) -> Amount {
        self.cost.saturating_sub(self.escrow)
    }

    pub fn remaining_reputation(&self) -> Amount {
        self.reputation_cost
            .saturating_sub(self.stakes.total_reputation())
    }

    pub fn is_funded(&self) -> bool {
        self.remaining_cost() == 0 && self.remaining_reputation() == 0
    }

    fn require_staking_open(&self, now: i64) -> Result<()> {
        self.require_state(ProjectState::Proposed)?;
        if now >= self.staking_deadline {
            return Err(ProtocolError::DeadlineExpired {
                deadline: self.staking_deadline,
                now,
            });
        }
        Ok(())
    }

    /// Stake up to `tokens` at `price` wei each. Only as many tokens as the
    /// remaining cost needs are taken, each credited at its full price, so
    /// the last stake may overshoot the cost by less than one token.
    /// Returns `(tokens_taken, wei)`.
    pub fn stake_tokens(
        &mut self,
        staker: AccountId,
        tokens: Amount,
        price: Amount,
        now: i64,
    ) -> Result<(Amount, Amount)> {
        self.require_staking_open(now)?;
        if tokens == 0 {
            return Err(ProtocolError::InvalidAmount("stake must be positive".to_string()));
        }
        let remaining = self.remaining_cost();
        if remaining == 0 {
            return Err(ProtocolError::InvalidAmount("project currency is fully funded".to_string()));
        }
        let price = price.max(1);
        let value = tokens as u128 * price as u128;
        let taken = if value > remaining as u128 {
            remaining.div_ceil(price)
        } else {
            tokens
        };
        let wei = taken
            .checked_mul(price)
            .ok_or_else(|| ProtocolError::Overflow("stake value".to_string()))?;

        self.stakes
            .stake(StakeAuthority::TokenRegistry, staker, WeightKind::Token, taken, wei)?;
        self.escrow += wei;
        Ok((taken, wei))
    }

    /// Returns the wei released back to the pool.
    pub fn unstake_tokens(&mut self, staker: AccountId, tokens: Amount, now: i64) -> Result<Amount> {
        self.require_staking_open(now)?;
        let wei = self
            .stakes
            .unstake(StakeAuthority::TokenRegistry, staker, WeightKind::Token, tokens)?;
        self.debit_escrow(wei)?;
        Ok(wei)
    }

    /// Returns the reputation actually taken.
    pub fn stake_reputation(&mut self, staker: AccountId, amount: Amount, now: i64) -> Result<Amount> {
        self.require_staking_open(now)?;
        let remaining = self.remaining_reputation();
        if remaining == 0 {
            return Err(ProtocolError::InvalidAmount(
                "project reputation is fully funded".to_string(),
            ));
        }
        let taken = amount.min(remaining);
        self.stakes.stake(
            StakeAuthority::ReputationRegistry,
            staker,
            WeightKind::Reputation,
            taken,
            0,
        )?;
        Ok(taken)
    }

    pub fn unstake_reputation(&mut self, staker: AccountId, amount: Amount, now: i64) -> Result<()> {
        self.require_staking_open(now)?;
        self.stakes.unstake(
            StakeAuthority::ReputationRegistry,
            staker,
            WeightKind::Reputation,
            amount,
        )?;
        Ok(())
    }

    /// Staked once funded, Expired once the staking deadline passes
    /// under-funded. Calling again after either is a no-op.
    pub fn check_staked(&mut self, now: i64) -> Result<ProjectState> {
        match self.state {
            ProjectState::Proposed => {
                if self.is_funded() {
                    self.transition(ProjectState::Staked)?;
                } else if now >= self.staking_deadline {
                    self.transition(ProjectState::Expired)?;
                    self.stakes.clear();
                }
                Ok(self.state)
            }
            ProjectState::Staked | ProjectState::Expired => Ok(self.state),
            other => Err(ProtocolError::invalid_state("Proposed", other)),
        }
    }

    /// Move all escrowed currency out. Used when a project expires.
    pub fn drain_escrow(&mut self) -> Amount {
        std::mem::take(&mut self.escrow)
    }

    pub fn add_task_hash(&mut self, staker: AccountId, hash: [u8; 32]) -> Result<()> {
        self.require_state(ProjectState::Staked)?;
        if !self.stakes.is_staker(&staker) {
            return Err(ProtocolError::Unauthorized("only stakers commit task lists".to_string()));
        }
        self.task_hash_commits.insert(staker, hash);
        debug!(
            project = %self.id.short(),
            staker = %staker.short(),
            hash = hex::encode(&hash[..8]),
            "Task list hash committed"
        );
        Ok(())
    }

    /// The committed task-list hash backed by a strict majority of stake
    /// weight, if any.
    pub fn majority_task_hash(&self) -> Option<[u8; 32]> {
        let total = self.stakes.total_weight();
        let mut backing: HashMap<[u8; 32], u64> = HashMap::new();
        for (staker, hash) in &self.task_hash_commits {
            *backing.entry(*hash).or_insert(0) += self.stakes.weight_of(staker);
        }
        backing
            .into_iter()
            .find(|(_, weight)| total > 0 && 2 * weight > total)
            .map(|(hash, _)| hash)
    }

    /// Requires the validation and originator rewards to have been credited
    /// to escrow by the caller.
    pub fn check_active(&mut self, now: i64, active_period: i64) -> Result<()> {
        self.require_state(ProjectState::Staked)?;
        let hash = self.majority_task_hash().ok_or_else(|| {
            warn!(project = %self.id.short(), "Task list hash lacks majority");
            ProtocolError::QuorumNotMet("no task list hash has majority stake".to_string())
        })?;
        self.task_list_hash = Some(hash);
        self.next_deadline = now + active_period;
        self.transition(ProjectState::Active)
    }

    pub fn credit_escrow(&mut self, wei: Amount) -> Result<()> {
        self.escrow = self
            .escrow
            .checked_add(wei)
            .ok_or_else(|| ProtocolError::InvalidAmount("escrow overflow".to_string()))?;
        Ok(())
    }

    /// Reveal the task list. The submitter becomes the originator.
    pub fn submit_hash_list(&mut self, staker: AccountId, task_hashes: Vec<[u8; 32]>) -> Result<()> {
        self.require_state(ProjectState::Active)?;
        if !self.stakes.is_staker(&staker) {
            return Err(ProtocolError::Unauthorized("only stakers submit task lists".to_string()));
        }
        if self.hash_list_submitted {
            return Err(ProtocolError::AlreadyClaimed("task list already submitted".to_string()));
        }
        if task_hashes.is_empty() {
            return Err(ProtocolError::InvalidAmount("task list is empty".to_string()));
        }
        let committed = self.task_list_hash.unwrap_or([0u8; 32]);
        let actual = task_list_hash(&task_hashes);
        if actual != committed {
            return Err(ProtocolError::HashMismatch {
                expected: hex::encode(&committed[..8]),
                actual: hex::encode(&actual[..8]),
            });
        }

        self.tasks = task_hashes.into_iter().map(Task::new).collect();
        self.hash_list_submitted = true;
        self.originator = Some(staker);
        info!(
            project = %self.id.short(),
            originator = %staker.short(),
            tasks = self.tasks.len(),
            "📋 Task list submitted"
        );
        Ok(())
    }

    pub fn claimed_weighting(&self) -> u8 {
        self.tasks
            .iter()
            .map(|t| t.weighting as u16)
            .sum::<u16>()
            .min(100) as u8
    }

    pub fn claim_task(
        &mut self,
        index: usize,
        worker: AccountId,
        description: &str,
        weighting: u8,
    ) -> Result<()> {
        self.require_state(ProjectState::Active)?;
        let claimed = self.claimed_weighting();
        let (cost, reputation_cost) = (self.cost, self.reputation_cost);
        self.task_mut(index)?
            .claim(worker, description, weighting, claimed, cost, reputation_cost)
    }

    pub fn submit_task_complete(&mut self, index: usize, worker: AccountId, token_price: Amount) -> Result<()> {
        self.require_state(ProjectState::Active)?;
        self.task_mut(index)?.mark_complete(worker, token_price)
    }

    pub fn check_validate(&mut self, now: i64, validate_period: i64) -> Result<()> {
        self.require_state(ProjectState::Active)?;
        self.require_deadline_passed(now)?;
        if !self.hash_list_submitted {
            return Err(ProtocolError::QuorumNotMet(
                "task list was never submitted".to_string(),
            ));
        }
        self.next_deadline = now + validate_period;
        self.transition(ProjectState::Validating)
    }

    /// Returns the entry fee owed by the validator.
    pub fn validate_task(
        &mut self,
        index: usize,
        validator: AccountId,
        affirmative: bool,
        max_per_side: usize,
    ) -> Result<Amount> {
        self.require_state(ProjectState::Validating)?;
        self.task_mut(index)?
            .validate(validator, affirmative, max_per_side)
    }

    /// Move to Voting. Returns the tasks that need a poll.
    pub fn check_voting(&mut self, now: i64, voting_period: i64) -> Result<Vec<usize>> {
        self.require_state(ProjectState::Validating)?;
        self.require_deadline_passed(now)?;
        let contested: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.is_contested())
            .map(|(i, _)| i)
            .collect();
        self.next_deadline = now + voting_period;
        self.transition(ProjectState::Voting)?;
        Ok(contested)
    }

    pub fn set_poll(&mut self, index: usize, poll: PollId) -> Result<()> {
        self.task_mut(index)?.poll = Some(poll);
        Ok(())
    }

    pub fn polls(&self) -> Vec<(usize, PollId)> {
        self.tasks
            .iter()
            .enumerate()
            .filter_map(|(i, task)| task.poll.map(|p| (i, p)))
            .collect()
    }

    /// Percentage of the project that did not end affirmatively.
    pub fn failing_weighting(&self) -> u8 {
        let passed: u16 = self
            .tasks
            .iter()
            .filter(|t| t.outcome == TaskOutcome::AffirmativeWin)
            .map(|t| t.weighting as u16)
            .sum();
        100u16.saturating_sub(passed) as u8
    }

    /// Wei the project still owes to workers, validators and the originator.
    pub fn outstanding_wei(&self) -> Amount {
        let tasks: Amount = self
            .tasks
            .iter()
            .map(|t| t.outstanding_wei(self.validation_reward))
            .sum();
        let originator = if self.state == ProjectState::Complete && !self.originator_paid {
            self.originator_reward
        } else {
            0
        };
        tasks + originator
    }

    /// Resolve every task and decide Complete or Failed. Returns the wei
    /// that is no longer owed to anyone and goes back to the pool.
    pub fn check_end(
        &mut self,
        now: i64,
        poll_results: &HashMap<usize, PollResult>,
        fail_threshold: u8,
    ) -> Result<Amount> {
        self.require_state(ProjectState::Voting)?;
        self.require_deadline_passed(now)?;

        for (index, task) in self.tasks.iter_mut().enumerate() {
            let outcome = task.resolve(poll_results.get(&index).copied());
            debug!(project = %self.id.short(), index, outcome = ?outcome, "Task resolved");
        }

        let failing = self.failing_weighting();
        if failing > fail_threshold {
            self.transition(ProjectState::Failed)?;
            self.originator_reward = 0;
        } else {
            self.transition(ProjectState::Complete)?;
        }
        self.stakes.clear();

        let outstanding = self.outstanding_wei();
        let released = self
            .escrow
            .checked_sub(outstanding)
            .ok_or(ProtocolError::InsufficientBalance {
                needed: outstanding,
                available: self.escrow,
            })?;
        self.escrow = outstanding;

        info!(
            project = %self.id.short(),
            state = %self.state,
            failing_weighting = failing,
            outstanding,
            released,
            "🏁 Project finished"
        );
        Ok(released)
    }

    pub fn refund_proposer(&mut self, caller: AccountId) -> Result<Amount> {
        if caller != self.proposer {
            return Err(ProtocolError::Unauthorized("only the proposer".to_string()));
        }
        self.require_settling()?;
        if self.proposer_refunded {
            return Err(ProtocolError::AlreadyClaimed("proposer refund".to_string()));
        }
        self.proposer_refunded = true;
        Ok(std::mem::take(&mut self.proposer_stake))
    }

    /// Proposer stake lost on expiry.
    pub fn forfeit_proposer_stake(&mut self) -> Result<Amount> {
        self.require_state(ProjectState::Expired)?;
        if self.proposer_refunded {
            return Ok(0);
        }
        self.proposer_refunded = true;
        Ok(std::mem::take(&mut self.proposer_stake))
    }

    pub fn reward_originator(&mut self, caller: AccountId) -> Result<Amount> {
        if self.originator != Some(caller) {
            return Err(ProtocolError::Unauthorized("only the originator".to_string()));
        }
        self.require_state(ProjectState::Complete)?;
        if self.originator_paid {
            return Err(ProtocolError::AlreadyClaimed("originator reward".to_string()));
        }
        let reward = self.originator_reward;
        self.debit_escrow(reward)?;
        self.originator_paid = true;
        Ok(reward)
    }

    pub fn reward_task(&mut self, index: usize, caller: AccountId) -> Result<WorkerPayout> {
        self.require_settling()?;
        let payout = self.task_mut(index)?.claim_worker_reward(caller)?;
        self.debit_escrow(payout.wei_reward)?;
        Ok(payout)
    }

    pub fn reward_validator(&mut self, index: usize, caller: AccountId) -> Result<ValidatorPayout> {
        self.require_settling()?;
        let validation_reward = self.validation_reward;
        let payout = self
            .task_mut(index)?
            .claim_validator_reward(caller, validation_reward)?;
        self.debit_escrow(payout.wei_reward)?;
        Ok(payout)
    }

    pub fn all_tasks_settled(&self) -> bool {
        self.tasks.iter().all(Task::is_settled)
    }

    pub fn refund_staker(&mut self, staker: AccountId, kind: WeightKind) -> Result<Amount> {
        match self.state {
            ProjectState::Expired => {}
            ProjectState::Complete | ProjectState::Failed => {
                if !self.all_tasks_settled() {
                    return Err(ProtocolError::StillPending(
                        "tasks still have unclaimed rewards".to_string(),
                    ));
                }
            }
            other => return Err(ProtocolError::invalid_state("Complete, Failed or Expired", other)),
        }
        self.stakes.take_refund(&staker, kind)
    }
}

use crate::error::{ProtocolError, Result};
use crate::types::{task_hash, TaskOutcome, ValidatorPayout, ValidatorRecord, WorkerPayout};
use distribute_ledger::{AccountId, Amount, PollId, PollResult};
use std::collections::HashMap;
use tracing::debug;

/// Reward split by arrival order for a winning side of `count` validators.
/// Each row is strictly decreasing and sums to 100.
const REWARD_SHARES: [&[u64]; 5] = [
    &[100],
    &[55, 45],
    &[40, 33, 27],
    &[31, 27, 23, 19],
    &[26, 23, 20, 17, 14],
];

/// Percentage of a side's allocation owed to the validator at `position`.
pub fn reward_share(count: usize, position: usize) -> Option<u64> {
    REWARD_SHARES
        .get(count.checked_sub(1)?)
        .and_then(|row| row.get(position))
        .copied()
}

#[derive(Debug, Clone)]
pub struct Task {
    /// Commitment to `(description, weighting)`.
    pub hash: [u8; 32],
    pub description: Option<String>,
    pub weighting: u8,
    pub wei_reward: Amount,
    pub reputation_reward: Amount,
    pub claimer: Option<AccountId>,
    pub complete: bool,
    pub entry_fee: Amount,
    pub validators: HashMap<AccountId, ValidatorRecord>,
    pub affirmative: Vec<AccountId>,
    pub negative: Vec<AccountId>,
    pub poll: Option<PollId>,
    pub outcome: TaskOutcome,
    pub worker_paid: bool,
}

impl Task {
    pub fn new(hash: [u8; 32]) -> Self {
        Self {
            hash,
            description: None,
            weighting: 0,
            wei_reward: 0,
            reputation_reward: 0,
            claimer: None,
            complete: false,
            entry_fee: 0,
            validators: HashMap::new(),
            affirmative: Vec::new(),
            negative: Vec::new(),
            poll: None,
            outcome: TaskOutcome::Unresolved,
            worker_paid: false,
        }
    }

    /// Claim the task for `worker`. `claimed_weighting` is the weighting
    /// already taken by other tasks of the project.
    pub fn claim(
        &mut self,
        worker: AccountId,
        description: &str,
        weighting: u8,
        claimed_weighting: u8,
        cost: Amount,
        reputation_cost: Amount,
    ) -> Result<()> {
        if self.claimer.is_some() {
            return Err(ProtocolError::AlreadyClaimed("task already has a worker".to_string()));
        }
        let expected = task_hash(description, weighting);
        if expected != self.hash {
            return Err(ProtocolError::HashMismatch {
                expected: hex::encode(&self.hash[..8]),
                actual: hex::encode(&expected[..8]),
            });
        }
        if weighting == 0 || claimed_weighting as u16 + weighting as u16 > 100 {
            return Err(ProtocolError::InvalidAmount(format!(
                "weighting {} on top of {} exceeds 100",
                weighting, claimed_weighting
            )));
        }

        self.claimer = Some(worker);
        self.description = Some(description.to_string());
        self.weighting = weighting;
        self.wei_reward = (cost as u128 * weighting as u128 / 100) as Amount;
        self.reputation_reward = (reputation_cost as u128 * weighting as u128 / 100) as Amount;
        debug!(
            worker = %worker.short(),
            weighting,
            wei_reward = self.wei_reward,
            reputation_reward = self.reputation_reward,
            "Task claimed"
        );
        Ok(())
    }

    /// Mark the work done. Fixes the validation entry fee at the token price
    /// current at completion.
    pub fn mark_complete(&mut self, caller: AccountId, token_price: Amount) -> Result<()> {
        if self.claimer != Some(caller) {
            return Err(ProtocolError::Unauthorized("only the claimer can complete a task".to_string()));
        }
        if self.complete {
            return Ok(());
        }
        self.complete = true;
        self.entry_fee = (self.wei_reward / token_price.max(1)).max(1);
        Ok(())
    }

    /// Record a validation. Returns the entry fee the validator must escrow.
    pub fn validate(
        &mut self,
        validator: AccountId,
        affirmative: bool,
        max_per_side: usize,
    ) -> Result<Amount> {
        if self.validators.contains_key(&validator) {
            return Err(ProtocolError::AlreadyClaimed("validator already recorded".to_string()));
        }
        if !self.complete {
            return Err(ProtocolError::invalid_state("task complete", "task incomplete"));
        }
        if self.claimer == Some(validator) {
            return Err(ProtocolError::Unauthorized("worker cannot validate own task".to_string()));
        }
        let side = if affirmative {
            &mut self.affirmative
        } else {
            &mut self.negative
        };
        if side.len() >= max_per_side {
            return Err(ProtocolError::invalid_state(
                format!("fewer than {} validators", max_per_side),
                format!("{} validators", side.len()),
            ));
        }

        let index = side.len();
        side.push(validator);
        self.validators.insert(
            validator,
            ValidatorRecord::Recorded {
                affirmative,
                index,
                entry_fee: self.entry_fee,
            },
        );
        Ok(self.entry_fee)
    }

    /// Both sides have at least one validator.
    pub fn is_contested(&self) -> bool {
        !self.affirmative.is_empty() && !self.negative.is_empty()
    }

    /// Fix the task's outcome. A poll result, when present, overrides the
    /// validator counts.
    pub fn resolve(&mut self, poll: Option<PollResult>) -> TaskOutcome {
        self.outcome = if self.validators.is_empty() {
            TaskOutcome::NoValidation
        } else if let Some(result) = poll {
            if result.passed {
                TaskOutcome::AffirmativeWin
            } else {
                TaskOutcome::NegativeWin
            }
        } else if self.affirmative.len() > self.negative.len() {
            TaskOutcome::AffirmativeWin
        } else {
            TaskOutcome::NegativeWin
        };
        self.outcome
    }

    fn winners(&self) -> &[AccountId] {
        match self.outcome.winning_side() {
            Some(true) => self.affirmative.as_slice(),
            Some(false) => self.negative.as_slice(),
            None => &[],
        }
    }

    /// Share of the project's validation reward owed to this task's winning
    /// validators.
    pub fn validator_allocation(&self, validation_reward: Amount) -> Amount {
        if self.winners().is_empty() {
            return 0;
        }
        (validation_reward as u128 * self.weighting as u128 / 100) as Amount
    }

    /// Wei owed to the winning validator at `position`. The last validator
    /// absorbs the rounding remainder.
    pub fn validator_reward(&self, validation_reward: Amount, position: usize) -> Amount {
        let count = self.winners().len();
        if position >= count {
            return 0;
        }
        let allocation = self.validator_allocation(validation_reward);
        let base = validation_reward as u128 * self.weighting as u128;
        let share_of = |i: usize| -> Amount {
            let share = reward_share(count, i).unwrap_or(0) as u128;
            (base * share / 10_000) as Amount
        };
        if position + 1 == count {
            let paid: Amount = (0..count - 1).map(share_of).sum();
            allocation - paid
        } else {
            share_of(position)
        }
    }

    /// Wei this task still owes from escrow.
    pub fn outstanding_wei(&self, validation_reward: Amount) -> Amount {
        let worker = if self.outcome == TaskOutcome::AffirmativeWin && !self.worker_paid {
            self.wei_reward
        } else {
            0
        };
        let validators: Amount = self
            .winners()
            .iter()
            .enumerate()
            .filter(|(_, v)| !matches!(self.validators.get(*v), Some(ValidatorRecord::Claimed)))
            .map(|(i, _)| self.validator_reward(validation_reward, i))
            .sum();
        worker + validators
    }

    /// Every payout this task can make has been made.
    pub fn is_settled(&self) -> bool {
        let worker_done = self.outcome != TaskOutcome::AffirmativeWin || self.worker_paid;
        let validators_done = self
            .validators
            .values()
            .all(|record| matches!(record, ValidatorRecord::Claimed));
        worker_done && validators_done
    }

    pub fn claim_worker_reward(&mut self, caller: AccountId) -> Result<WorkerPayout> {
        if self.claimer != Some(caller) {
            return Err(ProtocolError::Unauthorized("only the claimer can be rewarded".to_string()));
        }
        if self.worker_paid {
            return Err(ProtocolError::AlreadyClaimed("worker reward".to_string()));
        }
        if self.outcome != TaskOutcome::AffirmativeWin {
            return Err(ProtocolError::invalid_state("AffirmativeWin", format!("{:?}", self.outcome)));
        }

        let payout = WorkerPayout {
            wei_reward: self.wei_reward,
            reputation_reward: self.reputation_reward,
        };
        self.worker_paid = true;
        self.wei_reward = 0;
        self.reputation_reward = 0;
        Ok(payout)
    }

    pub fn claim_validator_reward(
        &mut self,
        caller: AccountId,
        validation_reward: Amount,
    ) -> Result<ValidatorPayout> {
        let (affirmative, index, entry_fee) = match self.validators.get(&caller) {
            None => return Err(ProtocolError::Unauthorized("not a validator of this task".to_string())),
            Some(ValidatorRecord::Claimed) => {
                return Err(ProtocolError::AlreadyClaimed("validator reward".to_string()))
            }
            Some(ValidatorRecord::Recorded {
                affirmative,
                index,
                entry_fee,
            }) => (*affirmative, *index, *entry_fee),
        };
        let winning_side = self
            .outcome
            .winning_side()
            .ok_or_else(|| ProtocolError::invalid_state("resolved task", format!("{:?}", self.outcome)))?;

        let payout = if affirmative == winning_side {
            ValidatorPayout {
                tokens_refunded: entry_fee,
                tokens_burned: 0,
                wei_reward: self.validator_reward(validation_reward, index),
            }
        } else {
            let refund = entry_fee / 2;
            ValidatorPayout {
                tokens_refunded: refund,
                tokens_burned: entry_fee - refund,
                wei_reward: 0,
            }
        };
        self.validators.insert(caller, ValidatorRecord::Claimed);
        Ok(payout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn account(n: u8) -> AccountId {
        AccountId::from_bytes([n; 32])
    }

    fn claimed_task(weighting: u8) -> Task {
        let mut task = Task::new(task_hash("write parser", weighting));
        task.claim(account(1), "write parser", weighting, 0, 100_000, 5_000)
            .unwrap();
        task.mark_complete(account(1), 1).unwrap();
        task
    }

    #[test]
    fn test_claim_derives_rewards() {
        let task = claimed_task(20);
        assert_eq!(task.wei_reward, 20_000);
        assert_eq!(task.reputation_reward, 1_000);
        assert_eq!(task.entry_fee, 20_000);
    }

    #[test]
    fn test_claim_rejections() {
        let mut task = Task::new(task_hash("a", 30));
        assert!(matches!(
            task.claim(account(1), "a", 31, 0, 100, 10),
            Err(ProtocolError::HashMismatch { .. })
        ));
        assert!(matches!(
            task.claim(account(1), "a", 30, 71, 100, 10),
            Err(ProtocolError::InvalidAmount(_))
        ));
        task.claim(account(1), "a", 30, 70, 100, 10).unwrap();
        assert!(matches!(
            task.claim(account(2), "a", 30, 0, 100, 10),
            Err(ProtocolError::AlreadyClaimed(_))
        ));
    }

    #[test]
    fn test_only_claimer_completes() {
        let mut task = Task::new(task_hash("a", 10));
        task.claim(account(1), "a", 10, 0, 1_000, 0).unwrap();
        assert!(matches!(
            task.mark_complete(account(2), 1),
            Err(ProtocolError::Unauthorized(_))
        ));
        task.mark_complete(account(1), 3).unwrap();
        task.mark_complete(account(1), 1).unwrap();
        assert_eq!(task.entry_fee, 33);
    }

    #[test]
    fn test_validate_requires_completion_and_is_single_use() {
        let mut task = Task::new(task_hash("a", 10));
        task.claim(account(1), "a", 10, 0, 1_000, 0).unwrap();
        assert!(matches!(
            task.validate(account(2), true, 5),
            Err(ProtocolError::InvalidState { .. })
        ));
        task.mark_complete(account(1), 1).unwrap();
        assert_eq!(task.validate(account(2), true, 5).unwrap(), 100);
        assert!(matches!(
            task.validate(account(2), false, 5),
            Err(ProtocolError::AlreadyClaimed(_))
        ));
        assert!(matches!(
            task.validate(account(1), true, 5),
            Err(ProtocolError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_validator_slots_bounded() {
        let mut task = claimed_task(10);
        for n in 10..15 {
            task.validate(account(n), true, 5).unwrap();
        }
        assert!(matches!(
            task.validate(account(20), true, 5),
            Err(ProtocolError::InvalidState { .. })
        ));
        task.validate(account(20), false, 5).unwrap();
    }

    #[test]
    fn test_two_affirmative_validators_split_55_45() {
        let mut task = claimed_task(20);
        task.validate(account(2), true, 5).unwrap();
        task.validate(account(3), true, 5).unwrap();
        assert_eq!(task.resolve(None), TaskOutcome::AffirmativeWin);

        let validation_reward = 5_000;
        let first = task.claim_validator_reward(account(2), validation_reward).unwrap();
        let second = task.claim_validator_reward(account(3), validation_reward).unwrap();

        assert_eq!(first.wei_reward, 5_000 * 20 * 55 / 10_000);
        assert_eq!(second.wei_reward, 5_000 * 20 / 100 - first.wei_reward);
        assert_eq!(first.tokens_refunded, task.entry_fee);
        assert_eq!(second.tokens_refunded, task.entry_fee);
        assert!(matches!(
            task.claim_validator_reward(account(2), validation_reward),
            Err(ProtocolError::AlreadyClaimed(_))
        ));
    }

    #[test]
    fn test_minority_validator_half_refund() {
        let mut task = claimed_task(7);
        task.entry_fee = 7_001;
        task.validate(account(2), true, 5).unwrap();
        task.validate(account(3), false, 5).unwrap();
        task.validate(account(4), false, 5).unwrap();
        assert_eq!(task.resolve(None), TaskOutcome::NegativeWin);

        let minority = task.claim_validator_reward(account(2), 1_000).unwrap();
        assert_eq!(minority.tokens_refunded, 3_500);
        assert_eq!(minority.tokens_burned, 3_501);
        assert_eq!(minority.wei_reward, 0);

        let majority = task.claim_validator_reward(account(3), 1_000).unwrap();
        assert_eq!(majority.tokens_refunded, 7_001);
        assert_eq!(majority.tokens_burned, 0);
    }

    #[test]
    fn test_vote_overrides_validation_counts() {
        let mut task = claimed_task(10);
        task.validate(account(2), true, 5).unwrap();
        task.validate(account(3), true, 5).unwrap();
        task.validate(account(4), false, 5).unwrap();
        assert!(task.is_contested());

        let lost_vote = PollResult {
            affirmative: 3,
            negative: 4,
            passed: false,
        };
        assert_eq!(task.resolve(Some(lost_vote)), TaskOutcome::NegativeWin);
        assert!(matches!(
            task.claim_worker_reward(account(1)),
            Err(ProtocolError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_unvalidated_task_pays_nothing() {
        let mut task = claimed_task(30);
        assert_eq!(task.resolve(None), TaskOutcome::NoValidation);
        assert_eq!(task.outstanding_wei(5_000), 0);
        assert!(task.is_settled());
    }

    #[test]
    fn test_worker_reward_single_use() {
        let mut task = claimed_task(30);
        task.validate(account(2), true, 5).unwrap();
        task.resolve(None);
        assert_eq!(task.outstanding_wei(1_000), 30_000 + 300);

        assert!(matches!(
            task.claim_worker_reward(account(9)),
            Err(ProtocolError::Unauthorized(_))
        ));
        let payout = task.claim_worker_reward(account(1)).unwrap();
        assert_eq!(payout.wei_reward, 30_000);
        assert_eq!(payout.reputation_reward, 1_500);
        assert!(matches!(
            task.claim_worker_reward(account(1)),
            Err(ProtocolError::AlreadyClaimed(_))
        ));
        assert!(!task.is_settled());
        task.claim_validator_reward(account(2), 1_000).unwrap();
        assert!(task.is_settled());
        assert_eq!(task.outstanding_wei(1_000), 0);
    }

    #[test]
    fn test_share_table_shape() {
        for count in 1..=5 {
            let row: Vec<u64> = (0..count).map(|i| reward_share(count, i).unwrap()).collect();
            assert_eq!(row.iter().sum::<u64>(), 100);
            assert!(row.windows(2).all(|w| w[0] > w[1]));
        }
        assert_eq!(reward_share(2, 0), Some(55));
        assert_eq!(reward_share(0, 0), None);
        assert_eq!(reward_share(6, 0), None);
    }

    proptest! {
        #[test]
        fn prop_winner_rewards_sum_to_allocation(
            validation_reward in 0u64..10_000_000,
            weighting in 1u8..=100,
            winners in 1usize..=5,
        ) {
            let mut task = Task::new(task_hash("t", weighting));
            task.claim(account(1), "t", weighting, 0, 1_000_000, 0).unwrap();
            task.mark_complete(account(1), 1).unwrap();
            for n in 0..winners {
                task.validate(account(10 + n as u8), true, 5).unwrap();
            }
            task.resolve(None);

            let rewards: Vec<u64> = (0..winners)
                .map(|i| task.validator_reward(validation_reward, i))
                .collect();
            prop_assert_eq!(rewards.iter().sum::<u64>(), task.validator_allocation(validation_reward));
            // earlier arrivals never earn less, except the last who absorbs rounding
            for pair in rewards[..winners - 1].windows(2) {
                prop_assert!(pair[0] >= pair[1]);
            }
        }
    }
}

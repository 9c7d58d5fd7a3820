//! Entry surfaces that create projects and drive them through their
//! lifecycle.
//!
//! [`ProjectRegistry`] owns the project table and the collaborator handles.
//! [`TokenRegistry`] and [`ReputationRegistry`] are thin façades over one
//! shared registry that differ in which balance they broker. Both expose the
//! lifecycle checks through [`ProjectLifecycle`].
//!
//! Every mutating entry point locks the target project for its whole
//! duration, works on a copy of the project and writes the copy back only
//! once every ledger call succeeded.

mod reputation;
mod token;

pub use reputation::ReputationRegistry;
pub use token::TokenRegistry;

use crate::config::ProtocolConfig;
use crate::error::{ProtocolError, Result};
use crate::project::{mul_div, proposer_stake_wei, reputation_cost, Project, Proposal};
use crate::stake::{StakeAuthority, StakeRecord};
use crate::task::Task;
use crate::types::{ProjectId, ProjectState, ValidatorPayout, WorkerPayout};
use async_trait::async_trait;
use distribute_ledger::{
    AccountId, Amount, Clock, PollId, ReputationLedger, TokenLedger, VotingLedger, WeightKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, warn};

/// Lifecycle checks callable by anyone through either façade.
#[async_trait]
pub trait ProjectLifecycle: Send + Sync {
    fn registry(&self) -> &ProjectRegistry;

    async fn check_staked(&self, id: ProjectId) -> Result<ProjectState> {
        self.registry().check_staked(id).await
    }

    async fn check_active(&self, id: ProjectId) -> Result<()> {
        self.registry().check_active(id).await
    }

    async fn check_validate(&self, id: ProjectId) -> Result<()> {
        self.registry().check_validate(id).await
    }

    async fn check_voting(&self, id: ProjectId) -> Result<Vec<usize>> {
        self.registry().check_voting(id).await
    }

    async fn check_end(&self, id: ProjectId) -> Result<ProjectState> {
        self.registry().check_end(id).await
    }
}

pub struct ProjectRegistry {
    config: ProtocolConfig,
    tokens: Arc<dyn TokenLedger>,
    reputation: Arc<dyn ReputationLedger>,
    voting: Arc<dyn VotingLedger>,
    clock: Arc<dyn Clock>,
    /// Account holding staked and escrowed tokens.
    custody: AccountId,
    projects: Arc<RwLock<HashMap<ProjectId, Arc<Mutex<Project>>>>>,
    /// Serializes voting-weight purchases and refunds.
    voting_lock: Mutex<()>,
    nonce: AtomicU64,
}

impl ProjectRegistry {
    pub fn new(
        config: ProtocolConfig,
        tokens: Arc<dyn TokenLedger>,
        reputation: Arc<dyn ReputationLedger>,
        voting: Arc<dyn VotingLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            tokens,
            reputation,
            voting,
            clock,
            custody: AccountId::from_label("distribute/registry-custody"),
            projects: Arc::new(RwLock::new(HashMap::new())),
            voting_lock: Mutex::new(()),
            nonce: AtomicU64::new(0),
        }))
    }

    pub fn token_registry(self: &Arc<Self>) -> TokenRegistry {
        TokenRegistry::new(self.clone())
    }

    pub fn reputation_registry(self: &Arc<Self>) -> ReputationRegistry {
        ReputationRegistry::new(self.clone())
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn custody_account(&self) -> AccountId {
        self.custody
    }

    async fn lock(&self, id: ProjectId) -> Result<OwnedMutexGuard<Project>> {
        let entry = self
            .projects
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ProtocolError::ProjectNotFound(id.short()))?;
        Ok(entry.lock_owned().await)
    }

    /// Snapshot of a project.
    pub async fn project(&self, id: ProjectId) -> Result<Project> {
        Ok(self.lock(id).await?.clone())
    }

    pub async fn task(&self, id: ProjectId, index: usize) -> Result<Task> {
        Ok(self.lock(id).await?.task(index)?.clone())
    }

    pub async fn project_ids(&self) -> Vec<ProjectId> {
        self.projects.read().await.keys().copied().collect()
    }

    pub async fn stakes_of(&self, id: ProjectId, staker: AccountId) -> Result<StakeRecord> {
        Ok(self
            .lock(id)
            .await?
            .stakes
            .record(&staker)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn weight_of(&self, id: ProjectId, staker: AccountId) -> Result<u64> {
        Ok(self.lock(id).await?.stakes.weight_of(&staker))
    }

    pub(crate) async fn propose(
        &self,
        proposer: AccountId,
        proposer_type: WeightKind,
        cost: Amount,
        staking_deadline: i64,
        content_hash: [u8; 32],
    ) -> Result<ProjectId> {
        let now = self.clock.now();
        if cost == 0 {
            return Err(ProtocolError::InvalidAmount("project cost must be positive".to_string()));
        }
        let pool = self.tokens.pool_balance().await;
        if pool == 0 {
            return Err(ProtocolError::InsufficientBalance {
                needed: cost,
                available: 0,
            });
        }

        let reputation_cost = reputation_cost(cost, self.reputation.total_supply().await, pool)?;
        let stake_wei = proposer_stake_wei(cost, self.config.propose_proportion);
        let proposer_stake = match proposer_type {
            WeightKind::Token => mul_div(stake_wei, self.tokens.total_supply().await, pool)?,
            WeightKind::Reputation => reputation_cost / self.config.propose_proportion,
        };

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let id = ProjectId::derive(&proposer, nonce, &content_hash);
        let proposal = Proposal {
            proposer,
            proposer_type,
            proposer_stake,
            cost,
            reputation_cost,
            staking_deadline,
            content_hash,
        };
        let project = Project::new(id, proposal, &self.config, now)?;

        match proposer_type {
            WeightKind::Token => {
                self.tokens
                    .transfer(proposer, self.custody, proposer_stake)
                    .await?
            }
            WeightKind::Reputation => self.reputation.burn(proposer, proposer_stake).await?,
        }
        self.projects
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(project)));

        info!(
            project = %id.short(),
            proposer = %proposer.short(),
            proposer_type = %proposer_type,
            cost,
            reputation_cost,
            proposer_stake,
            staking_deadline,
            "📝 Project proposed"
        );
        Ok(id)
    }

    pub(crate) async fn stake_tokens(
        &self,
        id: ProjectId,
        staker: AccountId,
        tokens: Amount,
    ) -> Result<Amount> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let price = self.tokens.current_price().await;
        let mut draft = guard.clone();
        let (taken, wei) = draft.stake_tokens(staker, tokens, price, now)?;

        self.tokens.transfer(staker, self.custody, taken).await?;
        if let Err(err) = self.tokens.withdraw_pool(wei).await {
            self.tokens.transfer(self.custody, staker, taken).await?;
            return Err(err.into());
        }
        draft.check_staked(now)?;
        *guard = draft;

        info!(
            project = %id.short(),
            staker = %staker.short(),
            tokens = taken,
            wei,
            escrow = guard.escrow,
            state = %guard.state,
            "💰 Tokens staked"
        );
        Ok(taken)
    }

    pub(crate) async fn unstake_tokens(
        &self,
        id: ProjectId,
        staker: AccountId,
        tokens: Amount,
    ) -> Result<Amount> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let wei = draft.unstake_tokens(staker, tokens, now)?;

        self.tokens.deposit_pool(wei).await?;
        if let Err(err) = self.tokens.transfer(self.custody, staker, tokens).await {
            self.tokens.withdraw_pool(wei).await?;
            return Err(err.into());
        }
        *guard = draft;

        info!(
            project = %id.short(),
            staker = %staker.short(),
            tokens,
            wei,
            "💸 Tokens unstaked"
        );
        Ok(wei)
    }

    pub(crate) async fn stake_reputation(
        &self,
        id: ProjectId,
        staker: AccountId,
        amount: Amount,
    ) -> Result<Amount> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let taken = draft.stake_reputation(staker, amount, now)?;

        self.reputation.burn(staker, taken).await?;
        draft.check_staked(now)?;
        *guard = draft;

        info!(
            project = %id.short(),
            staker = %staker.short(),
            reputation = taken,
            state = %guard.state,
            "⭐ Reputation staked"
        );
        Ok(taken)
    }

    pub(crate) async fn unstake_reputation(
        &self,
        id: ProjectId,
        staker: AccountId,
        amount: Amount,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        draft.unstake_reputation(staker, amount, now)?;

        self.reputation.mint(staker, amount).await?;
        *guard = draft;

        info!(
            project = %id.short(),
            staker = %staker.short(),
            reputation = amount,
            "Reputation unstaked"
        );
        Ok(())
    }

    pub(crate) async fn check_staked(&self, id: ProjectId) -> Result<ProjectState> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let before = draft.state;
        let after = draft.check_staked(now)?;

        if before == ProjectState::Proposed && after == ProjectState::Expired {
            let wei = draft.drain_escrow();
            let forfeited = draft.forfeit_proposer_stake()?;
            self.tokens.deposit_pool(wei).await?;
            if draft.proposer_type == WeightKind::Token && forfeited > 0 {
                if let Err(err) = self.tokens.destroy(self.custody, forfeited).await {
                    self.tokens.withdraw_pool(wei).await?;
                    return Err(err.into());
                }
            }
            warn!(
                project = %id.short(),
                returned_to_pool = wei,
                forfeited,
                "⌛ Project expired under-funded"
            );
        }
        *guard = draft;
        Ok(after)
    }

    pub(crate) async fn add_task_hash(
        &self,
        id: ProjectId,
        staker: AccountId,
        hash: [u8; 32],
    ) -> Result<()> {
        let mut guard = self.lock(id).await?;
        guard.add_task_hash(staker, hash)
    }

    pub(crate) async fn check_active(&self, id: ProjectId) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        draft.check_active(now, self.config.active_period)?;

        let rewards = draft.validation_reward + draft.originator_reward;
        self.tokens.withdraw_pool(rewards).await?;
        draft.credit_escrow(rewards)?;
        *guard = draft;

        info!(
            project = %id.short(),
            escrow = guard.escrow,
            deadline = guard.next_deadline,
            "🚀 Project active"
        );
        Ok(())
    }

    pub(crate) async fn submit_hash_list(
        &self,
        id: ProjectId,
        staker: AccountId,
        task_hashes: Vec<[u8; 32]>,
    ) -> Result<()> {
        let mut guard = self.lock(id).await?;
        guard.submit_hash_list(staker, task_hashes)
    }

    /// Workers must be registered to receive a reputation reward. Claims
    /// through the reputation registry also require the worker to already
    /// hold the task's reputation reward.
    pub(crate) async fn claim_task(
        &self,
        id: ProjectId,
        authority: StakeAuthority,
        index: usize,
        worker: AccountId,
        description: &str,
        weighting: u8,
    ) -> Result<()> {
        let mut guard = self.lock(id).await?;
        let required = mul_div(guard.reputation_cost, weighting as u64, 100)?;
        if required > 0 && !self.reputation.is_registered(worker).await {
            return Err(ProtocolError::Unauthorized("worker is not registered".to_string()));
        }
        if authority == StakeAuthority::ReputationRegistry {
            let balance = self.reputation.balance_of(worker).await;
            if balance < required {
                return Err(ProtocolError::InsufficientBalance {
                    needed: required,
                    available: balance,
                });
            }
        }
        guard.claim_task(index, worker, description, weighting)?;

        info!(
            project = %id.short(),
            index,
            worker = %worker.short(),
            weighting,
            "🔨 Task claimed"
        );
        Ok(())
    }

    pub(crate) async fn submit_task_complete(
        &self,
        id: ProjectId,
        index: usize,
        worker: AccountId,
    ) -> Result<()> {
        let mut guard = self.lock(id).await?;
        let price = self.tokens.current_price().await;
        guard.submit_task_complete(index, worker, price)?;
        info!(
            project = %id.short(),
            index,
            worker = %worker.short(),
            entry_fee = guard.task(index)?.entry_fee,
            "✅ Task marked complete"
        );
        Ok(())
    }

    pub(crate) async fn check_validate(&self, id: ProjectId) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        guard.check_validate(now, self.config.validate_period)?;
        info!(project = %id.short(), deadline = guard.next_deadline, "🔍 Project validating");
        Ok(())
    }

    pub(crate) async fn validate_task(
        &self,
        id: ProjectId,
        index: usize,
        validator: AccountId,
        affirmative: bool,
    ) -> Result<Amount> {
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let fee = draft.validate_task(index, validator, affirmative, self.config.max_validators_per_side)?;

        self.tokens.transfer(validator, self.custody, fee).await?;
        *guard = draft;

        info!(
            project = %id.short(),
            index,
            validator = %validator.short(),
            affirmative,
            entry_fee = fee,
            "🧾 Task validated"
        );
        Ok(fee)
    }

    pub(crate) async fn check_voting(&self, id: ProjectId) -> Result<Vec<usize>> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let contested = draft.check_voting(now, self.config.voting_period())?;

        for index in &contested {
            let poll = self.voting.open_poll(self.config.quorum_params()).await?;
            draft.set_poll(*index, poll)?;
        }
        *guard = draft;

        info!(
            project = %id.short(),
            contested = contested.len(),
            deadline = guard.next_deadline,
            "🗳️ Project voting"
        );
        Ok(contested)
    }

    pub(crate) async fn vote_commit(
        &self,
        id: ProjectId,
        index: usize,
        voter: AccountId,
        kind: WeightKind,
        weight: Amount,
        secret_hash: [u8; 32],
        prior_poll: Option<PollId>,
    ) -> Result<()> {
        let guard = self.lock(id).await?;
        let poll = Self::open_poll_for(&guard, index)?;
        self.voting
            .commit(poll, voter, kind, weight, secret_hash, prior_poll)
            .await?;
        Ok(())
    }

    pub(crate) async fn vote_reveal(
        &self,
        id: ProjectId,
        index: usize,
        voter: AccountId,
        affirmative: bool,
        salt: u64,
    ) -> Result<()> {
        let guard = self.lock(id).await?;
        let poll = Self::open_poll_for(&guard, index)?;
        self.voting.reveal(poll, voter, affirmative, salt).await?;
        Ok(())
    }

    fn open_poll_for(project: &Project, index: usize) -> Result<PollId> {
        if project.state != ProjectState::Voting {
            return Err(ProtocolError::invalid_state("Voting", project.state));
        }
        project
            .task(index)?
            .poll
            .ok_or_else(|| ProtocolError::invalid_state("contested task", "uncontested task"))
    }

    pub(crate) async fn check_end(&self, id: ProjectId) -> Result<ProjectState> {
        let now = self.clock.now();
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();

        let mut results = HashMap::new();
        for (index, poll) in draft.polls() {
            if !self.voting.poll_ended(poll).await? {
                return Err(ProtocolError::DeadlineNotReached {
                    deadline: draft.next_deadline,
                    now,
                });
            }
            results.insert(index, self.voting.tally(poll).await?);
        }

        let released = draft.check_end(now, &results, self.config.fail_threshold)?;
        self.tokens.deposit_pool(released).await?;
        *guard = draft;
        Ok(guard.state)
    }

    pub(crate) async fn refund_proposer(
        &self,
        id: ProjectId,
        authority: StakeAuthority,
        caller: AccountId,
    ) -> Result<Amount> {
        let mut guard = self.lock(id).await?;
        if guard.proposer_type != authority.kind() {
            return Err(ProtocolError::Unauthorized(format!(
                "proposer stake is held in {}",
                guard.proposer_type
            )));
        }
        let mut draft = guard.clone();
        let refund = draft.refund_proposer(caller)?;
        self.release_stake(authority.kind(), caller, refund).await?;
        *guard = draft;

        info!(project = %id.short(), proposer = %caller.short(), refund, "↩️ Proposer refunded");
        Ok(refund)
    }

    pub(crate) async fn refund_staker(
        &self,
        id: ProjectId,
        authority: StakeAuthority,
        staker: AccountId,
    ) -> Result<Amount> {
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let refund = draft.refund_staker(staker, authority.kind())?;
        self.release_stake(authority.kind(), staker, refund).await?;
        *guard = draft;

        info!(
            project = %id.short(),
            staker = %staker.short(),
            kind = %authority.kind(),
            refund,
            "↩️ Staker refunded"
        );
        Ok(refund)
    }

    async fn release_stake(&self, kind: WeightKind, to: AccountId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        match kind {
            WeightKind::Token => self.tokens.transfer(self.custody, to, amount).await?,
            WeightKind::Reputation => self.reputation.mint(to, amount).await?,
        }
        Ok(())
    }

    pub(crate) async fn reward_task(
        &self,
        id: ProjectId,
        index: usize,
        worker: AccountId,
    ) -> Result<WorkerPayout> {
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let payout = draft.reward_task(index, worker)?;

        if payout.reputation_reward > 0 {
            self.reputation.mint(worker, payout.reputation_reward).await?;
        }
        if let Err(err) = self.tokens.pay(worker, payout.wei_reward).await {
            if payout.reputation_reward > 0 {
                self.reputation.burn(worker, payout.reputation_reward).await?;
            }
            return Err(err.into());
        }
        *guard = draft;

        info!(
            project = %id.short(),
            index,
            worker = %worker.short(),
            wei = payout.wei_reward,
            reputation = payout.reputation_reward,
            "🎁 Worker rewarded"
        );
        Ok(payout)
    }

    pub(crate) async fn reward_validator(
        &self,
        id: ProjectId,
        index: usize,
        validator: AccountId,
    ) -> Result<ValidatorPayout> {
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let payout = draft.reward_validator(index, validator)?;

        // Burning cannot be undone, so it goes last.
        if payout.tokens_refunded > 0 {
            self.tokens
                .transfer(self.custody, validator, payout.tokens_refunded)
                .await?;
        }
        if let Err(err) = self.tokens.pay(validator, payout.wei_reward).await {
            self.return_to_custody(validator, payout.tokens_refunded).await?;
            return Err(err.into());
        }
        if payout.tokens_burned > 0 {
            if let Err(err) = self.tokens.destroy(self.custody, payout.tokens_burned).await {
                self.tokens.reclaim(validator, payout.wei_reward).await?;
                self.return_to_custody(validator, payout.tokens_refunded).await?;
                return Err(err.into());
            }
        }
        *guard = draft;

        info!(
            project = %id.short(),
            index,
            validator = %validator.short(),
            refunded = payout.tokens_refunded,
            burned = payout.tokens_burned,
            wei = payout.wei_reward,
            "🎁 Validator settled"
        );
        Ok(payout)
    }

    async fn return_to_custody(&self, from: AccountId, tokens: Amount) -> Result<()> {
        if tokens > 0 {
            self.tokens.transfer(from, self.custody, tokens).await?;
        }
        Ok(())
    }

    pub(crate) async fn reward_originator(&self, id: ProjectId, caller: AccountId) -> Result<Amount> {
        let mut guard = self.lock(id).await?;
        let mut draft = guard.clone();
        let reward = draft.reward_originator(caller)?;
        self.tokens.pay(caller, reward).await?;
        *guard = draft;

        info!(project = %id.short(), originator = %caller.short(), reward, "🎁 Originator rewarded");
        Ok(reward)
    }

    /// Buy `votes` more voting weight. Cost is quadratic in the total held.
    pub(crate) async fn request_voting_weight(
        &self,
        voter: AccountId,
        kind: WeightKind,
        votes: Amount,
    ) -> Result<Amount> {
        if votes == 0 {
            return Err(ProtocolError::InvalidAmount("votes must be positive".to_string()));
        }
        let _serial = self.voting_lock.lock().await;
        let held = self.voting.available_weight(voter, kind).await;
        let after = held
            .checked_add(votes)
            .ok_or_else(|| ProtocolError::InvalidAmount("vote overflow".to_string()))?;
        let cost = square(after)?
            .checked_sub(square(held)?)
            .ok_or_else(|| ProtocolError::InvalidAmount("vote cost underflow".to_string()))?;

        match kind {
            WeightKind::Token => self.tokens.transfer(voter, self.custody, cost).await?,
            WeightKind::Reputation => self.reputation.burn(voter, cost).await?,
        }
        if let Err(err) = self.voting.grant_weight(voter, kind, votes).await {
            self.release_stake(kind, voter, cost).await?;
            return Err(err.into());
        }

        info!(voter = %voter.short(), kind = %kind, votes, cost, "🗳️ Voting weight acquired");
        Ok(cost)
    }

    /// Return `votes` of unlocked voting weight. Fails when `votes` exceeds
    /// available minus locked weight.
    pub(crate) async fn refund_voting_weight(
        &self,
        voter: AccountId,
        kind: WeightKind,
        votes: Amount,
    ) -> Result<Amount> {
        if votes == 0 {
            return Err(ProtocolError::InvalidAmount("votes must be positive".to_string()));
        }
        let _serial = self.voting_lock.lock().await;
        let held = self.voting.available_weight(voter, kind).await;
        let locked = self.voting.locked_weight(voter, kind).await;
        let unlocked = held.saturating_sub(locked);
        if votes > unlocked {
            return Err(ProtocolError::InsufficientBalance {
                needed: votes,
                available: unlocked,
            });
        }
        let refund = square(held)? - square(held - votes)?;

        self.voting.release_weight(voter, kind, votes).await?;
        if let Err(err) = self.release_stake(kind, voter, refund).await {
            self.voting.grant_weight(voter, kind, votes).await?;
            return Err(err);
        }

        info!(voter = %voter.short(), kind = %kind, votes, refund, "↩️ Voting weight refunded");
        Ok(refund)
    }
}

fn square(value: Amount) -> Result<Amount> {
    value
        .checked_mul(value)
        .ok_or_else(|| ProtocolError::InvalidAmount("vote count too large".to_string()))
}

use super::{ProjectLifecycle, ProjectRegistry};
use crate::error::Result;
use crate::stake::StakeAuthority;
use crate::types::{ProjectId, ValidatorPayout, WorkerPayout};
use distribute_ledger::{AccountId, Amount, PollId, WeightKind};
use std::sync::Arc;

/// Token-side entry point: token staking, task validation, validator and
/// originator payouts, token voting weight.
#[derive(Clone)]
pub struct TokenRegistry {
    inner: Arc<ProjectRegistry>,
}

impl TokenRegistry {
    pub(crate) fn new(inner: Arc<ProjectRegistry>) -> Self {
        Self { inner }
    }

    /// Propose a project backed by a token stake. The stake is the token
    /// equivalent of `cost / propose_proportion` at the current price.
    pub async fn propose_project(
        &self,
        proposer: AccountId,
        cost: Amount,
        staking_deadline: i64,
        content_hash: [u8; 32],
    ) -> Result<ProjectId> {
        self.inner
            .propose(proposer, WeightKind::Token, cost, staking_deadline, content_hash)
            .await
    }

    /// Returns the number of tokens actually taken, capped at what the
    /// project still needs.
    pub async fn stake_tokens(&self, id: ProjectId, staker: AccountId, tokens: Amount) -> Result<Amount> {
        self.inner.stake_tokens(id, staker, tokens).await
    }

    pub async fn unstake_tokens(&self, id: ProjectId, staker: AccountId, tokens: Amount) -> Result<Amount> {
        self.inner.unstake_tokens(id, staker, tokens).await
    }

    pub async fn add_task_hash(&self, id: ProjectId, staker: AccountId, hash: [u8; 32]) -> Result<()> {
        self.inner.add_task_hash(id, staker, hash).await
    }

    pub async fn submit_hash_list(
        &self,
        id: ProjectId,
        staker: AccountId,
        task_hashes: Vec<[u8; 32]>,
    ) -> Result<()> {
        self.inner.submit_hash_list(id, staker, task_hashes).await
    }

    pub async fn claim_task(
        &self,
        id: ProjectId,
        index: usize,
        worker: AccountId,
        description: &str,
        weighting: u8,
    ) -> Result<()> {
        self.inner
            .claim_task(id, StakeAuthority::TokenRegistry, index, worker, description, weighting)
            .await
    }

    pub async fn submit_task_complete(&self, id: ProjectId, index: usize, worker: AccountId) -> Result<()> {
        self.inner.submit_task_complete(id, index, worker).await
    }

    pub async fn reward_task(&self, id: ProjectId, index: usize, worker: AccountId) -> Result<WorkerPayout> {
        self.inner.reward_task(id, index, worker).await
    }

    /// Take a side on a completed task. Charges the task's entry fee in
    /// tokens.
    pub async fn validate_task(
        &self,
        id: ProjectId,
        index: usize,
        validator: AccountId,
        affirmative: bool,
    ) -> Result<Amount> {
        self.inner.validate_task(id, index, validator, affirmative).await
    }

    pub async fn reward_validator(&self, id: ProjectId, index: usize, validator: AccountId) -> Result<ValidatorPayout> {
        self.inner.reward_validator(id, index, validator).await
    }

    pub async fn reward_originator(&self, id: ProjectId, caller: AccountId) -> Result<Amount> {
        self.inner.reward_originator(id, caller).await
    }

    pub async fn refund_proposer(&self, id: ProjectId, caller: AccountId) -> Result<Amount> {
        self.inner
            .refund_proposer(id, StakeAuthority::TokenRegistry, caller)
            .await
    }

    pub async fn refund_staker(&self, id: ProjectId, staker: AccountId) -> Result<Amount> {
        self.inner
            .refund_staker(id, StakeAuthority::TokenRegistry, staker)
            .await
    }

    /// Returns the token cost of the extra votes.
    pub async fn request_voting_tokens(&self, voter: AccountId, votes: Amount) -> Result<Amount> {
        self.inner
            .request_voting_weight(voter, WeightKind::Token, votes)
            .await
    }

    pub async fn refund_voting_tokens(&self, voter: AccountId, votes: Amount) -> Result<Amount> {
        self.inner
            .refund_voting_weight(voter, WeightKind::Token, votes)
            .await
    }

    pub async fn vote_commit(
        &self,
        id: ProjectId,
        index: usize,
        voter: AccountId,
        votes: Amount,
        secret_hash: [u8; 32],
        prior_poll: Option<PollId>,
    ) -> Result<()> {
        self.inner
            .vote_commit(id, index, voter, WeightKind::Token, votes, secret_hash, prior_poll)
            .await
    }

    pub async fn vote_reveal(
        &self,
        id: ProjectId,
        index: usize,
        voter: AccountId,
        affirmative: bool,
        salt: u64,
    ) -> Result<()> {
        self.inner.vote_reveal(id, index, voter, affirmative, salt).await
    }
}

impl ProjectLifecycle for TokenRegistry {
    fn registry(&self) -> &ProjectRegistry {
        &self.inner
    }
}

use super::{ProjectLifecycle, ProjectRegistry};
use crate::error::Result;
use crate::stake::StakeAuthority;
use crate::types::{ProjectId, WorkerPayout};
use distribute_ledger::{AccountId, Amount, PollId, WeightKind};
use std::sync::Arc;
use tracing::info;

/// Reputation-side entry point: registration, reputation staking, task
/// claims and worker payouts, reputation voting weight.
#[derive(Clone)]
pub struct ReputationRegistry {
    inner: Arc<ProjectRegistry>,
}

impl ReputationRegistry {
    pub(crate) fn new(inner: Arc<ProjectRegistry>) -> Self {
        Self { inner }
    }

    /// One-time registration. Returns the starting grant.
    pub async fn register(&self, account: AccountId) -> Result<Amount> {
        let grant = self.inner.reputation.register(account).await?;
        info!(account = %account.short(), grant, "👤 Account registered");
        Ok(grant)
    }

    pub async fn propose_project(
        &self,
        proposer: AccountId,
        cost: Amount,
        staking_deadline: i64,
        content_hash: [u8; 32],
    ) -> Result<ProjectId> {
        self.inner
            .propose(proposer, WeightKind::Reputation, cost, staking_deadline, content_hash)
            .await
    }

    pub async fn stake_reputation(&self, id: ProjectId, staker: AccountId, amount: Amount) -> Result<Amount> {
        self.inner.stake_reputation(id, staker, amount).await
    }

    pub async fn unstake_reputation(&self, id: ProjectId, staker: AccountId, amount: Amount) -> Result<()> {
        self.inner.unstake_reputation(id, staker, amount).await
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

    /// Claim task `index` by revealing its description and weighting. The
    /// worker must hold at least the task's reputation reward.
    pub async fn claim_task(
        &self,
        id: ProjectId,
        index: usize,
        worker: AccountId,
        description: &str,
        weighting: u8,
    ) -> Result<()> {
        self.inner
            .claim_task(id, StakeAuthority::ReputationRegistry, index, worker, description, weighting)
            .await
    }

    pub async fn submit_task_complete(&self, id: ProjectId, index: usize, worker: AccountId) -> Result<()> {
        self.inner.submit_task_complete(id, index, worker).await
    }

    pub async fn reward_task(&self, id: ProjectId, index: usize, worker: AccountId) -> Result<WorkerPayout> {
        self.inner.reward_task(id, index, worker).await
    }

    pub async fn refund_proposer(&self, id: ProjectId, caller: AccountId) -> Result<Amount> {
        self.inner
            .refund_proposer(id, StakeAuthority::ReputationRegistry, caller)
            .await
    }

    pub async fn refund_staker(&self, id: ProjectId, staker: AccountId) -> Result<Amount> {
        self.inner
            .refund_staker(id, StakeAuthority::ReputationRegistry, staker)
            .await
    }

    pub async fn request_voting_reputation(&self, voter: AccountId, votes: Amount) -> Result<Amount> {
        self.inner
            .request_voting_weight(voter, WeightKind::Reputation, votes)
            .await
    }

    pub async fn refund_voting_reputation(&self, voter: AccountId, votes: Amount) -> Result<Amount> {
        self.inner
            .refund_voting_weight(voter, WeightKind::Reputation, votes)
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
            .vote_commit(id, index, voter, WeightKind::Reputation, votes, secret_hash, prior_poll)
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

impl ProjectLifecycle for ReputationRegistry {
    fn registry(&self) -> &ProjectRegistry {
        &self.inner
    }
}

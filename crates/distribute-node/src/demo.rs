use crate::config::NodeConfig;
use anyhow::{ensure, Context, Result};
use distribute_ledger::{
    vote_commitment, AccountId, Amount, Clock, ManualClock, MemoryReputationLedger,
    MemoryTokenLedger, MemoryVotingLedger, SystemClock, TokenLedger,
};
use distribute_protocol::{
    task_hash, task_list_hash, ProjectLifecycle, ProjectRegistry, ProjectState, ProtocolError,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

const TASKS: [(&str, u8); 3] = [
    ("write the specification", 30),
    ("implement the service", 50),
    ("document the release", 20),
];

#[derive(Debug, Serialize)]
pub struct Payout {
    pub account: String,
    pub role: &'static str,
    pub wei: Amount,
    pub tokens: Amount,
    pub reputation: Amount,
}

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub project: String,
    pub final_state: String,
    pub cost: Amount,
    pub escrow_left: Amount,
    pub pool: Amount,
    pub token_supply: Amount,
    pub payouts: Vec<Payout>,
}

fn payout(account: AccountId, role: &'static str, wei: Amount, tokens: Amount, reputation: Amount) -> Payout {
    Payout {
        account: account.short(),
        role,
        wei,
        tokens,
        reputation,
    }
}

/// Drive one project from proposal to full settlement against in-memory
/// ledgers and a manual clock.
pub async fn run_demo(config: &NodeConfig, cost: Amount) -> Result<DemoReport> {
    config.validate()?;
    ensure!(
        cost > 0 && cost <= config.ledger.initial_pool,
        "cost must be between 1 and the initial pool ({})",
        config.ledger.initial_pool
    );

    let genesis = AccountId::from_label("genesis");
    let clock = Arc::new(ManualClock::new(SystemClock.now()));
    let tokens = Arc::new(MemoryTokenLedger::with_genesis(
        config.ledger.initial_pool,
        config.ledger.initial_supply,
        genesis,
    ));
    let reputation = Arc::new(MemoryReputationLedger::new(config.ledger.reputation_grant));
    let voting = Arc::new(MemoryVotingLedger::new(clock.clone()));
    let registry = ProjectRegistry::new(
        config.protocol.clone(),
        tokens.clone(),
        reputation,
        voting,
        clock.clone(),
    )?;
    let tr = registry.token_registry();
    let rr = registry.reputation_registry();

    let [s1, s2, w1, w2, v1, v2, v3, voter] =
        ["s1", "s2", "w1", "w2", "v1", "v2", "v3", "voter"].map(AccountId::from_label);

    // Only the stakers hold reputation when the project is priced.
    rr.register(s1).await?;
    rr.register(s2).await?;

    let price = tokens.current_price().await;
    let needed = cost.div_ceil(price);
    let handouts = [(s1, needed), (s2, needed), (v1, needed), (v2, needed), (v3, needed), (voter, 100)];
    let total: Amount = handouts.iter().map(|(_, n)| n).sum();
    ensure!(
        tokens.balance_of(genesis).await >= total.saturating_add(needed),
        "initial supply too small for a project costing {}",
        cost
    );
    for (account, amount) in handouts {
        tokens.transfer(genesis, account, amount).await?;
    }

    let deadline = clock.now() + config.protocol.staking_period_min + 24 * 3600;
    let id = tr
        .propose_project(genesis, cost, deadline, *blake3::hash(b"distribute demo").as_bytes())
        .await
        .context("proposing demo project")?;

    tr.stake_tokens(id, s1, needed / 2).await?;
    tr.stake_tokens(id, s2, needed).await?;
    let reputation_cost = registry.project(id).await?.reputation_cost;
    if reputation_cost > 0 {
        rr.stake_reputation(id, s1, reputation_cost / 2).await?;
        rr.stake_reputation(id, s2, reputation_cost).await?;
    }
    ensure!(
        tr.check_staked(id).await? == ProjectState::Staked,
        "demo project did not fund"
    );

    let hashes: Vec<[u8; 32]> = TASKS.iter().map(|(d, w)| task_hash(d, *w)).collect();
    let list = task_list_hash(&hashes);
    tr.add_task_hash(id, s1, list).await?;
    tr.add_task_hash(id, s2, list).await?;
    tr.check_active(id).await?;
    tr.submit_hash_list(id, s1, hashes).await?;

    rr.register(w1).await?;
    rr.register(w2).await?;
    let workers = [w1, w2, w1];
    for (index, ((description, weighting), worker)) in TASKS.iter().zip(workers).enumerate() {
        rr.claim_task(id, index, worker, description, *weighting).await?;
        rr.submit_task_complete(id, index, worker).await?;
    }

    clock.advance(config.protocol.active_period);
    tr.check_validate(id).await?;
    tr.validate_task(id, 0, v1, true).await?;
    tr.validate_task(id, 1, v2, true).await?;
    tr.validate_task(id, 2, v1, true).await?;
    tr.validate_task(id, 2, v3, false).await?;

    clock.advance(config.protocol.validate_period);
    let contested = tr.check_voting(id).await?;
    info!(contested = ?contested, "🗳️ Contested tasks go to a vote");

    tr.request_voting_tokens(voter, 4).await?;
    for index in &contested {
        tr.vote_commit(id, *index, voter, 4, vote_commitment(true, 7), None)
            .await?;
    }
    clock.advance(config.protocol.voting_commit_period);
    for index in &contested {
        tr.vote_reveal(id, *index, voter, true, 7).await?;
    }
    clock.advance(config.protocol.voting_reveal_period);
    let final_state = tr.check_end(id).await?;

    let mut payouts = Vec::new();
    let project = registry.project(id).await?;
    for (index, task) in project.tasks.iter().enumerate() {
        if let Some(worker) = task.claimer {
            match rr.reward_task(id, index, worker).await {
                Ok(paid) => payouts.push(payout(
                    worker,
                    "worker",
                    paid.wei_reward,
                    0,
                    paid.reputation_reward,
                )),
                // lost tasks pay nothing
                Err(ProtocolError::InvalidState { .. }) => {}
                Err(err) => return Err(err).context("rewarding worker"),
            }
        }
        for validator in task.affirmative.iter().chain(task.negative.iter()) {
            let paid = tr.reward_validator(id, index, *validator).await?;
            payouts.push(payout(*validator, "validator", paid.wei_reward, paid.tokens_refunded, 0));
        }
    }
    if final_state == ProjectState::Complete {
        let reward = tr.reward_originator(id, s1).await?;
        payouts.push(payout(s1, "originator", reward, 0, 0));
    }
    for staker in [s1, s2] {
        let refunded = tr.refund_staker(id, staker).await?;
        let rep = if reputation_cost > 0 {
            rr.refund_staker(id, staker).await?
        } else {
            0
        };
        payouts.push(payout(staker, "staker", 0, refunded, rep));
    }
    let refund = tr.refund_proposer(id, genesis).await?;
    payouts.push(payout(genesis, "proposer", 0, refund, 0));
    tr.refund_voting_tokens(voter, 4).await?;

    let escrow_left = registry.project(id).await?.escrow;
    info!(
        project = %id.short(),
        state = %final_state,
        escrow_left,
        "🏁 Demo finished"
    );

    Ok(DemoReport {
        project: id.to_string(),
        final_state: final_state.to_string(),
        cost,
        escrow_left,
        pool: tokens.pool_balance().await,
        token_supply: tokens.total_supply().await,
        payouts,
    })
}

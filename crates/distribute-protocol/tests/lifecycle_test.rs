use distribute_ledger::{
    vote_commitment, AccountId, Amount, ManualClock, MemoryReputationLedger, MemoryTokenLedger,
    MemoryVotingLedger, ReputationLedger, TokenLedger, VotingLedger, WeightKind,
};
use distribute_protocol::{
    task_hash, task_list_hash, ProjectId, ProjectLifecycle, ProjectRegistry, ProjectState,
    ProtocolConfig, ProtocolError, ReputationRegistry, TokenRegistry, ValidatorPayout,
    WorkerPayout,
};
use std::sync::Arc;

const NOW: i64 = 1_700_000_000;
const DAY: i64 = 24 * 3600;
const COST: Amount = 100_000;
const TASKS: [(&str, u8); 3] = [("design", 40), ("build", 35), ("test", 25)];

fn account(label: &str) -> AccountId {
    AccountId::from_label(label)
}

struct Network {
    clock: Arc<ManualClock>,
    tokens: Arc<MemoryTokenLedger>,
    reputation: Arc<MemoryReputationLedger>,
    voting: Arc<MemoryVotingLedger>,
    registry: Arc<ProjectRegistry>,
    tr: TokenRegistry,
    rr: ReputationRegistry,
}

impl Network {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let tokens = Arc::new(MemoryTokenLedger::with_genesis(
            1_000_000,
            1_000_000,
            account("genesis"),
        ));
        let reputation = Arc::new(MemoryReputationLedger::new(10_000));
        let voting = Arc::new(MemoryVotingLedger::new(clock.clone()));
        let registry = ProjectRegistry::new(
            ProtocolConfig::default(),
            tokens.clone(),
            reputation.clone(),
            voting.clone(),
            clock.clone(),
        )
        .unwrap();
        let tr = registry.token_registry();
        let rr = registry.reputation_registry();
        Self {
            clock,
            tokens,
            reputation,
            voting,
            registry,
            tr,
            rr,
        }
    }

    async fn give_tokens(&self, to: &str, amount: Amount) {
        self.tokens
            .transfer(account("genesis"), account(to), amount)
            .await
            .unwrap();
    }

    async fn escrow(&self, id: ProjectId) -> Amount {
        self.registry.project(id).await.unwrap().escrow
    }
}

fn task_hashes() -> Vec<[u8; 32]> {
    TASKS.iter().map(|(d, w)| task_hash(d, *w)).collect()
}

/// Proposed by `proposer`, funded by `s1`/`s2` (50/50 in both currencies),
/// task list agreed and submitted by `s1`, every task claimed and completed.
async fn active_project(net: &Network) -> ProjectId {
    for name in ["s1", "s2", "w1", "w2"] {
        net.rr.register(account(name)).await.unwrap();
    }
    net.give_tokens("proposer", 5_000).await;
    net.give_tokens("s1", 50_000).await;
    net.give_tokens("s2", 80_000).await;

    let id = net
        .tr
        .propose_project(account("proposer"), COST, NOW + 3 * DAY, [9u8; 32])
        .await
        .unwrap();
    let project = net.registry.project(id).await.unwrap();
    assert_eq!(project.proposer_stake, COST / 20);
    assert_eq!(project.reputation_cost, 4_000);

    assert_eq!(net.tr.stake_tokens(id, account("s1"), 50_000).await.unwrap(), 50_000);
    assert_eq!(net.tr.stake_tokens(id, account("s2"), 80_000).await.unwrap(), 50_000);
    assert_eq!(net.rr.stake_reputation(id, account("s1"), 2_000).await.unwrap(), 2_000);
    assert_eq!(
        net.registry.project(id).await.unwrap().state,
        ProjectState::Proposed
    );
    net.rr.stake_reputation(id, account("s2"), 2_000).await.unwrap();
    assert_eq!(net.registry.project(id).await.unwrap().state, ProjectState::Staked);
    assert_eq!(net.registry.weight_of(id, account("s1")).await.unwrap(), 50);
    assert_eq!(net.tokens.balance_of(account("s2")).await, 30_000);

    let list = task_list_hash(&task_hashes());
    net.tr.add_task_hash(id, account("s1"), list).await.unwrap();
    assert!(matches!(
        net.tr.check_active(id).await,
        Err(ProtocolError::QuorumNotMet(_))
    ));
    net.rr.add_task_hash(id, account("s2"), list).await.unwrap();
    net.tr.check_active(id).await.unwrap();
    assert_eq!(net.escrow(id).await, COST + 5_000 + 1_000);

    net.tr
        .submit_hash_list(id, account("s1"), task_hashes())
        .await
        .unwrap();

    assert!(matches!(
        net.rr.claim_task(id, 0, account("drifter"), "design", 40).await,
        Err(ProtocolError::Unauthorized(_))
    ));
    net.rr.claim_task(id, 0, account("w1"), "design", 40).await.unwrap();
    net.rr.claim_task(id, 1, account("w2"), "build", 35).await.unwrap();
    net.tr.claim_task(id, 2, account("w1"), "test", 25).await.unwrap();
    for (index, worker) in [(0, "w1"), (1, "w2"), (2, "w1")] {
        net.rr
            .submit_task_complete(id, index, account(worker))
            .await
            .unwrap();
    }
    assert_eq!(net.registry.task(id, 0).await.unwrap().entry_fee, 40_000);

    id
}

#[tokio::test]
async fn test_complete_project_settles_to_empty_escrow() {
    let net = Network::new();
    let id = active_project(&net).await;

    for (name, amount) in [
        ("v1", 75_000),
        ("v2", 35_000),
        ("v3", 25_000),
        ("v4", 25_000),
        ("v5", 25_000),
        ("v6", 40_000),
        ("v7", 40_000),
        ("voter", 100),
    ] {
        net.give_tokens(name, amount).await;
    }

    assert!(matches!(
        net.tr.check_validate(id).await,
        Err(ProtocolError::DeadlineNotReached { .. })
    ));
    net.clock.advance(7 * DAY);
    net.tr.check_validate(id).await.unwrap();

    assert!(matches!(
        net.tr.validate_task(id, 0, account("w1"), true).await,
        Err(ProtocolError::Unauthorized(_))
    ));
    for (index, validator, affirmative) in [
        (0, "v1", true),
        (0, "v6", false),
        (0, "v7", false),
        (1, "v1", true),
        (1, "v2", true),
        (2, "v3", true),
        (2, "v4", false),
        (2, "v5", false),
    ] {
        net.tr
            .validate_task(id, index, account(validator), affirmative)
            .await
            .unwrap();
    }
    assert!(matches!(
        net.tr.validate_task(id, 1, account("v2"), true).await,
        Err(ProtocolError::AlreadyClaimed(_))
    ));

    net.clock.advance(7 * DAY);
    assert_eq!(net.rr.check_voting(id).await.unwrap(), vec![0, 2]);

    // Outvoted on counts, task 0 is rescued by the poll.
    let voter = account("voter");
    assert_eq!(net.tr.request_voting_tokens(voter, 10).await.unwrap(), 100);
    net.tr
        .vote_commit(id, 0, voter, 10, vote_commitment(true, 42), None)
        .await
        .unwrap();
    assert!(matches!(
        net.tr.vote_commit(id, 1, voter, 1, vote_commitment(true, 1), None).await,
        Err(ProtocolError::InvalidState { .. })
    ));
    assert!(net.tr.refund_voting_tokens(voter, 1).await.is_err());

    net.clock.advance(3 * DAY);
    net.tr.vote_reveal(id, 0, voter, true, 42).await.unwrap();
    assert!(matches!(
        net.tr.check_end(id).await,
        Err(ProtocolError::DeadlineNotReached { .. })
    ));
    net.clock.advance(3 * DAY);
    assert_eq!(net.tr.check_end(id).await.unwrap(), ProjectState::Complete);

    let project = net.registry.project(id).await.unwrap();
    assert_eq!(project.stakes.total_tokens(), 0);
    assert_eq!(project.stakes.total_reputation(), 0);
    assert_eq!(project.escrow, 81_000);
    assert_eq!(net.tokens.pool_balance().await, 1_000_000 - 106_000 + 25_000);

    assert!(matches!(
        net.tr.refund_staker(id, account("s1")).await,
        Err(ProtocolError::StillPending(_))
    ));

    assert_eq!(
        net.rr.reward_task(id, 0, account("w1")).await.unwrap(),
        WorkerPayout {
            wei_reward: 40_000,
            reputation_reward: 1_600,
        }
    );
    assert!(matches!(
        net.rr.reward_task(id, 0, account("w1")).await,
        Err(ProtocolError::AlreadyClaimed(_))
    ));
    assert_eq!(
        net.tr.reward_task(id, 1, account("w2")).await.unwrap().wei_reward,
        35_000
    );
    assert!(matches!(
        net.rr.reward_task(id, 2, account("w1")).await,
        Err(ProtocolError::InvalidState { .. })
    ));
    assert_eq!(net.reputation.balance_of(account("w1")).await, 11_600);
    assert_eq!(net.tokens.currency_balance_of(account("w1")).await, 40_000);

    let payouts = [
        (0, "v1", 40_000, 0, 2_000),
        (0, "v6", 20_000, 20_000, 0),
        (0, "v7", 20_000, 20_000, 0),
        // Two affirmative validators split 55/45.
        (1, "v1", 35_000, 0, 962),
        (1, "v2", 35_000, 0, 788),
        // Lone losing validator keeps half its fee.
        (2, "v3", 12_500, 12_500, 0),
        (2, "v4", 25_000, 0, 687),
        (2, "v5", 25_000, 0, 563),
    ];

    // A burn that cannot go through leaves the losing validator unsettled.
    let custody = net.registry.custody_account();
    let parked = net.tokens.balance_of(custody).await - 20_000;
    net.tokens.transfer(custody, account("vault"), parked).await.unwrap();
    assert!(matches!(
        net.tr.reward_validator(id, 2, account("v3")).await,
        Err(ProtocolError::InsufficientBalance { .. })
    ));
    assert_eq!(net.tokens.balance_of(custody).await, 20_000);
    assert_eq!(net.tokens.balance_of(account("v3")).await, 0);
    assert_eq!(net.tokens.total_supply().await, 1_000_000);
    net.tokens.transfer(account("vault"), custody, parked).await.unwrap();

    for (index, validator, refunded, burned, wei) in payouts {
        assert_eq!(
            net.tr
                .reward_validator(id, index, account(validator))
                .await
                .unwrap(),
            ValidatorPayout {
                tokens_refunded: refunded,
                tokens_burned: burned,
                wei_reward: wei,
            },
            "task {} validator {}",
            index,
            validator
        );
    }
    assert!(matches!(
        net.tr.reward_validator(id, 1, account("v2")).await,
        Err(ProtocolError::AlreadyClaimed(_))
    ));
    assert_eq!(net.tokens.balance_of(account("v1")).await, 75_000);
    assert_eq!(net.tokens.currency_balance_of(account("v1")).await, 2_962);
    assert_eq!(net.tokens.total_supply().await, 1_000_000 - 52_500);

    assert!(matches!(
        net.tr.reward_originator(id, account("s2")).await,
        Err(ProtocolError::Unauthorized(_))
    ));
    assert_eq!(net.tr.reward_originator(id, account("s1")).await.unwrap(), 1_000);
    assert_eq!(net.escrow(id).await, 0);

    for staker in ["s1", "s2"] {
        assert_eq!(net.tr.refund_staker(id, account(staker)).await.unwrap(), 50_000);
        assert_eq!(net.rr.refund_staker(id, account(staker)).await.unwrap(), 2_000);
    }
    assert!(matches!(
        net.tr.refund_staker(id, account("s1")).await,
        Err(ProtocolError::AlreadyClaimed(_))
    ));
    assert_eq!(net.reputation.balance_of(account("s1")).await, 10_000);

    assert!(matches!(
        net.rr.refund_proposer(id, account("proposer")).await,
        Err(ProtocolError::Unauthorized(_))
    ));
    assert_eq!(net.tr.refund_proposer(id, account("proposer")).await.unwrap(), 5_000);
    assert!(matches!(
        net.tr.refund_proposer(id, account("proposer")).await,
        Err(ProtocolError::AlreadyClaimed(_))
    ));
    assert_eq!(net.tokens.balance_of(account("proposer")).await, 5_000);

    // Poll is over, so the voter's weight is unlocked again.
    assert!(net.tr.refund_voting_tokens(voter, 11).await.is_err());
    assert_eq!(net.tr.refund_voting_tokens(voter, 10).await.unwrap(), 100);
    assert_eq!(net.voting.available_weight(voter, WeightKind::Token).await, 0);

    assert_eq!(net.tokens.balance_of(custody).await, 0);
}

#[tokio::test]
async fn test_failed_project_settles_without_originator() {
    let net = Network::new();
    let id = active_project(&net).await;
    net.give_tokens("v1", 40_000).await;
    net.give_tokens("v2", 35_000).await;

    net.clock.advance(7 * DAY);
    net.tr.check_validate(id).await.unwrap();
    net.tr.validate_task(id, 0, account("v1"), true).await.unwrap();
    net.tr.validate_task(id, 1, account("v2"), false).await.unwrap();

    net.clock.advance(7 * DAY);
    assert!(net.tr.check_voting(id).await.unwrap().is_empty());
    net.clock.advance(6 * DAY);
    assert_eq!(net.rr.check_end(id).await.unwrap(), ProjectState::Failed);
    assert_eq!(net.escrow(id).await, 43_750);
    assert_eq!(net.tokens.pool_balance().await, 1_000_000 - 106_000 + 62_250);

    net.rr.reward_task(id, 0, account("w1")).await.unwrap();
    assert!(matches!(
        net.rr.reward_task(id, 1, account("w2")).await,
        Err(ProtocolError::InvalidState { .. })
    ));
    assert_eq!(
        net.tr.reward_validator(id, 0, account("v1")).await.unwrap().wei_reward,
        2_000
    );
    assert_eq!(
        net.tr.reward_validator(id, 1, account("v2")).await.unwrap(),
        ValidatorPayout {
            tokens_refunded: 35_000,
            tokens_burned: 0,
            wei_reward: 1_750,
        }
    );
    assert!(matches!(
        net.tr.reward_originator(id, account("s1")).await,
        Err(ProtocolError::InvalidState { .. })
    ));
    assert_eq!(net.escrow(id).await, 0);

    assert_eq!(net.tr.refund_proposer(id, account("proposer")).await.unwrap(), 5_000);
    assert_eq!(net.tr.refund_staker(id, account("s2")).await.unwrap(), 50_000);
    assert_eq!(net.rr.refund_staker(id, account("s2")).await.unwrap(), 2_000);
}

#[tokio::test]
async fn test_underfunded_project_expires() {
    let net = Network::new();
    net.give_tokens("proposer", 5_000).await;
    net.give_tokens("s1", 30_000).await;

    let id = net
        .tr
        .propose_project(account("proposer"), COST, NOW + DAY, [3u8; 32])
        .await
        .unwrap();
    net.tr.stake_tokens(id, account("s1"), 30_000).await.unwrap();
    assert_eq!(net.tokens.pool_balance().await, 970_000);

    assert_eq!(net.tr.check_staked(id).await.unwrap(), ProjectState::Proposed);
    net.clock.advance(DAY);

    // Without the proposer's tokens in custody nothing is forfeited or drained.
    let custody = net.registry.custody_account();
    net.tokens.transfer(custody, account("vault"), 35_000).await.unwrap();
    assert!(matches!(
        net.rr.check_staked(id).await,
        Err(ProtocolError::InsufficientBalance { .. })
    ));
    assert_eq!(net.tokens.pool_balance().await, 970_000);
    assert_eq!(net.escrow(id).await, 30_000);
    assert_eq!(net.registry.project(id).await.unwrap().state, ProjectState::Proposed);
    net.tokens.transfer(account("vault"), custody, 35_000).await.unwrap();

    assert_eq!(net.rr.check_staked(id).await.unwrap(), ProjectState::Expired);

    assert_eq!(net.escrow(id).await, 0);
    assert_eq!(net.tokens.pool_balance().await, 1_000_000);
    assert_eq!(net.tokens.total_supply().await, 1_000_000 - 5_000);

    assert!(matches!(
        net.tr.check_active(id).await,
        Err(ProtocolError::InvalidState { .. })
    ));
    assert!(matches!(
        net.tr.check_validate(id).await,
        Err(ProtocolError::InvalidState { .. })
    ));
    assert!(matches!(
        net.tr.stake_tokens(id, account("s1"), 1).await,
        Err(ProtocolError::InvalidState { .. })
    ));
    assert!(matches!(
        net.tr.refund_proposer(id, account("proposer")).await,
        Err(ProtocolError::InvalidState { .. })
    ));

    assert_eq!(net.tr.refund_staker(id, account("s1")).await.unwrap(), 30_000);
    assert!(matches!(
        net.tr.refund_staker(id, account("s1")).await,
        Err(ProtocolError::AlreadyClaimed(_))
    ));
}

#[tokio::test]
async fn test_reputation_proposer_burns_stake() {
    let net = Network::new();
    for name in ["a", "b", "c", "proposer"] {
        net.rr.register(account(name)).await.unwrap();
    }
    assert!(matches!(
        net.rr.register(account("a")).await,
        Err(ProtocolError::Ledger(_))
    ));

    let id = net
        .rr
        .propose_project(account("proposer"), COST, NOW + DAY, [5u8; 32])
        .await
        .unwrap();
    // 40_000 reputation in circulation prices the project at 4_000.
    assert_eq!(net.registry.project(id).await.unwrap().proposer_stake, 200);
    assert_eq!(net.reputation.balance_of(account("proposer")).await, 9_800);

    assert!(matches!(
        net.tr.refund_proposer(id, account("proposer")).await,
        Err(ProtocolError::Unauthorized(_))
    ));
    net.clock.advance(DAY);
    net.rr.check_staked(id).await.unwrap();
    assert_eq!(net.reputation.total_supply().await, 40_000 - 200);
}

#[tokio::test]
async fn test_unstake_before_deadline() {
    let net = Network::new();
    net.give_tokens("proposer", 5_000).await;
    net.give_tokens("s1", 20_000).await;
    let id = net
        .tr
        .propose_project(account("proposer"), COST, NOW + DAY, [4u8; 32])
        .await
        .unwrap();

    net.tr.stake_tokens(id, account("s1"), 20_000).await.unwrap();
    assert_eq!(net.tr.unstake_tokens(id, account("s1"), 5_000).await.unwrap(), 5_000);
    assert!(matches!(
        net.tr.unstake_tokens(id, account("s1"), 20_000).await,
        Err(ProtocolError::InsufficientStake { .. })
    ));

    let stakes = net.registry.stakes_of(id, account("s1")).await.unwrap();
    assert_eq!(stakes.tokens, 15_000);
    assert_eq!(net.escrow(id).await, 15_000);
    assert_eq!(net.tokens.balance_of(account("s1")).await, 5_000);
    assert_eq!(net.tokens.pool_balance().await, 985_000);
}

#[tokio::test]
async fn test_unstake_reputation_restores_balance() {
    let net = Network::new();
    net.rr.register(account("s1")).await.unwrap();
    net.give_tokens("proposer", 5_000).await;
    let id = net
        .tr
        .propose_project(account("proposer"), COST, NOW + DAY, [3u8; 32])
        .await
        .unwrap();
    assert_eq!(net.registry.project(id).await.unwrap().reputation_cost, 1_000);

    net.rr.stake_reputation(id, account("s1"), 600).await.unwrap();
    assert_eq!(net.reputation.balance_of(account("s1")).await, 9_400);
    assert!(matches!(
        net.rr.unstake_reputation(id, account("s1"), 601).await,
        Err(ProtocolError::InsufficientStake {
            requested: 601,
            staked: 600
        })
    ));
    assert_eq!(net.reputation.balance_of(account("s1")).await, 9_400);

    net.rr.unstake_reputation(id, account("s1"), 600).await.unwrap();
    assert_eq!(net.reputation.balance_of(account("s1")).await, 10_000);
    assert_eq!(net.reputation.total_supply().await, 10_000);
    let stakes = net.registry.stakes_of(id, account("s1")).await.unwrap();
    assert_eq!(stakes.reputation, 0);
    assert_eq!(net.registry.weight_of(id, account("s1")).await.unwrap(), 0);
    assert!(matches!(
        net.tr.add_task_hash(id, account("s1"), [0u8; 32]).await,
        Err(ProtocolError::InvalidState { .. })
    ));
}

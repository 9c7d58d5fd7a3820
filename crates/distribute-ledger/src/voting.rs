use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::types::{vote_commitment, AccountId, Amount, PollId, PollResult, QuorumParams, WeightKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Commit-reveal voting with per-voter weight accounts.
///
/// Weight committed to a poll stays locked until the poll's reveal period
/// has ended.
#[async_trait]
pub trait VotingLedger: Send + Sync {
    async fn open_poll(&self, params: QuorumParams) -> Result<PollId>;

    async fn commit(
        &self,
        poll: PollId,
        voter: AccountId,
        kind: WeightKind,
        weight: Amount,
        secret_hash: [u8; 32],
        prior_poll: Option<PollId>,
    ) -> Result<()>;

    async fn reveal(&self, poll: PollId, voter: AccountId, affirmative: bool, salt: u64) -> Result<()>;

    /// Fails until the reveal period is over.
    async fn tally(&self, poll: PollId) -> Result<PollResult>;

    async fn poll_ended(&self, poll: PollId) -> Result<bool>;

    async fn available_weight(&self, voter: AccountId, kind: WeightKind) -> Amount;

    async fn locked_weight(&self, voter: AccountId, kind: WeightKind) -> Amount;

    async fn grant_weight(&self, voter: AccountId, kind: WeightKind, amount: Amount) -> Result<()>;

    /// Remove unlocked weight from a voter's account.
    async fn release_weight(&self, voter: AccountId, kind: WeightKind, amount: Amount) -> Result<()>;
}

#[derive(Debug, Clone)]
struct VoteCommit {
    kind: WeightKind,
    weight: Amount,
    secret_hash: [u8; 32],
    revealed: bool,
}

#[derive(Debug, Clone)]
struct Poll {
    params: QuorumParams,
    commit_end: i64,
    reveal_end: i64,
    commits: HashMap<AccountId, VoteCommit>,
    affirmative: Amount,
    negative: Amount,
}

#[derive(Debug, Default)]
struct VotingState {
    polls: HashMap<PollId, Poll>,
    weights: HashMap<(AccountId, WeightKind), Amount>,
    next_poll: u64,
}

impl VotingState {
    fn locked(&self, voter: AccountId, kind: WeightKind, now: i64) -> Amount {
        self.polls
            .values()
            .filter(|poll| now < poll.reveal_end)
            .filter_map(|poll| poll.commits.get(&voter))
            .filter(|commit| commit.kind == kind)
            .map(|commit| commit.weight)
            .sum()
    }

    fn available(&self, voter: AccountId, kind: WeightKind) -> Amount {
        self.weights.get(&(voter, kind)).copied().unwrap_or(0)
    }
}

pub struct MemoryVotingLedger {
    clock: Arc<dyn Clock>,
    state: Arc<RwLock<VotingState>>,
}

impl MemoryVotingLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Arc::new(RwLock::new(VotingState {
                next_poll: 1,
                ..Default::default()
            })),
        }
    }
}

#[async_trait]
impl VotingLedger for MemoryVotingLedger {
    async fn open_poll(&self, params: QuorumParams) -> Result<PollId> {
        if params.vote_quorum > 100 {
            return Err(LedgerError::InvalidAmount(format!(
                "vote quorum {} above 100",
                params.vote_quorum
            )));
        }
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let id = PollId(state.next_poll);
        state.next_poll += 1;

        let commit_end = now + params.commit_duration;
        let poll = Poll {
            params,
            commit_end,
            reveal_end: commit_end + params.reveal_duration,
            commits: HashMap::new(),
            affirmative: 0,
            negative: 0,
        };
        info!(
            poll = id.0,
            quorum = params.vote_quorum,
            commit_end = poll.commit_end,
            reveal_end = poll.reveal_end,
            "🗳️ Poll opened"
        );
        state.polls.insert(id, poll);
        Ok(id)
    }

    async fn commit(
        &self,
        poll: PollId,
        voter: AccountId,
        kind: WeightKind,
        weight: Amount,
        secret_hash: [u8; 32],
        prior_poll: Option<PollId>,
    ) -> Result<()> {
        if weight == 0 {
            return Err(LedgerError::InvalidAmount("vote weight must be positive".to_string()));
        }
        let now = self.clock.now();
        let mut state = self.state.write().await;

        if let Some(prior) = prior_poll {
            if !state.polls.contains_key(&prior) {
                return Err(LedgerError::PollNotFound(prior.0));
            }
        }

        let unlocked = state
            .available(voter, kind)
            .saturating_sub(state.locked(voter, kind, now));
        if weight > unlocked {
            return Err(LedgerError::InsufficientVotingWeight {
                requested: weight,
                unlocked,
            });
        }

        let entry = state
            .polls
            .get_mut(&poll)
            .ok_or(LedgerError::PollNotFound(poll.0))?;
        if now >= entry.commit_end {
            return Err(LedgerError::InvalidPollPhase {
                poll: poll.0,
                expected: "commit".to_string(),
            });
        }
        if entry.commits.contains_key(&voter) {
            return Err(LedgerError::DuplicateCommit {
                voter: voter.short(),
                poll: poll.0,
            });
        }
        entry.commits.insert(
            voter,
            VoteCommit {
                kind,
                weight,
                secret_hash,
                revealed: false,
            },
        );

        info!(
            poll = poll.0,
            voter = %voter.short(),
            kind = %kind,
            weight,
            commitment = hex::encode(&secret_hash[..8]),
            "🔒 Vote committed"
        );
        Ok(())
    }

    async fn reveal(&self, poll: PollId, voter: AccountId, affirmative: bool, salt: u64) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let entry = state
            .polls
            .get_mut(&poll)
            .ok_or(LedgerError::PollNotFound(poll.0))?;
        if now < entry.commit_end || now >= entry.reveal_end {
            return Err(LedgerError::InvalidPollPhase {
                poll: poll.0,
                expected: "reveal".to_string(),
            });
        }

        let commit = entry
            .commits
            .get_mut(&voter)
            .ok_or_else(|| LedgerError::CommitNotFound {
                voter: voter.short(),
                poll: poll.0,
            })?;
        if commit.revealed {
            return Err(LedgerError::DuplicateCommit {
                voter: voter.short(),
                poll: poll.0,
            });
        }
        if vote_commitment(affirmative, salt) != commit.secret_hash {
            return Err(LedgerError::CommitmentMismatch(poll.0));
        }
        commit.revealed = true;
        let weight = commit.weight;

        if affirmative {
            entry.affirmative += weight;
        } else {
            entry.negative += weight;
        }

        info!(
            poll = poll.0,
            voter = %voter.short(),
            affirmative,
            weight,
            "🔓 Vote revealed"
        );
        Ok(())
    }

    async fn tally(&self, poll: PollId) -> Result<PollResult> {
        let now = self.clock.now();
        let state = self.state.read().await;
        let entry = state
            .polls
            .get(&poll)
            .ok_or(LedgerError::PollNotFound(poll.0))?;
        if now < entry.reveal_end {
            return Err(LedgerError::InvalidPollPhase {
                poll: poll.0,
                expected: "ended".to_string(),
            });
        }

        let affirmative = entry.affirmative as u128;
        let negative = entry.negative as u128;
        let passed = 100 * affirmative > entry.params.vote_quorum as u128 * (affirmative + negative);
        debug!(
            poll = poll.0,
            affirmative = entry.affirmative,
            negative = entry.negative,
            passed,
            "Poll tallied"
        );

        Ok(PollResult {
            affirmative: entry.affirmative,
            negative: entry.negative,
            passed,
        })
    }

    async fn poll_ended(&self, poll: PollId) -> Result<bool> {
        let now = self.clock.now();
        let state = self.state.read().await;
        let entry = state
            .polls
            .get(&poll)
            .ok_or(LedgerError::PollNotFound(poll.0))?;
        Ok(now >= entry.reveal_end)
    }

    async fn available_weight(&self, voter: AccountId, kind: WeightKind) -> Amount {
        self.state.read().await.available(voter, kind)
    }

    async fn locked_weight(&self, voter: AccountId, kind: WeightKind) -> Amount {
        let now = self.clock.now();
        self.state.read().await.locked(voter, kind, now)
    }

    async fn grant_weight(&self, voter: AccountId, kind: WeightKind, amount: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        let weight = state.weights.entry((voter, kind)).or_insert(0);
        *weight = weight
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("voting weight".to_string()))?;
        debug!(voter = %voter.short(), kind = %kind, amount, "Voting weight granted");
        Ok(())
    }

    async fn release_weight(&self, voter: AccountId, kind: WeightKind, amount: Amount) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let unlocked = state
            .available(voter, kind)
            .saturating_sub(state.locked(voter, kind, now));
        if amount > unlocked {
            return Err(LedgerError::InsufficientVotingWeight {
                requested: amount,
                unlocked,
            });
        }
        if let Some(weight) = state.weights.get_mut(&(voter, kind)) {
            *weight -= amount;
        }
        debug!(voter = %voter.short(), kind = %kind, amount, "Voting weight released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const DAY: i64 = 24 * 3600;

    fn setup() -> (Arc<ManualClock>, MemoryVotingLedger) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let ledger = MemoryVotingLedger::new(clock.clone());
        (clock, ledger)
    }

    #[tokio::test]
    async fn test_commit_reveal_tally() {
        let (clock, ledger) = setup();
        let yes = AccountId::from_label("yes");
        let no = AccountId::from_label("no");
        ledger.grant_weight(yes, WeightKind::Token, 4).await.unwrap();
        ledger.grant_weight(no, WeightKind::Reputation, 3).await.unwrap();

        let poll = ledger.open_poll(QuorumParams::default()).await.unwrap();
        ledger
            .commit(poll, yes, WeightKind::Token, 4, vote_commitment(true, 7), None)
            .await
            .unwrap();
        ledger
            .commit(poll, no, WeightKind::Reputation, 3, vote_commitment(false, 9), None)
            .await
            .unwrap();
        assert_eq!(ledger.locked_weight(yes, WeightKind::Token).await, 4);

        // still committing
        assert!(ledger.reveal(poll, yes, true, 7).await.is_err());
        clock.advance(3 * DAY);
        ledger.reveal(poll, yes, true, 7).await.unwrap();
        ledger.reveal(poll, no, false, 9).await.unwrap();
        assert!(ledger.tally(poll).await.is_err());

        clock.advance(3 * DAY);
        let result = ledger.tally(poll).await.unwrap();
        assert_eq!(result.affirmative, 4);
        assert_eq!(result.negative, 3);
        assert!(result.passed);
        assert_eq!(ledger.locked_weight(yes, WeightKind::Token).await, 0);
    }

    #[tokio::test]
    async fn test_reveal_must_match_commitment() {
        let (clock, ledger) = setup();
        let voter = AccountId::from_label("voter");
        ledger.grant_weight(voter, WeightKind::Token, 2).await.unwrap();
        let poll = ledger.open_poll(QuorumParams::default()).await.unwrap();
        ledger
            .commit(poll, voter, WeightKind::Token, 2, vote_commitment(true, 1), None)
            .await
            .unwrap();
        clock.advance(3 * DAY);

        assert_eq!(
            ledger.reveal(poll, voter, false, 1).await,
            Err(LedgerError::CommitmentMismatch(poll.0))
        );
        ledger.reveal(poll, voter, true, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_bounded_by_unlocked_weight() {
        let (_clock, ledger) = setup();
        let voter = AccountId::from_label("voter");
        ledger.grant_weight(voter, WeightKind::Token, 5).await.unwrap();
        let first = ledger.open_poll(QuorumParams::default()).await.unwrap();
        let second = ledger.open_poll(QuorumParams::default()).await.unwrap();

        ledger
            .commit(first, voter, WeightKind::Token, 3, vote_commitment(true, 1), None)
            .await
            .unwrap();
        let err = ledger
            .commit(second, voter, WeightKind::Token, 3, vote_commitment(true, 1), Some(first))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientVotingWeight {
                requested: 3,
                unlocked: 2
            }
        );
        assert!(ledger.release_weight(voter, WeightKind::Token, 3).await.is_err());
        ledger.release_weight(voter, WeightKind::Token, 2).await.unwrap();
        assert_eq!(ledger.available_weight(voter, WeightKind::Token).await, 3);
    }

    #[tokio::test]
    async fn test_empty_poll_does_not_pass() {
        let (clock, ledger) = setup();
        let poll = ledger.open_poll(QuorumParams::default()).await.unwrap();
        clock.advance(7 * DAY);
        assert!(ledger.poll_ended(poll).await.unwrap());
        assert!(!ledger.tally(poll).await.unwrap().passed);
    }
}

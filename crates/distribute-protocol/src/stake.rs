use crate::error::{ProtocolError, Result};
use distribute_ledger::{AccountId, Amount, WeightKind};
use std::collections::HashMap;
use tracing::debug;

/// Which registry is performing a stake operation. Each registry may only
/// move the stake kind it brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeAuthority {
    TokenRegistry,
    ReputationRegistry,
}

impl StakeAuthority {
    pub fn kind(&self) -> WeightKind {
        match self {
            StakeAuthority::TokenRegistry => WeightKind::Token,
            StakeAuthority::ReputationRegistry => WeightKind::Reputation,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakeRecord {
    pub tokens: Amount,
    pub reputation: Amount,
    /// Currency moved into escrow on behalf of this staker's tokens.
    pub wei: Amount,
    pub tokens_refunded: bool,
    pub reputation_refunded: bool,
}

impl StakeRecord {
    fn amount(&self, kind: WeightKind) -> Amount {
        match kind {
            WeightKind::Token => self.tokens,
            WeightKind::Reputation => self.reputation,
        }
    }
}

/// Per-project token and reputation stakes.
#[derive(Debug, Clone, Default)]
pub struct StakeLedger {
    records: HashMap<AccountId, StakeRecord>,
    total_tokens: Amount,
    total_reputation: Amount,
}

/// `round(numerator / denominator)` with ties rounding up.
fn round_half_up(numerator: u128, denominator: u128) -> u128 {
    (2 * numerator + denominator) / (2 * denominator)
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_tokens(&self) -> Amount {
        self.total_tokens
    }

    pub fn total_reputation(&self) -> Amount {
        self.total_reputation
    }

    pub fn record(&self, staker: &AccountId) -> Option<&StakeRecord> {
        self.records.get(staker)
    }

    pub fn stakers(&self) -> impl Iterator<Item = &AccountId> {
        self.records.keys()
    }

    pub fn stake(
        &mut self,
        authority: StakeAuthority,
        staker: AccountId,
        kind: WeightKind,
        amount: Amount,
        wei: Amount,
    ) -> Result<()> {
        if authority.kind() != kind {
            return Err(ProtocolError::Unauthorized(format!(
                "{:?} cannot stake {}",
                authority, kind
            )));
        }
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount("stake must be positive".to_string()));
        }

        let overflow = || ProtocolError::InvalidAmount("stake overflow".to_string());
        let record = self.records.entry(staker).or_default();
        match kind {
            WeightKind::Token => {
                let total = self.total_tokens.checked_add(amount).ok_or_else(overflow)?;
                record.tokens += amount;
                record.wei = record.wei.checked_add(wei).ok_or_else(overflow)?;
                self.total_tokens = total;
            }
            WeightKind::Reputation => {
                let total = self.total_reputation.checked_add(amount).ok_or_else(overflow)?;
                record.reputation += amount;
                self.total_reputation = total;
            }
        }

        debug!(staker = %staker.short(), kind = %kind, amount, wei, "Stake recorded");
        Ok(())
    }

    /// Returns the currency contribution released with the unstaked tokens.
    pub fn unstake(
        &mut self,
        authority: StakeAuthority,
        staker: AccountId,
        kind: WeightKind,
        amount: Amount,
    ) -> Result<Amount> {
        if authority.kind() != kind {
            return Err(ProtocolError::Unauthorized(format!(
                "{:?} cannot unstake {}",
                authority, kind
            )));
        }
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount("unstake must be positive".to_string()));
        }
        let staked = self.records.get(&staker).map(|r| r.amount(kind)).unwrap_or(0);
        if amount > staked {
            return Err(ProtocolError::InsufficientStake {
                requested: amount,
                staked,
            });
        }

        let record = self
            .records
            .get_mut(&staker)
            .ok_or_else(|| ProtocolError::Unauthorized("not a staker".to_string()))?;
        let released = match kind {
            WeightKind::Token => {
                let released = if amount == record.tokens {
                    record.wei
                } else {
                    (record.wei as u128 * amount as u128 / record.tokens as u128) as Amount
                };
                record.tokens -= amount;
                record.wei -= released;
                self.total_tokens -= amount;
                released
            }
            WeightKind::Reputation => {
                record.reputation -= amount;
                self.total_reputation -= amount;
                0
            }
        };
        if record.tokens == 0 && record.reputation == 0 {
            self.records.remove(&staker);
        }

        debug!(staker = %staker.short(), kind = %kind, amount, released, "Stake withdrawn");
        Ok(released)
    }

    pub fn is_staker(&self, id: &AccountId) -> bool {
        self.records
            .get(id)
            .map(|r| r.tokens > 0 || r.reputation > 0)
            .unwrap_or(false)
    }

    /// Combined weighting in percent: the mean of the token and reputation
    /// shares, each rounded to the nearest percent.
    pub fn weight_of(&self, id: &AccountId) -> u64 {
        let Some(record) = self.records.get(id) else {
            return 0;
        };
        let share = |staked: Amount, total: Amount| -> u128 {
            if total == 0 {
                0
            } else {
                round_half_up(staked as u128 * 100, total as u128)
            }
        };
        let token_weighting = share(record.tokens, self.total_tokens);
        let rep_weighting = share(record.reputation, self.total_reputation);
        ((token_weighting + rep_weighting) / 2) as u64
    }

    /// Sum of every staker's weight; about 100 when both kinds are staked.
    pub fn total_weight(&self) -> u64 {
        self.records.keys().map(|id| self.weight_of(id)).sum()
    }

    /// Zero the aggregate counters. Individual balances stay claimable
    /// through [`StakeLedger::take_refund`].
    pub fn clear(&mut self) {
        self.total_tokens = 0;
        self.total_reputation = 0;
    }

    /// Consume a staker's balance of `kind` exactly once.
    pub fn take_refund(&mut self, staker: &AccountId, kind: WeightKind) -> Result<Amount> {
        let record = self
            .records
            .get_mut(staker)
            .ok_or_else(|| ProtocolError::Unauthorized("not a staker".to_string()))?;
        let (amount, refunded) = match kind {
            WeightKind::Token => (&mut record.tokens, &mut record.tokens_refunded),
            WeightKind::Reputation => (&mut record.reputation, &mut record.reputation_refunded),
        };
        if *refunded {
            return Err(ProtocolError::AlreadyClaimed(format!("{} stake refund", kind)));
        }
        if *amount == 0 {
            return Err(ProtocolError::Unauthorized(format!("no {} stake", kind)));
        }

        let refund = *amount;
        *amount = 0;
        *refunded = true;
        match kind {
            WeightKind::Token => {
                record.wei = 0;
                self.total_tokens = self.total_tokens.saturating_sub(refund);
            }
            WeightKind::Reputation => {
                self.total_reputation = self.total_reputation.saturating_sub(refund);
            }
        }
        Ok(refund)
    }
}

use crate::error::{LedgerError, Result};
use crate::types::{AccountId, Amount};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Non-transferable reputation. Balances only move through mint and burn.
#[async_trait]
pub trait ReputationLedger: Send + Sync {
    async fn register(&self, account: AccountId) -> Result<Amount>;

    async fn is_registered(&self, account: AccountId) -> bool;

    async fn balance_of(&self, account: AccountId) -> Amount;

    async fn total_supply(&self) -> Amount;

    async fn mint(&self, account: AccountId, amount: Amount) -> Result<()>;

    async fn burn(&self, account: AccountId, amount: Amount) -> Result<()>;
}

#[derive(Debug, Default)]
struct ReputationState {
    balances: HashMap<AccountId, Amount>,
    supply: Amount,
}

pub struct MemoryReputationLedger {
    state: Arc<RwLock<ReputationState>>,
    initial_grant: Amount,
}

impl MemoryReputationLedger {
    pub fn new(initial_grant: Amount) -> Self {
        Self {
            state: Arc::new(RwLock::new(ReputationState::default())),
            initial_grant,
        }
    }
}

impl Default for MemoryReputationLedger {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl ReputationLedger for MemoryReputationLedger {
    async fn register(&self, account: AccountId) -> Result<Amount> {
        let mut state = self.state.write().await;
        if state.balances.contains_key(&account) {
            return Err(LedgerError::AlreadyRegistered(account.short()));
        }
        state.balances.insert(account, self.initial_grant);
        state.supply = state
            .supply
            .checked_add(self.initial_grant)
            .ok_or_else(|| LedgerError::Overflow("reputation supply".to_string()))?;

        info!(
            account = %account.short(),
            grant = self.initial_grant,
            supply = state.supply,
            "⭐ Reputation account registered"
        );
        Ok(self.initial_grant)
    }

    async fn is_registered(&self, account: AccountId) -> bool {
        self.state.read().await.balances.contains_key(&account)
    }

    async fn balance_of(&self, account: AccountId) -> Amount {
        self.state
            .read()
            .await
            .balances
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    async fn total_supply(&self) -> Amount {
        self.state.read().await.supply
    }

    async fn mint(&self, account: AccountId, amount: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        let new_supply = state
            .supply
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("reputation supply".to_string()))?;
        let balance = state
            .balances
            .get_mut(&account)
            .ok_or_else(|| LedgerError::AccountNotRegistered(account.short()))?;
        *balance += amount;
        state.supply = new_supply;
        debug!(account = %account.short(), amount, "Reputation minted");
        Ok(())
    }

    async fn burn(&self, account: AccountId, amount: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        let balance = state
            .balances
            .get_mut(&account)
            .ok_or_else(|| LedgerError::AccountNotRegistered(account.short()))?;
        if *balance < amount {
            return Err(LedgerError::InsufficientBalance {
                needed: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        state.supply -= amount;
        debug!(account = %account.short(), amount, "Reputation burned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_grants_once() {
        let ledger = MemoryReputationLedger::new(500);
        let alice = AccountId::from_label("alice");

        assert_eq!(ledger.register(alice).await.unwrap(), 500);
        assert!(ledger.register(alice).await.is_err());
        assert_eq!(ledger.balance_of(alice).await, 500);
        assert_eq!(ledger.total_supply().await, 500);
    }

    #[tokio::test]
    async fn test_unregistered_cannot_hold_reputation() {
        let ledger = MemoryReputationLedger::new(500);
        let bob = AccountId::from_label("bob");
        assert!(matches!(
            ledger.mint(bob, 1).await,
            Err(LedgerError::AccountNotRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_burn_then_mint_keeps_supply_consistent() {
        let ledger = MemoryReputationLedger::new(500);
        let alice = AccountId::from_label("alice");
        ledger.register(alice).await.unwrap();

        ledger.burn(alice, 200).await.unwrap();
        assert_eq!(ledger.total_supply().await, 300);
        assert!(ledger.burn(alice, 301).await.is_err());

        ledger.mint(alice, 200).await.unwrap();
        assert_eq!(ledger.balance_of(alice).await, 500);
        assert_eq!(ledger.total_supply().await, 500);
    }
}

use crate::error::{LedgerError, Result};
use crate::types::{AccountId, Amount};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Fungible token backed by a pool of native currency.
///
/// The pool also acts as the general treasury that project escrows draw
/// from and return to.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Mint `tokens` for `account`, paying at most `payment` wei from the
    /// account's currency balance. Returns the new token balance.
    async fn mint(&self, account: AccountId, tokens: Amount, payment: Amount) -> Result<Amount>;

    /// Wei required to mint `tokens` at the current supply.
    async fn mint_cost(&self, tokens: Amount) -> Result<Amount>;

    /// Sell `tokens` back to the pool. Returns the wei refunded.
    async fn burn(&self, account: AccountId, tokens: Amount) -> Result<Amount>;

    /// Remove `tokens` from supply without paying anything out.
    async fn destroy(&self, account: AccountId, tokens: Amount) -> Result<()>;

    async fn transfer(&self, from: AccountId, to: AccountId, amount: Amount) -> Result<()>;

    async fn balance_of(&self, account: AccountId) -> Amount;

    async fn total_supply(&self) -> Amount;

    /// Wei per token.
    async fn current_price(&self) -> Amount;

    async fn pool_balance(&self) -> Amount;

    /// Move wei out of the pool into the caller's custody.
    async fn withdraw_pool(&self, wei: Amount) -> Result<()>;

    async fn deposit_pool(&self, wei: Amount) -> Result<()>;

    /// Credit wei held in custody to an account.
    async fn pay(&self, to: AccountId, wei: Amount) -> Result<()>;

    /// Take back wei credited by [`TokenLedger::pay`].
    async fn reclaim(&self, from: AccountId, wei: Amount) -> Result<()>;

    async fn currency_balance_of(&self, account: AccountId) -> Amount;
}

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<AccountId, Amount>,
    currency: HashMap<AccountId, Amount>,
    supply: Amount,
    pool: Amount,
}

impl TokenState {
    fn price(&self, base_price: Amount) -> Amount {
        if self.supply == 0 {
            base_price
        } else {
            (self.pool / self.supply).max(1)
        }
    }

    fn debit_tokens(&mut self, account: AccountId, amount: Amount) -> Result<()> {
        let balance = self.balances.entry(account).or_insert(0);
        if *balance < amount {
            return Err(LedgerError::InsufficientBalance {
                needed: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(())
    }

    fn credit_tokens(&mut self, account: AccountId, amount: Amount) -> Result<()> {
        let balance = self.balances.entry(account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow("token balance".to_string()))?;
        Ok(())
    }
}

/// In-memory token ledger with a pool-backed price.
///
/// Price is `pool / supply`. Minting charges a premium that grows with the
/// share of supply being minted: `price * (1000 + round(tokens * 1000 /
/// new_supply)) / 1000` per token. Burning pays out `price * tokens`.
pub struct MemoryTokenLedger {
    state: Arc<RwLock<TokenState>>,
    base_price: Amount,
}

impl MemoryTokenLedger {
    pub fn new(base_price: Amount) -> Self {
        Self {
            state: Arc::new(RwLock::new(TokenState::default())),
            base_price: base_price.max(1),
        }
    }

    /// Ledger whose pool holds `pool` wei against `supply` tokens owned by
    /// `holder`.
    pub fn with_genesis(pool: Amount, supply: Amount, holder: AccountId) -> Self {
        let mut state = TokenState {
            supply,
            pool,
            ..Default::default()
        };
        state.balances.insert(holder, supply);
        Self {
            state: Arc::new(RwLock::new(state)),
            base_price: 1,
        }
    }

    /// Credit native currency to an account out of thin air.
    pub async fn fund(&self, account: AccountId, wei: Amount) {
        let mut state = self.state.write().await;
        *state.currency.entry(account).or_insert(0) += wei;
        debug!(account = %account.short(), wei, "Account funded");
    }

    fn cost_for(state: &TokenState, base_price: Amount, tokens: Amount) -> Result<Amount> {
        let new_supply = state
            .supply
            .checked_add(tokens)
            .ok_or_else(|| LedgerError::Overflow("token supply".to_string()))?;
        let price = state.price(base_price) as u128;
        let premium = (2 * tokens as u128 * 1000 + new_supply as u128) / (2 * new_supply as u128);
        let per_token = price * (1000 + premium) / 1000;
        u64::try_from(per_token * tokens as u128)
            .map_err(|_| LedgerError::Overflow("mint cost".to_string()))
    }
}

impl Default for MemoryTokenLedger {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl TokenLedger for MemoryTokenLedger {
    async fn mint(&self, account: AccountId, tokens: Amount, payment: Amount) -> Result<Amount> {
        if tokens == 0 {
            return Err(LedgerError::InvalidAmount("cannot mint zero tokens".to_string()));
        }
        let mut state = self.state.write().await;
        let cost = Self::cost_for(&state, self.base_price, tokens)?;
        if payment < cost {
            return Err(LedgerError::InsufficientBalance {
                needed: cost,
                available: payment,
            });
        }
        let wallet = state.currency.get(&account).copied().unwrap_or(0);
        if wallet < cost {
            return Err(LedgerError::InsufficientBalance {
                needed: cost,
                available: wallet,
            });
        }

        state.currency.insert(account, wallet - cost);
        state.pool += cost;
        state.supply += tokens;
        state.credit_tokens(account, tokens)?;
        let balance = state.balances.get(&account).copied().unwrap_or(0);

        info!(
            account = %account.short(),
            tokens,
            cost,
            supply = state.supply,
            pool = state.pool,
            "🪙 Tokens minted"
        );
        Ok(balance)
    }

    async fn mint_cost(&self, tokens: Amount) -> Result<Amount> {
        let state = self.state.read().await;
        Self::cost_for(&state, self.base_price, tokens)
    }

    async fn burn(&self, account: AccountId, tokens: Amount) -> Result<Amount> {
        if tokens == 0 {
            return Err(LedgerError::InvalidAmount("cannot burn zero tokens".to_string()));
        }
        let mut state = self.state.write().await;
        let refund = state
            .price(self.base_price)
            .checked_mul(tokens)
            .ok_or_else(|| LedgerError::Overflow("burn refund".to_string()))?;
        if state.pool < refund {
            return Err(LedgerError::InsufficientBalance {
                needed: refund,
                available: state.pool,
            });
        }
        state.debit_tokens(account, tokens)?;
        state.supply -= tokens;
        state.pool -= refund;
        *state.currency.entry(account).or_insert(0) += refund;

        info!(
            account = %account.short(),
            tokens,
            refund,
            supply = state.supply,
            "🔥 Tokens burned"
        );
        Ok(refund)
    }

    async fn destroy(&self, account: AccountId, tokens: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        state.debit_tokens(account, tokens)?;
        state.supply -= tokens;
        info!(
            account = %account.short(),
            tokens,
            supply = state.supply,
            "🔥 Tokens destroyed"
        );
        Ok(())
    }

    async fn transfer(&self, from: AccountId, to: AccountId, amount: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        state.debit_tokens(from, amount)?;
        state.credit_tokens(to, amount)?;
        debug!(
            from = %from.short(),
            to = %to.short(),
            amount,
            "Tokens transferred"
        );
        Ok(())
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

    async fn current_price(&self) -> Amount {
        self.state.read().await.price(self.base_price)
    }

    async fn pool_balance(&self) -> Amount {
        self.state.read().await.pool
    }

    async fn withdraw_pool(&self, wei: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        if state.pool < wei {
            return Err(LedgerError::InsufficientBalance {
                needed: wei,
                available: state.pool,
            });
        }
        state.pool -= wei;
        debug!(wei, pool = state.pool, "Pool withdrawal");
        Ok(())
    }

    async fn deposit_pool(&self, wei: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        state.pool = state
            .pool
            .checked_add(wei)
            .ok_or_else(|| LedgerError::Overflow("pool balance".to_string()))?;
        debug!(wei, pool = state.pool, "Pool deposit");
        Ok(())
    }

    async fn pay(&self, to: AccountId, wei: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        let wallet = state.currency.entry(to).or_insert(0);
        *wallet = wallet
            .checked_add(wei)
            .ok_or_else(|| LedgerError::Overflow("currency balance".to_string()))?;
        debug!(to = %to.short(), wei, "Currency paid");
        Ok(())
    }

    async fn reclaim(&self, from: AccountId, wei: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        let wallet = state.currency.entry(from).or_insert(0);
        if *wallet < wei {
            return Err(LedgerError::InsufficientBalance {
                needed: wei,
                available: *wallet,
            });
        }
        *wallet -= wei;
        debug!(from = %from.short(), wei, "Currency reclaimed");
        Ok(())
    }

    async fn currency_balance_of(&self, account: AccountId) -> Amount {
        self.state
            .read()
            .await
            .currency
            .get(&account)
            .copied()
            .unwrap_or(0)
    }
}

//! # In-Memory Lending Pool
//!
//! A Compound-style market: suppliers deposit the collateral asset and
//! receive shares at the current exchange rate; borrowers draw the debt
//! asset from the pool's own liquidity and pay it back later.
//!
//! ```text
//! shares     = underlying * EXCHANGE_RATE_SCALE / exchange_rate
//! underlying = shares * exchange_rate / EXCHANGE_RATE_SCALE
//! ```
//!
//! Both conversions floor, so a round trip never creates value. Pulls from
//! the caller go through the token allowance granted to the pool address,
//! exactly as a real market's `transferFrom` would.
//!
//! ## Failure injection
//!
//! [`InMemoryPool::fail_next`] arms a one-shot failure for a given
//! operation. The armed failure fires before any state is touched and is
//! disarmed when it fires, whether or not the caller later rolls back.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use umbra_protocol::collaborators::{CollaboratorError, LiquidityPool};
use umbra_protocol::config::EXCHANGE_RATE_SCALE;
use umbra_protocol::Address;

use crate::market::Market;

/// Status code returned by an armed failure.
pub const INJECTED_FAILURE_CODE: u32 = 9;

/// Status code for repaying more than is borrowed.
pub const REPAY_EXCEEDS_BORROW_CODE: u32 = 13;

/// Pool entry points, for failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolOperation {
    Deposit,
    Redeem,
    Borrow,
    Repay,
}

impl PoolOperation {
    fn name(self) -> &'static str {
        match self {
            PoolOperation::Deposit => "deposit",
            PoolOperation::Redeem => "redeem",
            PoolOperation::Borrow => "borrow",
            PoolOperation::Repay => "repay",
        }
    }
}

impl fmt::Display for PoolOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static pool parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub address: Address,
    /// Symbol of the asset supplied for shares.
    pub collateral_symbol: String,
    /// Symbol of the asset lent out.
    pub debt_symbol: String,
    /// Initial underlying per share, scaled by `EXCHANGE_RATE_SCALE`.
    pub exchange_rate: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address: Address::from("pool"),
            collateral_symbol: "WETH".into(),
            debt_symbol: "USDC".into(),
            exchange_rate: EXCHANGE_RATE_SCALE,
        }
    }
}

/// Lending market over the shared books.
#[derive(Debug)]
pub struct InMemoryPool {
    market: Market,
    config: PoolConfig,
    armed: Mutex<HashSet<PoolOperation>>,
}

impl InMemoryPool {
    pub fn new(market: &Market, config: PoolConfig) -> Self {
        let rate = config.exchange_rate;
        // A zero rate would make every share conversion divide by zero.
        let rate = if rate == 0 { EXCHANGE_RATE_SCALE } else { rate };
        market.update(|books| books.pool.exchange_rate = rate);
        Self {
            market: market.clone(),
            config,
            armed: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Makes the next call to `operation` fail with a status code.
    pub fn fail_next(&self, operation: PoolOperation) {
        self.armed.lock().insert(operation);
    }

    /// Moves the exchange rate, e.g. to simulate accrued yield.
    pub fn set_exchange_rate(&self, rate: u64) -> Result<(), CollaboratorError> {
        if rate == 0 {
            return Err(CollaboratorError::Status {
                operation: "set_exchange_rate",
                code: 1,
            });
        }
        self.market.update(|books| books.pool.exchange_rate = rate);
        Ok(())
    }

    /// Outstanding borrow of `account`.
    pub fn borrow_balance_of(&self, account: &Address) -> u64 {
        self.market
            .read(|books| books.pool.borrows.get(account).copied().unwrap_or(0))
    }

    pub fn total_shares(&self) -> u64 {
        self.market.read(|books| books.pool.total_shares)
    }

    fn check_armed(&self, operation: PoolOperation) -> Result<(), CollaboratorError> {
        if self.armed.lock().remove(&operation) {
            warn!(pool = %self.config.address, %operation, "injected failure fired");
            return Err(CollaboratorError::Status {
                operation: operation.name(),
                code: INJECTED_FAILURE_CODE,
            });
        }
        Ok(())
    }
}

impl LiquidityPool for InMemoryPool {
    fn address(&self) -> Address {
        self.config.address.clone()
    }

    fn deposit(&self, caller: &Address, amount: u64) -> Result<(), CollaboratorError> {
        self.check_armed(PoolOperation::Deposit)?;
        let pool = &self.config.address;
        let minted = self.market.apply(|books| {
            let rate = books.pool.exchange_rate;
            let shares: u64 = (amount as u128 * EXCHANGE_RATE_SCALE as u128 / rate as u128)
                .try_into()
                .map_err(|_| CollaboratorError::Overflow)?;

            let underlying = books.token_mut(&self.config.collateral_symbol);
            underlying.spend_allowance(caller, pool, amount)?;
            underlying.transfer(caller, pool, amount)?;

            let held = books.pool.shares.entry(caller.clone()).or_insert(0);
            *held = held.checked_add(shares).ok_or(CollaboratorError::Overflow)?;
            books.pool.total_shares = books
                .pool
                .total_shares
                .checked_add(shares)
                .ok_or(CollaboratorError::Overflow)?;
            Ok(shares)
        })?;
        debug!(%caller, amount, shares = minted, "pool deposit");
        Ok(())
    }

    fn redeem(&self, caller: &Address, shares: u64) -> Result<(), CollaboratorError> {
        self.check_armed(PoolOperation::Redeem)?;
        let pool = &self.config.address;
        self.market.apply(|books| {
            let rate = books.pool.exchange_rate;
            let underlying: u64 = (shares as u128 * rate as u128 / EXCHANGE_RATE_SCALE as u128)
                .try_into()
                .map_err(|_| CollaboratorError::Overflow)?;

            let held = books.pool.shares.get(caller).copied().unwrap_or(0);
            let remaining =
                held.checked_sub(shares)
                    .ok_or_else(|| CollaboratorError::InsufficientBalance {
                        account: caller.clone(),
                        available: held,
                        requested: shares,
                    })?;

            let token = books.token_mut(&self.config.collateral_symbol);
            let liquidity = token.balance_of(pool);
            if liquidity < underlying {
                return Err(CollaboratorError::InsufficientLiquidity {
                    available: liquidity,
                    requested: underlying,
                });
            }
            token.transfer(pool, caller, underlying)?;

            books.pool.shares.insert(caller.clone(), remaining);
            books.pool.total_shares = books.pool.total_shares.saturating_sub(shares);
            Ok(())
        })
    }

    fn borrow(&self, caller: &Address, amount: u64) -> Result<(), CollaboratorError> {
        self.check_armed(PoolOperation::Borrow)?;
        let pool = &self.config.address;
        self.market.apply(|books| {
            let token = books.token_mut(&self.config.debt_symbol);
            let liquidity = token.balance_of(pool);
            if liquidity < amount {
                return Err(CollaboratorError::InsufficientLiquidity {
                    available: liquidity,
                    requested: amount,
                });
            }
            token.transfer(pool, caller, amount)?;

            let owed = books.pool.borrows.entry(caller.clone()).or_insert(0);
            *owed = owed.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
            Ok(())
        })
    }

    fn repay(&self, caller: &Address, amount: u64) -> Result<(), CollaboratorError> {
        self.check_armed(PoolOperation::Repay)?;
        let pool = &self.config.address;
        self.market.apply(|books| {
            let owed = books.pool.borrows.get(caller).copied().unwrap_or(0);
            let remaining = owed.checked_sub(amount).ok_or(CollaboratorError::Status {
                operation: "repay",
                code: REPAY_EXCEEDS_BORROW_CODE,
            })?;

            let token = books.token_mut(&self.config.debt_symbol);
            token.spend_allowance(caller, pool, amount)?;
            token.transfer(caller, pool, amount)?;

            books.pool.borrows.insert(caller.clone(), remaining);
            Ok(())
        })
    }

    fn exchange_rate(&self) -> u64 {
        self.market.read(|books| books.pool.exchange_rate)
    }

    fn share_balance_of(&self, account: &Address) -> u64 {
        self.market
            .read(|books| books.pool.shares.get(account).copied().unwrap_or(0))
    }
}

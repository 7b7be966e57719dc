//! In-memory fungible token.
//!
//! A token is a symbol plus a handle to the shared [`Market`]. Two handles
//! with the same symbol on the same market are the same token.

use tracing::trace;

use umbra_protocol::collaborators::{CollaboratorError, FungibleToken};
use umbra_protocol::Address;

use crate::market::Market;

/// Standard fungible-asset semantics over the shared books.
#[derive(Clone, Debug)]
pub struct InMemoryToken {
    market: Market,
    symbol: String,
}

impl InMemoryToken {
    pub fn new(market: &Market, symbol: impl Into<String>) -> Self {
        Self {
            market: market.clone(),
            symbol: symbol.into(),
        }
    }

    /// Creates `amount` new units for `to`. Seeding only.
    pub fn mint(&self, to: &Address, amount: u64) -> Result<(), CollaboratorError> {
        self.market
            .apply(|books| books.token_mut(&self.symbol).mint(to, amount))
    }

    pub fn total_supply(&self) -> u64 {
        self.market
            .read(|books| books.token(&self.symbol).map_or(0, |t| t.total_supply()))
    }
}

impl FungibleToken for InMemoryToken {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn balance_of(&self, account: &Address) -> u64 {
        self.market
            .read(|books| books.token(&self.symbol).map_or(0, |t| t.balance_of(account)))
    }

    fn transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), CollaboratorError> {
        trace!(token = %self.symbol, %from, %to, amount, "transfer");
        self.market
            .apply(|books| books.token_mut(&self.symbol).transfer(from, to, amount))
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), CollaboratorError> {
        trace!(token = %self.symbol, %spender, %from, %to, amount, "transfer_from");
        self.market.apply(|books| {
            let token = books.token_mut(&self.symbol);
            token.spend_allowance(from, spender, amount)?;
            token.transfer(from, to, amount)
        })
    }

    fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), CollaboratorError> {
        self.market.apply(|books| {
            books.token_mut(&self.symbol).approve(owner, spender, amount);
            Ok(())
        })
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.market.read(|books| {
            books
                .token(&self.symbol)
                .map_or(0, |t| t.allowance(owner, spender))
        })
    }
}

//! # Shared Market State
//!
//! Every token and the pool write into one set of [`Books`] behind one lock.
//! That is what makes savepoints possible: a snapshot of the books is a
//! snapshot of every external balance the vault can touch.
//!
//! ## Atomicity
//!
//! - **Per call**: each token or pool operation runs against a scratch copy
//!   of the books and is installed only if it succeeds. A failed call never
//!   leaves a half-applied transfer behind.
//! - **Per settlement**: [`Market`] implements [`Journal`]. Savepoints nest;
//!   rolling back restores the books exactly as they were when the savepoint
//!   was taken and discards every savepoint opened after it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use umbra_protocol::collaborators::{CollaboratorError, Journal, Savepoint};
use umbra_protocol::Address;

// ---------------------------------------------------------------------------
// Books
// ---------------------------------------------------------------------------

/// Balances and allowances of one token.
#[derive(Clone, Debug, Default)]
pub(crate) struct TokenBooks {
    balances: HashMap<Address, u64>,
    /// `(owner, spender) -> remaining allowance`
    allowances: HashMap<(Address, Address), u64>,
    total_supply: u64,
}

impl TokenBooks {
    pub(crate) fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub(crate) fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub(crate) fn mint(&mut self, to: &Address, amount: u64) -> Result<(), CollaboratorError> {
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(CollaboratorError::Overflow)?;
        let balance = self.balances.entry(to.clone()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
        Ok(())
    }

    pub(crate) fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), CollaboratorError> {
        let available = self.balance_of(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| CollaboratorError::InsufficientBalance {
                account: from.clone(),
                available,
                requested: amount,
            })?;
        self.balances.insert(from.clone(), remaining);
        let credited = self.balances.entry(to.clone()).or_insert(0);
        *credited = credited
            .checked_add(amount)
            .ok_or(CollaboratorError::Overflow)?;
        Ok(())
    }

    pub(crate) fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: u64,
    ) -> Result<(), CollaboratorError> {
        let allowed = self.allowance(owner, spender);
        let remaining =
            allowed
                .checked_sub(amount)
                .ok_or_else(|| CollaboratorError::InsufficientAllowance {
                    owner: owner.clone(),
                    spender: spender.clone(),
                    allowed,
                    requested: amount,
                })?;
        self.allowances
            .insert((owner.clone(), spender.clone()), remaining);
        Ok(())
    }

    pub(crate) fn approve(&mut self, owner: &Address, spender: &Address, amount: u64) {
        self.allowances
            .insert((owner.clone(), spender.clone()), amount);
    }
}

/// Pool-side share and borrow positions.
#[derive(Clone, Debug, Default)]
pub(crate) struct PoolBooks {
    pub(crate) shares: HashMap<Address, u64>,
    pub(crate) total_shares: u64,
    pub(crate) borrows: HashMap<Address, u64>,
    pub(crate) exchange_rate: u64,
}

/// Everything external, in one snapshot-able value.
#[derive(Clone, Debug, Default)]
pub(crate) struct Books {
    pub(crate) tokens: HashMap<String, TokenBooks>,
    pub(crate) pool: PoolBooks,
}

impl Books {
    pub(crate) fn token(&self, symbol: &str) -> Option<&TokenBooks> {
        self.tokens.get(symbol)
    }

    pub(crate) fn token_mut(&mut self, symbol: &str) -> &mut TokenBooks {
        self.tokens.entry(symbol.to_string()).or_default()
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MarketInner {
    books: Books,
    savepoints: Vec<(Savepoint, Books)>,
    next_savepoint: u64,
}

/// Shared handle to the books. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct Market {
    inner: Arc<Mutex<MarketInner>>,
}

impl Market {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the books.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Books) -> T) -> T {
        f(&self.inner.lock().books)
    }

    /// Runs `f` on a scratch copy of the books and installs it on success.
    pub(crate) fn apply<T>(
        &self,
        f: impl FnOnce(&mut Books) -> Result<T, CollaboratorError>,
    ) -> Result<T, CollaboratorError> {
        let mut inner = self.inner.lock();
        let mut scratch = inner.books.clone();
        let value = f(&mut scratch)?;
        inner.books = scratch;
        Ok(value)
    }

    /// Infallible write to the books.
    pub(crate) fn update(&self, f: impl FnOnce(&mut Books)) {
        f(&mut self.inner.lock().books);
    }

    /// Savepoints currently open.
    pub fn open_savepoints(&self) -> usize {
        self.inner.lock().savepoints.len()
    }
}

impl Journal for Market {
    fn savepoint(&self) -> Savepoint {
        let mut inner = self.inner.lock();
        inner.next_savepoint += 1;
        let savepoint = Savepoint(inner.next_savepoint);
        let snapshot = inner.books.clone();
        inner.savepoints.push((savepoint, snapshot));
        debug!(savepoint = savepoint.0, depth = inner.savepoints.len(), "savepoint opened");
        savepoint
    }

    fn rollback_to(&self, savepoint: Savepoint) {
        let mut inner = self.inner.lock();
        match inner.savepoints.iter().position(|(sp, _)| *sp == savepoint) {
            Some(idx) => {
                let (_, snapshot) = inner.savepoints.swap_remove(idx);
                inner.savepoints.truncate(idx);
                inner.books = snapshot;
                debug!(savepoint = savepoint.0, "rolled back");
            }
            None => warn!(savepoint = savepoint.0, "rollback to unknown savepoint ignored"),
        }
    }

    fn release(&self, savepoint: Savepoint) {
        let mut inner = self.inner.lock();
        match inner.savepoints.iter().position(|(sp, _)| *sp == savepoint) {
            Some(idx) => inner.savepoints.truncate(idx),
            None => warn!(savepoint = savepoint.0, "release of unknown savepoint ignored"),
        }
    }
}

//! # External Collaborators
//!
//! The vault keeps the books; it does not custody anything itself. Real
//! asset movement is delegated to a fungible token standard and a lending
//! pool, and plaintext is obtained from an asynchronous decryption oracle.
//! This module defines those seams as traits. The vault only ever talks to
//! them through [`Collaborators`].
//!
//! ## Failure model
//!
//! Every collaborator call returns a `Result`. The vault checks every one
//! and aborts the whole settlement on the first failure. To make that abort
//! all-or-nothing across external state as well as its own, the vault opens
//! a [`Journal`] savepoint before the first external call and rolls back to
//! it on failure.
//!
//! ## Pool accounting
//!
//! Pools may mint shares at a non-unit exchange rate. The vault never trusts
//! a return value for share or underlying accounting: it reads balances
//! before and after `deposit`/`redeem` and books the observed delta.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::fhe::EncryptedU64;
use crate::vault::pending::CorrelationId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a token or pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The account does not hold enough of the asset.
    #[error("insufficient balance: {account} holds {available}, needs {requested}")]
    InsufficientBalance {
        /// Account being debited.
        account: Address,
        /// Its balance.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// The spender's allowance is too small.
    #[error("insufficient allowance: {spender} may move {allowed} of {owner}'s funds, needs {requested}")]
    InsufficientAllowance {
        /// Account whose funds are being pulled.
        owner: Address,
        /// Account pulling them.
        spender: Address,
        /// Current allowance.
        allowed: u64,
        /// Amount requested.
        requested: u64,
    },

    /// The pool cannot lend or redeem this much right now.
    #[error("insufficient liquidity: {available} available, {requested} requested")]
    InsufficientLiquidity {
        /// Liquidity on hand.
        available: u64,
        /// Amount requested.
        requested: u64,
    },

    /// The collaborator returned a non-zero status code.
    #[error("{operation} returned error code {code}")]
    Status {
        /// Which call failed.
        operation: &'static str,
        /// The status code.
        code: u32,
    },

    /// A collaborator-side counter overflowed.
    #[error("collaborator arithmetic overflow")]
    Overflow,
}

/// Failure reported by the decryption oracle at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The oracle is not accepting requests.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// The oracle refused this particular request.
    #[error("oracle rejected request: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Standard fungible-asset semantics.
pub trait FungibleToken: Send + Sync {
    /// Ticker, for logs.
    fn symbol(&self) -> &str;

    /// Balance held by `account`.
    fn balance_of(&self, account: &Address) -> u64;

    /// Moves `amount` from `from` to `to`. `from` is the caller.
    fn transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), CollaboratorError>;

    /// Moves `amount` from `from` to `to` using `spender`'s allowance.
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), CollaboratorError>;

    /// Sets `spender`'s allowance over `owner`'s funds to `amount`.
    fn approve(&self, owner: &Address, spender: &Address, amount: u64)
        -> Result<(), CollaboratorError>;

    /// Current allowance of `spender` over `owner`'s funds.
    fn allowance(&self, owner: &Address, spender: &Address) -> u64;
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Lending market that custodies collateral and lends the debt asset.
///
/// `caller` is always the vault. Deposits and repayments are pulled from the
/// caller through the token allowance it granted to [`address`](Self::address).
pub trait LiquidityPool: Send + Sync {
    /// The pool's own principal (the spender the vault must approve).
    fn address(&self) -> Address;

    /// Supplies `amount` of collateral underlying and mints shares to `caller`.
    fn deposit(&self, caller: &Address, amount: u64) -> Result<(), CollaboratorError>;

    /// Burns `shares` from `caller` and returns the underlying to it.
    fn redeem(&self, caller: &Address, shares: u64) -> Result<(), CollaboratorError>;

    /// Lends `amount` of the debt asset to `caller`.
    fn borrow(&self, caller: &Address, amount: u64) -> Result<(), CollaboratorError>;

    /// Pays back `amount` of `caller`'s borrow.
    fn repay(&self, caller: &Address, amount: u64) -> Result<(), CollaboratorError>;

    /// Underlying per share, scaled by [`crate::config::EXCHANGE_RATE_SCALE`].
    fn exchange_rate(&self) -> u64;

    /// Shares held by `account`.
    fn share_balance_of(&self, account: &Address) -> u64;
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Marker returned by [`Journal::savepoint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Savepoint(pub u64);

/// Transactional boundary over external state.
///
/// Savepoints nest. Rolling back restores every token and pool balance to
/// what it was when the savepoint was taken; releasing discards it.
pub trait Journal: Send + Sync {
    /// Opens a savepoint.
    fn savepoint(&self) -> Savepoint;
    /// Undoes everything since `savepoint` and discards it.
    fn rollback_to(&self, savepoint: Savepoint);
    /// Keeps everything since `savepoint` and discards it.
    fn release(&self, savepoint: Savepoint);
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// What the vault hands to the oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecryptionRequest {
    /// Token the oracle must echo back in its callback.
    pub correlation_id: CorrelationId,
    /// The ciphertext to decrypt. Its ACL must list the oracle.
    pub ciphertext: EncryptedU64,
    /// Advisory answer-by time.
    pub deadline: DateTime<Utc>,
}

/// Asynchronous decryption service.
///
/// Accepting a request must not block on decryption. The oracle later calls
/// [`crate::vault::Vault::resolve`] with the request's correlation id and the
/// plaintext.
pub trait DecryptionOracle: Send + Sync {
    /// Queues a decryption.
    fn request_decryption(&self, request: DecryptionRequest) -> Result<(), OracleError>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Everything the vault needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    /// Asset deposited as collateral.
    pub collateral_token: Arc<dyn FungibleToken>,
    /// Asset borrowed and repaid.
    pub debt_token: Arc<dyn FungibleToken>,
    /// The lending market.
    pub pool: Arc<dyn LiquidityPool>,
    /// Transaction boundary over the tokens and the pool.
    pub journal: Arc<dyn Journal>,
    /// The decryption service.
    pub oracle: Arc<dyn DecryptionOracle>,
}

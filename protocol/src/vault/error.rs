//! Error types for the vault.
//!
//! Every fallible vault entry point returns a [`VaultError`]. Per-participant
//! health failures are deliberately *not* represented here: an unhealthy
//! request resolves to an amount of zero and settles as a no-op.

use thiserror::Error;

use crate::address::Address;
use crate::collaborators::{CollaboratorError, OracleError};
use crate::fhe::FheError;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Deposits and repayments must move a positive amount.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Settling this amount would push the vault past its LTV ceiling.
    #[error("solvency violation: debt {debt} against collateral worth {collateral_value}")]
    SolvencyViolation {
        /// Candidate aggregate collateral value in debt units.
        collateral_value: u128,
        /// Candidate aggregate debt.
        debt: u64,
    },

    /// The pool refused to mint shares for a deposit.
    #[error("pool mint failed: {0}")]
    MintFailed(#[source] CollaboratorError),

    /// The pool refused to redeem shares for a withdrawal.
    #[error("pool redeem failed: {0}")]
    RedeemFailed(#[source] CollaboratorError),

    /// The pool refused to lend for a borrow.
    #[error("pool borrow failed: {0}")]
    BorrowFailed(#[source] CollaboratorError),

    /// The pool refused a repayment.
    #[error("pool repay failed: {0}")]
    RepayFailed(#[source] CollaboratorError),

    /// A token transfer, pull or approval failed.
    #[error("token transfer failed: {0}")]
    TransferFailed(#[source] CollaboratorError),

    /// The pool accepted a deposit but no shares arrived.
    #[error("deposit of {amount} minted no shares")]
    NothingMinted {
        /// The deposited underlying amount.
        amount: u64,
    },

    /// The vault is paused.
    #[error("vault is currently paused")]
    Paused,

    /// The caller is not the vault owner.
    #[error("unauthorized: {0} is not the owner")]
    Unauthorized(Address),

    /// A settlement callback arrived from someone other than the oracle.
    #[error("unauthorized callback")]
    NotOracle,

    /// The decryption oracle refused the request.
    #[error("decryption request failed: {0}")]
    Oracle(#[from] OracleError),

    /// A homomorphic operation failed.
    #[error("encrypted operation failed: {0}")]
    Fhe(#[from] FheError),

    /// A plaintext counter or scaling product left its range.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// A settled amount exceeds the aggregate it is drawn from.
    #[error("ledger underflow: {ledger} total {total} cannot cover {amount}")]
    LedgerUnderflow {
        /// Which aggregate counter.
        ledger: &'static str,
        /// Its current value.
        total: u64,
        /// The amount being removed.
        amount: u64,
    },

    /// More collateral than the encrypted valuation can represent.
    #[error("collateral total {total} exceeds encrypted valuation capacity {capacity}")]
    CapacityExceeded {
        /// Candidate aggregate share count.
        total: u64,
        /// Largest share count the gate can value at the current rate.
        capacity: u64,
    },

    /// The supplied configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VaultError {
    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::ZeroAmount => "zero_amount",
            VaultError::SolvencyViolation { .. } => "solvency_violation",
            VaultError::MintFailed(_) => "mint_failed",
            VaultError::RedeemFailed(_) => "redeem_failed",
            VaultError::BorrowFailed(_) => "borrow_failed",
            VaultError::RepayFailed(_) => "repay_failed",
            VaultError::TransferFailed(_) => "transfer_failed",
            VaultError::NothingMinted { .. } => "nothing_minted",
            VaultError::Paused => "paused",
            VaultError::Unauthorized(_) => "unauthorized",
            VaultError::NotOracle => "not_oracle",
            VaultError::Oracle(_) => "oracle",
            VaultError::Fhe(_) => "fhe",
            VaultError::Overflow(_) => "overflow",
            VaultError::LedgerUnderflow { .. } => "ledger_underflow",
            VaultError::CapacityExceeded { .. } => "capacity_exceeded",
            VaultError::InvalidConfig(_) => "invalid_config",
        }
    }
}

//! Settlement notifications.
//!
//! Every accepted request and every settled operation appends one
//! [`VaultEvent`] to the vault's log. Rejections (a decrypted amount of zero)
//! append nothing, so the log never distinguishes "unhealthy" from "asked
//! for zero". Request events carry no amount: at that point the amount only
//! exists as a ciphertext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::vault::pending::{CorrelationId, OperationKind};

/// Something observable happened to the vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VaultEvent {
    Deposited {
        participant: Address,
        /// Underlying pulled from the participant.
        amount: u64,
        /// Pool shares credited.
        shares: u64,
        at: DateTime<Utc>,
    },
    BorrowRequested {
        participant: Address,
        correlation_id: CorrelationId,
        at: DateTime<Utc>,
    },
    WithdrawRequested {
        participant: Address,
        correlation_id: CorrelationId,
        at: DateTime<Utc>,
    },
    RepayRequested {
        participant: Address,
        correlation_id: CorrelationId,
        at: DateTime<Utc>,
    },
    Borrowed {
        participant: Address,
        correlation_id: CorrelationId,
        amount: u64,
        at: DateTime<Utc>,
    },
    Withdrawn {
        participant: Address,
        correlation_id: CorrelationId,
        /// Pool shares debited.
        shares: u64,
        /// Underlying paid out.
        underlying: u64,
        at: DateTime<Utc>,
    },
    Repaid {
        participant: Address,
        correlation_id: CorrelationId,
        /// Debt actually burned.
        burned: u64,
        /// Declared amount that was never collected.
        excess_returned: u64,
        at: DateTime<Utc>,
    },
    Paused {
        by: Address,
        at: DateTime<Utc>,
    },
    Unpaused {
        by: Address,
        at: DateTime<Utc>,
    },
    OwnershipTransferred {
        previous: Address,
        new_owner: Address,
        at: DateTime<Utc>,
    },
}

impl VaultEvent {
    /// Request event for a freshly registered pending operation.
    pub fn requested(
        kind: OperationKind,
        participant: Address,
        correlation_id: CorrelationId,
        at: DateTime<Utc>,
    ) -> Self {
        match kind {
            OperationKind::Borrow => VaultEvent::BorrowRequested {
                participant,
                correlation_id,
                at,
            },
            OperationKind::Withdraw => VaultEvent::WithdrawRequested {
                participant,
                correlation_id,
                at,
            },
            OperationKind::Repay => VaultEvent::RepayRequested {
                participant,
                correlation_id,
                at,
            },
        }
    }

    /// Snake-case tag, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::Deposited { .. } => "deposited",
            VaultEvent::BorrowRequested { .. } => "borrow_requested",
            VaultEvent::WithdrawRequested { .. } => "withdraw_requested",
            VaultEvent::RepayRequested { .. } => "repay_requested",
            VaultEvent::Borrowed { .. } => "borrowed",
            VaultEvent::Withdrawn { .. } => "withdrawn",
            VaultEvent::Repaid { .. } => "repaid",
            VaultEvent::Paused { .. } => "paused",
            VaultEvent::Unpaused { .. } => "unpaused",
            VaultEvent::OwnershipTransferred { .. } => "ownership_transferred",
        }
    }
}

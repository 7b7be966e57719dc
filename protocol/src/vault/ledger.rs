//! Aggregate solvency ledger.
//!
//! Two plaintext counters: total pool shares held as collateral and total
//! debt-asset units owed. They move only at settlement, by exactly the
//! amount the oracle revealed, so they always equal the sum of the settled
//! per-participant balances. Vault-wide solvency is checked against these
//! and nothing else.
//!
//! All transitions are pure: they return a candidate ledger and leave
//! `self` alone. The settlement installs the candidate only after every
//! external call has succeeded.

use serde::{Deserialize, Serialize};

use crate::config::HealthPolicy;
use crate::vault::error::VaultError;

/// Plaintext running totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateLedger {
    /// Pool shares held on behalf of all participants.
    pub total_collateral: u64,
    /// Debt-asset units owed by all participants.
    pub total_debt: u64,
}

impl AggregateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collateral_added(self, amount: u64) -> Result<Self, VaultError> {
        let total_collateral = self
            .total_collateral
            .checked_add(amount)
            .ok_or(VaultError::Overflow("aggregate collateral"))?;
        Ok(Self {
            total_collateral,
            ..self
        })
    }

    pub fn with_collateral_removed(self, amount: u64) -> Result<Self, VaultError> {
        let total_collateral =
            self.total_collateral
                .checked_sub(amount)
                .ok_or(VaultError::LedgerUnderflow {
                    ledger: "collateral",
                    total: self.total_collateral,
                    amount,
                })?;
        Ok(Self {
            total_collateral,
            ..self
        })
    }

    pub fn with_debt_added(self, amount: u64) -> Result<Self, VaultError> {
        let total_debt = self
            .total_debt
            .checked_add(amount)
            .ok_or(VaultError::Overflow("aggregate debt"))?;
        Ok(Self { total_debt, ..self })
    }

    pub fn with_debt_removed(self, amount: u64) -> Result<Self, VaultError> {
        let total_debt = self
            .total_debt
            .checked_sub(amount)
            .ok_or(VaultError::LedgerUnderflow {
                ledger: "debt",
                total: self.total_debt,
                amount,
            })?;
        Ok(Self { total_debt, ..self })
    }

    /// Plaintext value of the aggregate collateral in debt units.
    pub fn collateral_value(
        &self,
        policy: &HealthPolicy,
        exchange_rate: u64,
    ) -> Result<u128, VaultError> {
        policy
            .collateral_value(self.total_collateral, exchange_rate)
            .ok_or(VaultError::Overflow("aggregate collateral valuation"))
    }

    /// Fails with [`VaultError::SolvencyViolation`] if these totals breach
    /// the vault LTV ceiling.
    pub fn check_vault_healthy(
        &self,
        policy: &HealthPolicy,
        exchange_rate: u64,
    ) -> Result<(), VaultError> {
        check_vault_healthy(policy, self.total_collateral, self.total_debt, exchange_rate)
    }
}

/// `value(total_collateral) * max_vault_ltv_bp >= total_debt * BASIS_POINTS`,
/// or a solvency violation.
pub fn check_vault_healthy(
    policy: &HealthPolicy,
    total_collateral: u64,
    total_debt: u64,
    exchange_rate: u64,
) -> Result<(), VaultError> {
    let collateral_value = policy
        .collateral_value(total_collateral, exchange_rate)
        .ok_or(VaultError::Overflow("aggregate collateral valuation"))?;
    let healthy = policy
        .is_vault_healthy(collateral_value, total_debt)
        .ok_or(VaultError::Overflow("vault health product"))?;
    if healthy {
        Ok(())
    } else {
        Err(VaultError::SolvencyViolation {
            collateral_value,
            debt: total_debt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EXCHANGE_RATE_SCALE;

    #[test]
    fn transitions_do_not_mutate_source() {
        let base = AggregateLedger::new();
        let next = base.with_collateral_added(5).unwrap();
        assert_eq!(base.total_collateral, 0);
        assert_eq!(next.total_collateral, 5);
    }

    #[test]
    fn removal_below_zero_is_an_underflow() {
        let ledger = AggregateLedger::new().with_debt_added(10).unwrap();
        let err = ledger.with_debt_removed(11).unwrap_err();
        assert!(matches!(
            err,
            VaultError::LedgerUnderflow {
                ledger: "debt",
                total: 10,
                amount: 11
            }
        ));
    }

    #[test]
    fn addition_overflow_detected() {
        let ledger = AggregateLedger {
            total_collateral: u64::MAX,
            total_debt: 0,
        };
        assert!(matches!(
            ledger.with_collateral_added(1),
            Err(VaultError::Overflow(_))
        ));
    }

    #[test]
    fn exactly_at_ltv_is_healthy() {
        let policy = HealthPolicy::default();
        let ledger = AggregateLedger {
            total_collateral: 5,
            total_debt: 12_000,
        };
        assert!(ledger.check_vault_healthy(&policy, EXCHANGE_RATE_SCALE).is_ok());
    }

    #[test]
    fn one_unit_past_ltv_is_a_violation() {
        let policy = HealthPolicy::default();
        let err = check_vault_healthy(&policy, 5, 12_001, EXCHANGE_RATE_SCALE).unwrap_err();
        match err {
            VaultError::SolvencyViolation {
                collateral_value,
                debt,
            } => {
                assert_eq!(collateral_value, 15_000);
                assert_eq!(debt, 12_001);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_vault_is_healthy() {
        let policy = HealthPolicy::default();
        assert!(AggregateLedger::new()
            .check_vault_healthy(&policy, EXCHANGE_RATE_SCALE)
            .is_ok());
    }

    #[test]
    fn exchange_rate_feeds_valuation() {
        let policy = HealthPolicy::default();
        let ledger = AggregateLedger {
            total_collateral: 10,
            total_debt: 0,
        };
        // Half a unit per share: 10 shares are worth 5 * 3000.
        assert_eq!(
            ledger
                .collateral_value(&policy, EXCHANGE_RATE_SCALE / 2)
                .unwrap(),
            15_000
        );
    }
}

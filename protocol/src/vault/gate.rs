//! # Encrypted Health Gate
//!
//! Per-participant solvency is a private property. The gate evaluates it
//! homomorphically and never produces a plaintext verdict: instead of
//! rejecting an unhealthy request, it replaces the requested amount with an
//! encrypted zero. The oracle later decrypts whatever came out of the gate,
//! and a zero settles as a no-op. Nobody watching can tell "unhealthy" from
//! "asked for nothing".
//!
//! ```text
//! value     = shares * (rate * price * debt_unit) / (SCALE * collateral_unit)
//! max_debt  = value * BASIS_POINTS / min_health_factor_bp
//! healthy   = max_debt >= debt
//! approved  = healthy ? requested : 0
//! ```
//!
//! The multiplication chain is folded into one scalar numerator and one
//! scalar denominator, so the encrypted path applies exactly one multiply
//! followed by exactly one divide, matching the plaintext ledger's rounding.

use crate::config::{HealthPolicy, BASIS_POINTS};
use crate::fhe::{EncryptedBool, EncryptedU64, Evaluator};
use crate::vault::error::VaultError;

/// Homomorphic solvency checks for one evaluator and policy.
#[derive(Clone, Copy, Debug)]
pub struct HealthGate<'a> {
    fhe: &'a Evaluator,
    policy: &'a HealthPolicy,
}

impl<'a> HealthGate<'a> {
    pub fn new(fhe: &'a Evaluator, policy: &'a HealthPolicy) -> Self {
        Self { fhe, policy }
    }

    /// Encrypted value of `shares` in debt units at `exchange_rate`.
    pub fn collateral_value(
        &self,
        shares: &EncryptedU64,
        exchange_rate: u64,
    ) -> Result<EncryptedU64, VaultError> {
        let (numerator, denominator) = self
            .policy
            .valuation_factors(exchange_rate)
            .ok_or(VaultError::Overflow("collateral valuation factors"))?;
        let scaled = self.fhe.mul_scalar(shares, numerator)?;
        Ok(self.fhe.div_scalar(&scaled, denominator)?)
    }

    /// Encrypted `collateral_value * BASIS_POINTS / min_health_factor_bp >= debt_value`.
    pub fn user_is_healthy(
        &self,
        collateral_value: &EncryptedU64,
        debt_value: &EncryptedU64,
    ) -> Result<EncryptedBool, VaultError> {
        let scaled = self.fhe.mul_scalar(collateral_value, BASIS_POINTS)?;
        let max_allowed_debt = self
            .fhe
            .div_scalar(&scaled, self.policy.min_health_factor_bp)?;
        Ok(self.fhe.ge(&max_allowed_debt, debt_value)?)
    }

    /// `requested` if `healthy`, else an encrypted zero.
    pub fn gate(
        &self,
        healthy: &EncryptedBool,
        requested: &EncryptedU64,
    ) -> Result<EncryptedU64, VaultError> {
        let zero = self.fhe.zero();
        Ok(self.fhe.select(healthy, requested, &zero)?)
    }

    /// Encrypted `min(requested, ceiling)`.
    pub fn clamp(
        &self,
        requested: &EncryptedU64,
        ceiling: &EncryptedU64,
    ) -> Result<EncryptedU64, VaultError> {
        Ok(self.fhe.min(requested, ceiling)?)
    }

    /// Encrypted `requested <= available`.
    pub fn covers(
        &self,
        requested: &EncryptedU64,
        available: &EncryptedU64,
    ) -> Result<EncryptedBool, VaultError> {
        Ok(self.fhe.le(requested, available)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::address::Address;
    use crate::config::EXCHANGE_RATE_SCALE;
    use crate::fhe::clear::ClearBackend;

    fn fhe() -> Evaluator {
        Evaluator::new(Arc::new(ClearBackend::new()), Address::from("vault"))
    }

    fn reveal(fhe: &Evaluator, v: &EncryptedU64) -> u64 {
        fhe.decrypt_as(fhe.principal(), v).unwrap()
    }

    #[test]
    fn encrypted_valuation_matches_plaintext() {
        let fhe = fhe();
        let policy = HealthPolicy::default();
        let gate = HealthGate::new(&fhe, &policy);
        for (shares, rate) in [(5, EXCHANGE_RATE_SCALE), (7, 1_020_000), (3, 333_333)] {
            let enc = gate.collateral_value(&fhe.constant(shares), rate).unwrap();
            let plain = policy.collateral_value(shares, rate).unwrap();
            assert_eq!(reveal(&fhe, &enc) as u128, plain, "shares={shares} rate={rate}");
        }
    }

    #[test]
    fn healthy_request_passes_through() {
        let fhe = fhe();
        let policy = HealthPolicy::default();
        let gate = HealthGate::new(&fhe, &policy);

        let value = fhe.constant(15_000);
        let debt = fhe.constant(100);
        let healthy = gate.user_is_healthy(&value, &debt).unwrap();
        let approved = gate.gate(&healthy, &fhe.constant(100)).unwrap();
        assert_eq!(reveal(&fhe, &approved), 100);
    }

    #[test]
    fn unhealthy_request_becomes_zero() {
        let fhe = fhe();
        let policy = HealthPolicy::default();
        let gate = HealthGate::new(&fhe, &policy);

        let value = fhe.constant(15_000);
        let debt = fhe.constant(15_001);
        let healthy = gate.user_is_healthy(&value, &debt).unwrap();
        let approved = gate.gate(&healthy, &fhe.constant(15_001)).unwrap();
        assert_eq!(reveal(&fhe, &approved), 0);
    }

    #[test]
    fn health_factor_scales_ceiling() {
        let fhe = fhe();
        let policy = HealthPolicy::default().with_min_health_factor(12_500);
        let gate = HealthGate::new(&fhe, &policy);

        let value = fhe.constant(15_000);
        let at_limit = gate.user_is_healthy(&value, &fhe.constant(12_000)).unwrap();
        let over = gate.user_is_healthy(&value, &fhe.constant(12_001)).unwrap();
        let backend = fhe.backend();
        assert_eq!(backend.reveal(&at_limit.handle()).unwrap(), 1);
        assert_eq!(backend.reveal(&over.handle()).unwrap(), 0);
    }

    #[test]
    fn clamp_never_exceeds_ceiling() {
        let fhe = fhe();
        let policy = HealthPolicy::default();
        let gate = HealthGate::new(&fhe, &policy);
        let clamped = gate.clamp(&fhe.constant(600), &fhe.constant(500)).unwrap();
        assert_eq!(reveal(&fhe, &clamped), 500);
        let under = gate.clamp(&fhe.constant(50), &fhe.constant(500)).unwrap();
        assert_eq!(reveal(&fhe, &under), 50);
    }

    #[test]
    fn gate_output_is_vault_scoped() {
        let fhe = fhe();
        let policy = HealthPolicy::default();
        let gate = HealthGate::new(&fhe, &policy);
        let healthy = gate.covers(&fhe.constant(1), &fhe.constant(2)).unwrap();
        let out = gate.gate(&healthy, &fhe.constant(1)).unwrap();
        assert!(fhe.decrypt_as(&Address::from("alice"), &out).is_err());
    }
}

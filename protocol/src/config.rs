//! # Vault Configuration & Constants
//!
//! Every magic number in the vault lives here. Solvency math is the one
//! place where a stray constant moves real money across a threshold, so the
//! scaling factors and the order in which they are applied are defined once
//! and reused by both the plaintext ledger and the encrypted gate.
//!
//! ## Valuation
//!
//! Collateral is held as liquidity-pool shares; debt is held in underlying
//! debt-asset units. Converting one into the other is always done as a
//! single multiply chain followed by a single division:
//!
//! ```text
//! value = shares * exchange_rate * collateral_price * debt_unit
//!         / (EXCHANGE_RATE_SCALE * collateral_unit)
//! ```
//!
//! Reordering these terms changes the rounding direction, and a rounding
//! change of one unit is enough to flip a borrow that sits exactly on the
//! LTV line. Don't.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::vault::VaultError;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Crate/protocol version reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Ratio Scaling
// ---------------------------------------------------------------------------

/// One whole, expressed in basis points. 10_000 bp = 100.00%.
pub const BASIS_POINTS: u64 = 10_000;

/// Fixed-point scale of the pool exchange rate (underlying per share).
/// A rate of `EXCHANGE_RATE_SCALE` means one share redeems for one unit.
pub const EXCHANGE_RATE_SCALE: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Default Health Policy
// ---------------------------------------------------------------------------

/// Vault-wide maximum loan-to-value: 80%.
pub const DEFAULT_MAX_VAULT_LTV_BP: u64 = 8_000;

/// Minimum per-participant health factor: 1.00.
///
/// The per-participant gate is deliberately looser than the vault LTV. The
/// aggregate check at settlement time is the binding constraint.
pub const DEFAULT_MIN_HEALTH_FACTOR_BP: u64 = 10_000;

/// Debt units paid for one whole collateral unit.
pub const DEFAULT_COLLATERAL_PRICE: u64 = 3_000;

/// Base units per whole collateral unit.
pub const DEFAULT_COLLATERAL_UNIT: u64 = 1;

/// Base units per whole debt unit.
pub const DEFAULT_DEBT_UNIT: u64 = 1;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// How long the oracle is given to answer a decryption request. Advisory
/// only: the vault records the deadline but never expires an entry itself.
pub const DEFAULT_DECRYPTION_DEADLINE: Duration = Duration::from_secs(3_600);

// ---------------------------------------------------------------------------
// HealthPolicy
// ---------------------------------------------------------------------------

/// Solvency thresholds and unit conversion factors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Vault-wide maximum LTV in basis points.
    pub max_vault_ltv_bp: u64,
    /// Minimum per-participant health factor in basis points.
    pub min_health_factor_bp: u64,
    /// Debt units per whole collateral unit.
    pub collateral_price: u64,
    /// Base units per whole collateral unit (`10^decimals`).
    pub collateral_unit: u64,
    /// Base units per whole debt unit (`10^decimals`).
    pub debt_unit: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_vault_ltv_bp: DEFAULT_MAX_VAULT_LTV_BP,
            min_health_factor_bp: DEFAULT_MIN_HEALTH_FACTOR_BP,
            collateral_price: DEFAULT_COLLATERAL_PRICE,
            collateral_unit: DEFAULT_COLLATERAL_UNIT,
            debt_unit: DEFAULT_DEBT_UNIT,
        }
    }
}

impl HealthPolicy {
    /// Builder: set the vault-wide LTV ceiling.
    pub fn with_max_vault_ltv(mut self, bp: u64) -> Self {
        self.max_vault_ltv_bp = bp;
        self
    }

    /// Builder: set the per-participant health factor floor.
    pub fn with_min_health_factor(mut self, bp: u64) -> Self {
        self.min_health_factor_bp = bp;
        self
    }

    /// Builder: set the collateral price in debt units.
    pub fn with_collateral_price(mut self, price: u64) -> Self {
        self.collateral_price = price;
        self
    }

    /// Builder: set the decimal scaling of both assets.
    pub fn with_units(mut self, collateral_unit: u64, debt_unit: u64) -> Self {
        self.collateral_unit = collateral_unit;
        self.debt_unit = debt_unit;
        self
    }

    /// Rejects policies that would divide by zero or allow LTV above 100%.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.max_vault_ltv_bp == 0 || self.max_vault_ltv_bp > BASIS_POINTS {
            return Err(VaultError::InvalidConfig(format!(
                "max_vault_ltv_bp must be in 1..={}, got {}",
                BASIS_POINTS, self.max_vault_ltv_bp
            )));
        }
        if self.min_health_factor_bp == 0 {
            return Err(VaultError::InvalidConfig(
                "min_health_factor_bp must be positive".into(),
            ));
        }
        if self.collateral_price == 0 || self.collateral_unit == 0 || self.debt_unit == 0 {
            return Err(VaultError::InvalidConfig(
                "price and unit scaling factors must be positive".into(),
            ));
        }
        // The encrypted gate must at least be able to value one whole
        // collateral unit at the nominal exchange rate.
        match self.encrypted_share_capacity(EXCHANGE_RATE_SCALE) {
            Some(capacity) if capacity >= self.collateral_unit => Ok(()),
            _ => Err(VaultError::InvalidConfig(format!(
                "price {} with units {}/{} exceeds the 64-bit encrypted valuation range",
                self.collateral_price, self.collateral_unit, self.debt_unit
            ))),
        }
    }

    /// Numerator and denominator of the share-to-debt-value conversion at
    /// the given exchange rate, for use on encrypted operands.
    ///
    /// The fraction is reduced to lowest terms first. Encrypted integers are
    /// 64-bit, so both reduced factors must fit in a `u64`.
    pub fn valuation_factors(&self, exchange_rate: u64) -> Option<(u64, u64)> {
        let numerator = (exchange_rate as u128)
            .checked_mul(self.collateral_price as u128)?
            .checked_mul(self.debt_unit as u128)?;
        let denominator = (EXCHANGE_RATE_SCALE as u128).checked_mul(self.collateral_unit as u128)?;
        let divisor = gcd(numerator, denominator).max(1);
        Some((
            u64::try_from(numerator / divisor).ok()?,
            u64::try_from(denominator / divisor).ok()?,
        ))
    }

    /// Largest share count the encrypted gate can value at `exchange_rate`
    /// without wrapping.
    ///
    /// Two products must stay within 64 bits: `shares * numerator` in the
    /// valuation, and `value * BASIS_POINTS` in the health check. `None`
    /// when the factors themselves do not fit.
    pub fn encrypted_share_capacity(&self, exchange_rate: u64) -> Option<u64> {
        let (numerator, denominator) = self.valuation_factors(exchange_rate)?;
        if numerator == 0 {
            return Some(u64::MAX);
        }
        let product_bound = u64::MAX / numerator;
        let max_value = (u64::MAX / BASIS_POINTS) as u128;
        let value_bound = max_value * denominator as u128 / numerator as u128;
        Some(product_bound.min(u64::try_from(value_bound).unwrap_or(u64::MAX)))
    }

    /// Plaintext value of `shares` in debt units.
    pub fn collateral_value(&self, shares: u64, exchange_rate: u64) -> Option<u128> {
        let numerator = (shares as u128)
            .checked_mul(exchange_rate as u128)?
            .checked_mul(self.collateral_price as u128)?
            .checked_mul(self.debt_unit as u128)?;
        let denominator = (EXCHANGE_RATE_SCALE as u128).checked_mul(self.collateral_unit as u128)?;
        Some(numerator / denominator)
    }

    /// `collateral_value * max_vault_ltv_bp >= debt * BASIS_POINTS`.
    pub fn is_vault_healthy(&self, collateral_value: u128, debt: u64) -> Option<bool> {
        let capacity = collateral_value.checked_mul(self.max_vault_ltv_bp as u128)?;
        let exposure = (debt as u128).checked_mul(BASIS_POINTS as u128)?;
        Some(capacity >= exposure)
    }

    /// Largest debt a single participant may carry against `collateral_value`.
    ///
    /// Plaintext mirror of the encrypted gate, used by tooling and tests.
    pub fn max_participant_debt(&self, collateral_value: u128) -> Option<u128> {
        Some(collateral_value.checked_mul(BASIS_POINTS as u128)? / self.min_health_factor_bp as u128)
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Static wiring of a vault instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultConfig {
    /// The vault's own principal. Granted access to every ciphertext it
    /// touches and used as the holder of pooled assets.
    pub address: Address,
    /// Initial owner, allowed to pause, unpause and hand over ownership.
    pub owner: Address,
    /// The only principal allowed to deliver decryption callbacks.
    pub oracle: Address,
    /// Solvency thresholds and unit conversion.
    pub policy: HealthPolicy,
    /// Advisory deadline attached to each decryption request.
    #[serde(with = "duration_secs")]
    pub decryption_deadline: Duration,
}

impl VaultConfig {
    /// Config with default policy and deadline.
    pub fn new(address: Address, owner: Address, oracle: Address) -> Self {
        Self {
            address,
            owner,
            oracle,
            policy: HealthPolicy::default(),
            decryption_deadline: DEFAULT_DECRYPTION_DEADLINE,
        }
    }

    /// Builder: replace the health policy.
    pub fn with_policy(mut self, policy: HealthPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder: replace the decryption deadline.
    pub fn with_decryption_deadline(mut self, deadline: Duration) -> Self {
        self.decryption_deadline = deadline;
        self
    }

    /// Validates the policy and rejects wiring where roles collide.
    pub fn validate(&self) -> Result<(), VaultError> {
        self.policy.validate()?;
        if self.address == self.oracle {
            return Err(VaultError::InvalidConfig(
                "vault and oracle must be distinct principals".into(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(HealthPolicy::default().validate().is_ok());
    }

    #[test]
    fn ltv_above_one_hundred_percent_rejected() {
        let policy = HealthPolicy::default().with_max_vault_ltv(BASIS_POINTS + 1);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn zero_scaling_rejected() {
        assert!(HealthPolicy::default().with_units(0, 1).validate().is_err());
        assert!(HealthPolicy::default().with_collateral_price(0).validate().is_err());
        assert!(HealthPolicy::default().with_min_health_factor(0).validate().is_err());
    }

    #[test]
    fn five_units_at_three_thousand() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.collateral_value(5, EXCHANGE_RATE_SCALE), Some(15_000));
    }

    #[test]
    fn valuation_respects_decimal_scaling() {
        // 18-decimal collateral, 6-decimal debt: one whole collateral unit
        // is worth 3000 * 10^6 debt base units.
        let policy = HealthPolicy::default().with_units(1_000_000_000_000_000_000, 1_000_000);
        let one = 1_000_000_000_000_000_000u64;
        assert_eq!(
            policy.collateral_value(one, EXCHANGE_RATE_SCALE),
            Some(3_000_000_000)
        );
    }

    #[test]
    fn valuation_factors_are_reduced() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.valuation_factors(EXCHANGE_RATE_SCALE), Some((3_000, 1)));

        // 10^24 does not fit in 64 bits; 3 / 10^9 does.
        let decimals = HealthPolicy::default().with_units(1_000_000_000_000_000_000, 1_000_000);
        assert_eq!(
            decimals.valuation_factors(EXCHANGE_RATE_SCALE),
            Some((3, 1_000_000_000))
        );
        assert!(decimals.validate().is_ok());
    }

    #[test]
    fn capacity_keeps_encrypted_products_in_range() {
        let policy = HealthPolicy::default();
        let capacity = policy.encrypted_share_capacity(EXCHANGE_RATE_SCALE).unwrap();
        let value = capacity as u128 * 3_000;
        assert!(value <= u64::MAX as u128);
        assert!(value * BASIS_POINTS as u128 <= u64::MAX as u128);
        let over = (capacity as u128 + 1) * 3_000 * BASIS_POINTS as u128;
        assert!(over > u64::MAX as u128);
    }

    #[test]
    fn unrepresentable_policy_rejected() {
        let policy = HealthPolicy::default()
            .with_collateral_price(u64::MAX)
            .with_units(1, 1_000_000_000_000_000_000);
        assert!(matches!(policy.validate(), Err(VaultError::InvalidConfig(_))));
    }

    #[test]
    fn vault_health_boundary_is_inclusive() {
        let policy = HealthPolicy::default();
        // 80% of 15_000 is 12_000: exactly on the line is still healthy.
        assert_eq!(policy.is_vault_healthy(15_000, 12_000), Some(true));
        assert_eq!(policy.is_vault_healthy(15_000, 12_001), Some(false));
    }

    #[test]
    fn multiply_before_divide_keeps_fractional_value() {
        // 3 shares at a 0.5 exchange rate and price 3 is 4.5 units. Dividing
        // first would lose the whole product; multiplying first floors to 4.
        let policy = HealthPolicy::default().with_collateral_price(3);
        assert_eq!(policy.collateral_value(3, EXCHANGE_RATE_SCALE / 2), Some(4));
    }

    #[test]
    fn participant_ceiling_follows_health_factor() {
        let policy = HealthPolicy::default().with_min_health_factor(12_500);
        assert_eq!(policy.max_participant_debt(15_000), Some(12_000));
    }

    #[test]
    fn config_rejects_vault_acting_as_oracle() {
        let cfg = VaultConfig::new("vault".into(), "owner".into(), "vault".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_roundtrips_deadline_as_seconds() {
        let cfg = VaultConfig::new("vault".into(), "owner".into(), "oracle".into())
            .with_decryption_deadline(Duration::from_secs(90));
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["decryption_deadline"], 90);
    }
}

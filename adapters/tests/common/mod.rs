//! Shared fixtures for the vault integration tests.

#![allow(dead_code)]

use umbra_adapters::{Deployment, PoolConfig};
use umbra_protocol::config::VaultConfig;
use umbra_protocol::vault::{CorrelationId, VaultEvent};
use umbra_protocol::Address;

/// Debt-asset liquidity the pool starts with.
pub const POOL_LIQUIDITY: u64 = 1_000_000;

pub fn alice() -> Address {
    Address::from("alice")
}

pub fn bob() -> Address {
    Address::from("bob")
}

pub fn oracle() -> Address {
    Address::from("oracle")
}

pub fn owner() -> Address {
    Address::from("owner")
}

pub fn config() -> VaultConfig {
    VaultConfig::new("vault".into(), owner(), oracle())
}

/// Default policy (price 3000, 80% vault LTV, 1.0 health factor), unit
/// exchange rate, liquid pool.
pub fn deployment() -> Deployment {
    deployment_with(config())
}

pub fn deployment_with(config: VaultConfig) -> Deployment {
    let d = Deployment::new(config, PoolConfig::default()).expect("deployment");
    d.seed_liquidity(POOL_LIQUIDITY).expect("seed liquidity");
    d
}

/// Mints `amount` collateral to `who` and deposits all of it.
pub fn deposit(d: &Deployment, who: &Address, amount: u64) -> u64 {
    d.collateral.mint(who, amount).expect("mint collateral");
    d.deposit_for(who, amount).expect("deposit")
}

/// Requests a borrow of `amount` and relays it.
pub fn borrow(d: &Deployment, who: &Address, amount: u64) -> CorrelationId {
    let id = d
        .vault
        .request_borrow(who, &d.encrypt(who, amount))
        .expect("request borrow");
    d.relay();
    id
}

pub fn events(d: &Deployment) -> Vec<VaultEvent> {
    d.vault.drain_events()
}

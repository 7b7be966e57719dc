//! A vault wired to in-memory collaborators.
//!
//! [`Deployment`] owns one [`Market`], the two tokens, the pool, the oracle,
//! the homomorphic backend and the vault itself. The node runs on one; the
//! integration tests build a fresh one per test.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use umbra_protocol::collaborators::{
    CollaboratorError, Collaborators, FungibleToken, LiquidityPool,
};
use umbra_protocol::config::VaultConfig;
use umbra_protocol::fhe::clear::ClearBackend;
use umbra_protocol::fhe::EncryptedU64;
use umbra_protocol::vault::CorrelationId;
use umbra_protocol::{Address, Vault, VaultError};

use crate::market::Market;
use crate::oracle::{relay, QueuedOracle, RelayReport};
use crate::pool::{InMemoryPool, PoolConfig};
use crate::token::InMemoryToken;

/// Everything needed to run the vault in one process.
#[derive(Debug)]
pub struct Deployment {
    pub market: Market,
    pub collateral: InMemoryToken,
    pub debt: InMemoryToken,
    pub pool: Arc<InMemoryPool>,
    pub oracle: Arc<QueuedOracle>,
    pub backend: Arc<ClearBackend>,
    pub vault: Arc<Vault>,
    /// Backend watermark taken at the previous compaction.
    sweep_mark: Mutex<u64>,
}

impl Deployment {
    pub fn new(config: VaultConfig, pool_config: PoolConfig) -> Result<Self, VaultError> {
        let market = Market::new();
        let collateral = InMemoryToken::new(&market, &pool_config.collateral_symbol);
        let debt = InMemoryToken::new(&market, &pool_config.debt_symbol);
        let pool = Arc::new(InMemoryPool::new(&market, pool_config));
        let oracle = Arc::new(QueuedOracle::new(config.oracle.clone()));
        let backend = Arc::new(ClearBackend::new());

        let collaborators = Collaborators {
            collateral_token: Arc::new(collateral.clone()),
            debt_token: Arc::new(debt.clone()),
            pool: pool.clone(),
            journal: Arc::new(market.clone()),
            oracle: oracle.clone(),
        };
        let vault = Arc::new(Vault::new(config, backend.clone(), collaborators)?);

        Ok(Self {
            market,
            collateral,
            debt,
            pool,
            oracle,
            backend,
            vault,
            sweep_mark: Mutex::new(0),
        })
    }

    /// Frees ciphertexts the vault no longer references.
    ///
    /// Only handles allocated before the previous call are eligible, so an
    /// input encrypted for a request that has not reached the vault yet
    /// survives at least one full interval.
    pub fn compact(&self) -> usize {
        let mark = self.backend.watermark();
        let eligible = std::mem::replace(&mut *self.sweep_mark.lock(), mark);
        let dropped = self
            .vault
            .with_live_handles(|live| self.backend.sweep(live, eligible));
        if dropped > 0 {
            debug!(dropped, live = self.backend.ciphertext_count(), "ciphertexts compacted");
        }
        dropped
    }

    /// Delivers every queued decryption to the vault.
    pub fn relay(&self) -> RelayReport {
        relay(&self.vault, self.backend.clone(), &self.oracle)
    }

    /// Puts `amount` of the debt asset in the pool for borrowers.
    pub fn seed_liquidity(&self, amount: u64) -> Result<(), CollaboratorError> {
        self.debt.mint(&self.pool.address(), amount)
    }

    /// Encrypts a client input owned by `owner`.
    pub fn encrypt(&self, owner: &Address, value: u64) -> EncryptedU64 {
        self.vault.evaluator().encrypt_input(owner, value)
    }

    /// Approves the vault and deposits on behalf of `participant`.
    pub fn deposit_for(&self, participant: &Address, amount: u64) -> Result<u64, VaultError> {
        self.collateral
            .approve(participant, &self.vault.config().address, amount)
            .map_err(VaultError::TransferFailed)?;
        self.vault.deposit(participant, amount)
    }

    /// Approves the vault for `amount` of the debt asset and queues a repay.
    pub fn repay_for(
        &self,
        participant: &Address,
        amount: u64,
    ) -> Result<CorrelationId, VaultError> {
        self.debt
            .approve(participant, &self.vault.config().address, amount)
            .map_err(VaultError::TransferFailed)?;
        self.vault.request_repay(participant, amount)
    }

    /// Decrypts `participant`'s collateral as `participant`. Zero if they
    /// have no slot.
    pub fn collateral_of(&self, participant: &Address) -> u64 {
        self.reveal_own(participant, self.vault.encrypted_collateral_of(participant))
    }

    /// Decrypts `participant`'s debt as `participant`.
    pub fn debt_of(&self, participant: &Address) -> u64 {
        self.reveal_own(participant, self.vault.encrypted_debt_of(participant))
    }

    fn reveal_own(&self, participant: &Address, slot: Option<EncryptedU64>) -> u64 {
        slot.and_then(|v| self.vault.evaluator().decrypt_as(participant, &v).ok())
            .unwrap_or(0)
    }
}

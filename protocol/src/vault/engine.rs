//! # Vault Engine
//!
//! Ties the store, the gate, the pending table and the aggregate ledger
//! together behind the vault's public entry points.
//!
//! ## Two phases
//!
//! Deposits settle synchronously. Everything else is split:
//!
//! ```text
//!  request_* ──► gate ──► PendingTable::register ──► oracle.request_decryption
//!                                                        │
//!                           (later, from the oracle)     ▼
//!  resolve(id, plaintext) ──► take ──► 0? ──yes──► Rejected (no-op)
//!                                       │ no
//!                                       ▼
//!                 vault LTV check ──► prepare store + ledger
//!                                       │
//!                                       ▼
//!                 savepoint ──► pool / token calls ──► release ──► commit
//!                                       │ error
//!                                       ▼
//!                 rollback_to ──► restore pending entry ──► Err
//! ```
//!
//! A request returns as soon as the oracle has accepted the ciphertext. The
//! vault never waits for, or polls, the oracle.
//!
//! ## Atomicity
//!
//! All vault state sits behind one mutex. Each entry point holds it from
//! start to finish, so no caller ever observes a half-applied transition.
//! Within a settlement every fallible computation runs before the first
//! external call, external effects run inside a journal savepoint, and the
//! vault's own state is written only after the savepoint is released.
//!
//! ## Reservations
//!
//! Withdrawals and repayments are gated against what is left after every
//! pending operation of the same kind, and the approved ciphertext is
//! earmarked until the callback settles it. Two in-flight withdrawals can
//! therefore never both claim the same shares, and two repayments never
//! burn the same debt. Borrows are not earmarked: the vault LTV check at
//! settlement bounds what concurrent borrows can add.
//!
//! ## Valuation range
//!
//! Encrypted integers are 64-bit and wrap. Before any request values
//! collateral under encryption, and after every deposit, the aggregate share
//! count is checked against the policy's encrypted capacity at the current
//! exchange rate. No participant holds more than the aggregate, so no
//! product in the gate can wrap.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::collaborators::{Collaborators, DecryptionRequest};
use crate::config::{HealthPolicy, VaultConfig};
use crate::fhe::{EncryptedU64, Evaluator, FheBackend, Handle};
use crate::vault::access::AccessControl;
use crate::vault::error::VaultError;
use crate::vault::events::VaultEvent;
use crate::vault::gate::HealthGate;
use crate::vault::ledger::AggregateLedger;
use crate::vault::pending::{CorrelationId, OperationKind, PendingOperation, PendingTable};
use crate::vault::store::{ConfidentialStore, Direction, LedgerKind, Reservation};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a decryption callback did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Settlement {
    /// The operation was applied.
    Settled {
        correlation_id: CorrelationId,
        kind: OperationKind,
        participant: Address,
        amount: u64,
    },
    /// The decrypted amount was zero. Nothing changed.
    Rejected {
        correlation_id: CorrelationId,
        kind: OperationKind,
        participant: Address,
    },
    /// No pending entry under this id: never issued, or already consumed.
    Unknown { correlation_id: CorrelationId },
}

/// Public solvency snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VaultStatus {
    pub total_collateral: u64,
    pub total_debt: u64,
    /// Aggregate collateral valued in debt units at the current rate.
    pub collateral_value: u128,
    pub exchange_rate: u64,
    pub pending_operations: usize,
    pub paused: bool,
    pub owner: Address,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct VaultState {
    store: ConfidentialStore,
    ledger: AggregateLedger,
    pending: PendingTable,
    access: AccessControl,
    events: Vec<VaultEvent>,
}

/// The confidential lending vault.
pub struct Vault {
    config: VaultConfig,
    deadline: chrono::Duration,
    fhe: Evaluator,
    collaborators: Collaborators,
    state: Mutex<VaultState>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("address", &self.config.address)
            .field("oracle", &self.config.oracle)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Wires a vault to a homomorphic backend and its collaborators.
    pub fn new(
        config: VaultConfig,
        backend: Arc<dyn FheBackend>,
        collaborators: Collaborators,
    ) -> Result<Self, VaultError> {
        config.validate()?;
        let deadline = chrono::Duration::from_std(config.decryption_deadline)
            .map_err(|_| VaultError::InvalidConfig("decryption deadline out of range".into()))?;
        let fhe = Evaluator::new(backend, config.address.clone());
        let state = VaultState {
            store: ConfidentialStore::new(),
            ledger: AggregateLedger::new(),
            pending: PendingTable::new(),
            access: AccessControl::new(config.owner.clone()),
            events: Vec::new(),
        };
        info!(
            vault = %config.address,
            owner = %config.owner,
            oracle = %config.oracle,
            max_ltv_bp = config.policy.max_vault_ltv_bp,
            min_hf_bp = config.policy.min_health_factor_bp,
            "vault initialized"
        );
        Ok(Self {
            config,
            deadline,
            fhe,
            collaborators,
            state: Mutex::new(state),
        })
    }

    fn address(&self) -> &Address {
        &self.config.address
    }

    fn policy(&self) -> &HealthPolicy {
        &self.config.policy
    }

    // -----------------------------------------------------------------------
    // Deposit
    // -----------------------------------------------------------------------

    /// Pulls `amount` collateral from `caller`, supplies it to the pool and
    /// credits the minted shares to the caller's encrypted collateral.
    ///
    /// The caller must have approved the vault for `amount` beforehand.
    /// Returns the number of shares credited.
    pub fn deposit(&self, caller: &Address, amount: u64) -> Result<u64, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let mut state = self.state.lock();
        state.access.ensure_active()?;

        let vault = self.address();
        let token = &self.collaborators.collateral_token;
        let pool = &self.collaborators.pool;

        // The share count is only known after the pool call, so the vault's
        // own candidate state is staged inside the savepoint.
        let (shares, ledger, next) = self.transact(|| {
            token
                .transfer_from(vault, caller, vault, amount)
                .map_err(VaultError::TransferFailed)?;
            token
                .approve(vault, &pool.address(), amount)
                .map_err(VaultError::TransferFailed)?;
            let before = pool.share_balance_of(vault);
            pool.deposit(vault, amount).map_err(VaultError::MintFailed)?;
            let after = pool.share_balance_of(vault);
            let shares = match after.checked_sub(before) {
                Some(0) | None => return Err(VaultError::NothingMinted { amount }),
                Some(minted) => minted,
            };

            let ledger = state.ledger.with_collateral_added(shares)?;
            self.check_valuation_range(ledger.total_collateral)?;
            let delta = self.fhe.constant(shares);
            let next = state.store.prepare(
                &self.fhe,
                caller,
                LedgerKind::Collateral,
                &delta,
                Direction::Credit,
            )?;
            Ok((shares, ledger, next))
        })?;

        state.store.commit(caller, LedgerKind::Collateral, next);
        state.ledger = ledger;
        state.events.push(VaultEvent::Deposited {
            participant: caller.clone(),
            amount,
            shares,
            at: Utc::now(),
        });

        info!(
            participant = %caller,
            amount,
            shares,
            total_collateral = state.ledger.total_collateral,
            "deposit settled"
        );
        Ok(shares)
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Gates an encrypted borrow against the caller's current position and
    /// queues it for decryption.
    ///
    /// `amount` must be an input encrypted by `caller`. An unhealthy request
    /// is not an error: it is queued like any other and settles to zero.
    pub fn request_borrow(
        &self,
        caller: &Address,
        amount: &EncryptedU64,
    ) -> Result<CorrelationId, VaultError> {
        let mut state = self.state.lock();
        state.access.ensure_active()?;
        let rate = self.check_valuation_range(state.ledger.total_collateral)?;

        let requested = self.fhe.adopt(caller, amount)?;
        let collateral = state.store.available(&self.fhe, caller, Reservation::Withdrawal)?;
        let debt = state.store.get_or_zero(&self.fhe, caller, LedgerKind::Debt);

        let gate = HealthGate::new(&self.fhe, self.policy());
        let value = gate.collateral_value(&collateral, rate)?;
        let debt_after = self.fhe.add(&debt, &requested)?;
        // A sum that wrapped is smaller than the request.
        let in_range = self.fhe.ge(&debt_after, &requested)?;
        let healthy = gate.user_is_healthy(&value, &debt_after)?;
        let approve = self.fhe.and(&in_range, &healthy)?;
        let approved = gate.gate(&approve, &requested)?;

        self.submit(&mut state, caller, OperationKind::Borrow, approved, None)
    }

    /// Gates an encrypted withdrawal of pool shares and queues it.
    ///
    /// Approved only if the caller holds at least `amount` shares beyond
    /// those already earmarked by pending withdrawals, and stays healthy on
    /// what would remain.
    pub fn request_withdraw(
        &self,
        caller: &Address,
        amount: &EncryptedU64,
    ) -> Result<CorrelationId, VaultError> {
        let mut state = self.state.lock();
        state.access.ensure_active()?;
        let rate = self.check_valuation_range(state.ledger.total_collateral)?;

        let requested = self.fhe.adopt(caller, amount)?;
        let available = state.store.available(&self.fhe, caller, Reservation::Withdrawal)?;
        let debt = state.store.get_or_zero(&self.fhe, caller, LedgerKind::Debt);

        let gate = HealthGate::new(&self.fhe, self.policy());
        let covered = gate.covers(&requested, &available)?;
        // Wraps when uncovered; `covered` is false then and masks the verdict.
        let remaining = self.fhe.sub(&available, &requested)?;
        let value = gate.collateral_value(&remaining, rate)?;
        let healthy = gate.user_is_healthy(&value, &debt)?;
        let approve = self.fhe.and(&covered, &healthy)?;
        let approved = gate.gate(&approve, &requested)?;

        self.submit_reserved(&mut state, caller, OperationKind::Withdraw, approved, None)
    }

    /// Queues a repayment of up to `amount`, clamped to the caller's debt
    /// net of repayments already pending.
    ///
    /// Only the clamped amount is ever pulled at settlement, so the caller
    /// needs a debt-token allowance of at most `amount`.
    pub fn request_repay(&self, caller: &Address, amount: u64) -> Result<CorrelationId, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let mut state = self.state.lock();
        state.access.ensure_active()?;

        let outstanding = state.store.available(&self.fhe, caller, Reservation::Repayment)?;
        let gate = HealthGate::new(&self.fhe, self.policy());
        let clamped = gate.clamp(&self.fhe.constant(amount), &outstanding)?;

        self.submit_reserved(&mut state, caller, OperationKind::Repay, clamped, Some(amount))
    }

    /// [`submit`](Self::submit), earmarking `amount` against the caller's
    /// slot once the oracle has accepted it.
    fn submit_reserved(
        &self,
        state: &mut VaultState,
        participant: &Address,
        kind: OperationKind,
        amount: EncryptedU64,
        declared_amount: Option<u64>,
    ) -> Result<CorrelationId, VaultError> {
        let reservation = match kind {
            OperationKind::Withdraw => Reservation::Withdrawal,
            OperationKind::Repay => Reservation::Repayment,
            OperationKind::Borrow => {
                return self.submit(state, participant, kind, amount, declared_amount)
            }
        };
        let reserved = state.store.prepare_reservation(
            &self.fhe,
            participant,
            reservation,
            &amount,
            Direction::Credit,
        )?;
        let correlation_id = self.submit(state, participant, kind, amount, declared_amount)?;
        state.store.commit_reservation(participant, reservation, reserved);
        Ok(correlation_id)
    }

    /// Registers a pending entry and hands its ciphertext to the oracle.
    fn submit(
        &self,
        state: &mut VaultState,
        participant: &Address,
        kind: OperationKind,
        mut amount: EncryptedU64,
        declared_amount: Option<u64>,
    ) -> Result<CorrelationId, VaultError> {
        amount.grant(&self.config.oracle);
        let ciphertext = amount.handle();
        let now = Utc::now();
        let deadline = now + self.deadline;

        let correlation_id = state.pending.register(
            participant.clone(),
            kind,
            amount.clone(),
            declared_amount,
            now,
            deadline,
        );

        let request = DecryptionRequest {
            correlation_id,
            ciphertext: amount,
            deadline,
        };
        if let Err(e) = self.collaborators.oracle.request_decryption(request) {
            state.pending.take(&correlation_id);
            warn!(participant = %participant, %kind, error = %e, "oracle refused decryption request");
            return Err(e.into());
        }

        state
            .events
            .push(VaultEvent::requested(kind, participant.clone(), correlation_id, now));
        debug!(
            participant = %participant,
            %kind,
            %correlation_id,
            ciphertext = %ciphertext,
            "operation pending decryption"
        );
        Ok(correlation_id)
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// Oracle callback: settles the pending operation `correlation_id` with
    /// its decrypted `plaintext` amount.
    ///
    /// Only the configured oracle may call this. An id that is not pending
    /// yields [`Settlement::Unknown`] and has no effect, so replays are
    /// harmless. On any error the vault, the collaborators and the pending
    /// entry are left exactly as they were before the call.
    pub fn resolve(
        &self,
        caller: &Address,
        correlation_id: CorrelationId,
        plaintext: u64,
    ) -> Result<Settlement, VaultError> {
        if caller != &self.config.oracle {
            warn!(caller = %caller, "callback from non-oracle principal refused");
            return Err(VaultError::NotOracle);
        }
        let mut state = self.state.lock();
        state.access.ensure_active()?;

        let Some(op) = state.pending.take(&correlation_id) else {
            warn!(%correlation_id, "callback for unknown or consumed correlation id ignored");
            return Ok(Settlement::Unknown { correlation_id });
        };

        if plaintext == 0 {
            info!(
                participant = %op.participant,
                kind = %op.kind,
                %correlation_id,
                "settled to zero, no-op"
            );
            return Ok(Settlement::Rejected {
                correlation_id,
                kind: op.kind,
                participant: op.participant,
            });
        }

        let outcome = match op.kind {
            OperationKind::Borrow => self.settle_borrow(&mut state, &op, plaintext),
            OperationKind::Withdraw => self.settle_withdraw(&mut state, &op, plaintext),
            OperationKind::Repay => self.settle_repay(&mut state, &op, plaintext),
        };

        match outcome {
            Ok(event) => {
                state.events.push(event);
                Ok(Settlement::Settled {
                    correlation_id,
                    kind: op.kind,
                    participant: op.participant,
                    amount: plaintext,
                })
            }
            Err(e) => {
                warn!(
                    participant = %op.participant,
                    kind = %op.kind,
                    %correlation_id,
                    error = %e,
                    "settlement aborted, entry remains pending"
                );
                state.pending.restore(op);
                Err(e)
            }
        }
    }

    fn settle_borrow(
        &self,
        state: &mut VaultState,
        op: &PendingOperation,
        amount: u64,
    ) -> Result<VaultEvent, VaultError> {
        let rate = self.collaborators.pool.exchange_rate();
        let ledger = state.ledger.with_debt_added(amount)?;
        ledger.check_vault_healthy(self.policy(), rate)?;

        let delta = self.fhe.constant(amount);
        let next = state.store.prepare(
            &self.fhe,
            &op.participant,
            LedgerKind::Debt,
            &delta,
            Direction::Credit,
        )?;

        let vault = self.address();
        self.transact(|| {
            self.collaborators
                .pool
                .borrow(vault, amount)
                .map_err(VaultError::BorrowFailed)?;
            self.collaborators
                .debt_token
                .transfer(vault, &op.participant, amount)
                .map_err(VaultError::TransferFailed)
        })?;

        state.store.commit(&op.participant, LedgerKind::Debt, next);
        state.ledger = ledger;
        info!(
            participant = %op.participant,
            correlation_id = %op.correlation_id,
            amount,
            total_debt = ledger.total_debt,
            "borrow settled"
        );
        Ok(VaultEvent::Borrowed {
            participant: op.participant.clone(),
            correlation_id: op.correlation_id,
            amount,
            at: Utc::now(),
        })
    }

    fn settle_withdraw(
        &self,
        state: &mut VaultState,
        op: &PendingOperation,
        shares: u64,
    ) -> Result<VaultEvent, VaultError> {
        let rate = self.collaborators.pool.exchange_rate();
        let ledger = state.ledger.with_collateral_removed(shares)?;
        ledger.check_vault_healthy(self.policy(), rate)?;

        let delta = self.fhe.constant(shares);
        let next = state.store.prepare(
            &self.fhe,
            &op.participant,
            LedgerKind::Collateral,
            &delta,
            Direction::Debit,
        )?;
        let released = state.store.prepare_reservation(
            &self.fhe,
            &op.participant,
            Reservation::Withdrawal,
            &delta,
            Direction::Debit,
        )?;

        let vault = self.address();
        let token = &self.collaborators.collateral_token;
        let underlying = self.transact(|| {
            let before = token.balance_of(vault);
            self.collaborators
                .pool
                .redeem(vault, shares)
                .map_err(VaultError::RedeemFailed)?;
            let after = token.balance_of(vault);
            let underlying = after
                .checked_sub(before)
                .ok_or(VaultError::Overflow("redeemed underlying"))?;
            token
                .transfer(vault, &op.participant, underlying)
                .map_err(VaultError::TransferFailed)?;
            Ok(underlying)
        })?;

        state.store.commit(&op.participant, LedgerKind::Collateral, next);
        state
            .store
            .commit_reservation(&op.participant, Reservation::Withdrawal, released);
        state.ledger = ledger;
        info!(
            participant = %op.participant,
            correlation_id = %op.correlation_id,
            shares,
            underlying,
            total_collateral = ledger.total_collateral,
            "withdrawal settled"
        );
        Ok(VaultEvent::Withdrawn {
            participant: op.participant.clone(),
            correlation_id: op.correlation_id,
            shares,
            underlying,
            at: Utc::now(),
        })
    }

    fn settle_repay(
        &self,
        state: &mut VaultState,
        op: &PendingOperation,
        burned: u64,
    ) -> Result<VaultEvent, VaultError> {
        // Repayment only lowers debt, so the vault LTV cannot get worse.
        let ledger = state.ledger.with_debt_removed(burned)?;
        let excess_returned = op.declared_amount.unwrap_or(burned).saturating_sub(burned);

        let delta = self.fhe.constant(burned);
        let next = state.store.prepare(
            &self.fhe,
            &op.participant,
            LedgerKind::Debt,
            &delta,
            Direction::Debit,
        )?;
        let released = state.store.prepare_reservation(
            &self.fhe,
            &op.participant,
            Reservation::Repayment,
            &delta,
            Direction::Debit,
        )?;

        let vault = self.address();
        let token = &self.collaborators.debt_token;
        let pool = &self.collaborators.pool;
        self.transact(|| {
            token
                .transfer_from(vault, &op.participant, vault, burned)
                .map_err(VaultError::TransferFailed)?;
            token
                .approve(vault, &pool.address(), burned)
                .map_err(VaultError::TransferFailed)?;
            pool.repay(vault, burned).map_err(VaultError::RepayFailed)
        })?;

        state.store.commit(&op.participant, LedgerKind::Debt, next);
        state
            .store
            .commit_reservation(&op.participant, Reservation::Repayment, released);
        state.ledger = ledger;
        info!(
            participant = %op.participant,
            correlation_id = %op.correlation_id,
            burned,
            excess_returned,
            total_debt = ledger.total_debt,
            "repayment settled"
        );
        Ok(VaultEvent::Repaid {
            participant: op.participant.clone(),
            correlation_id: op.correlation_id,
            burned,
            excess_returned,
            at: Utc::now(),
        })
    }

    /// Checks that `total_collateral` shares can be valued under encryption
    /// at the current exchange rate, and returns that rate.
    fn check_valuation_range(&self, total_collateral: u64) -> Result<u64, VaultError> {
        let rate = self.collaborators.pool.exchange_rate();
        let capacity = self
            .policy()
            .encrypted_share_capacity(rate)
            .ok_or(VaultError::Overflow("collateral valuation factors"))?;
        if total_collateral > capacity {
            return Err(VaultError::CapacityExceeded {
                total: total_collateral,
                capacity,
            });
        }
        Ok(rate)
    }

    /// Runs `f` inside a journal savepoint: released on success, rolled
    /// back on error.
    fn transact<T>(&self, f: impl FnOnce() -> Result<T, VaultError>) -> Result<T, VaultError> {
        let journal = &self.collaborators.journal;
        let savepoint = journal.savepoint();
        match f() {
            Ok(value) => {
                journal.release(savepoint);
                Ok(value)
            }
            Err(e) => {
                journal.rollback_to(savepoint);
                debug!(savepoint = savepoint.0, error = %e, "external effects rolled back");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Owner only. Blocks every state-changing entry point, callbacks included.
    pub fn pause(&self, caller: &Address) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        if state.access.pause(caller)? {
            state.events.push(VaultEvent::Paused {
                by: caller.clone(),
                at: Utc::now(),
            });
            warn!(by = %caller, "vault paused");
        }
        Ok(())
    }

    /// Owner only.
    pub fn unpause(&self, caller: &Address) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        if state.access.unpause(caller)? {
            state.events.push(VaultEvent::Unpaused {
                by: caller.clone(),
                at: Utc::now(),
            });
            info!(by = %caller, "vault unpaused");
        }
        Ok(())
    }

    /// Owner only.
    pub fn transfer_ownership(&self, caller: &Address, new_owner: Address) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        let previous = state.access.transfer_ownership(caller, new_owner.clone())?;
        info!(previous = %previous, new_owner = %new_owner, "ownership transferred");
        state.events.push(VaultEvent::OwnershipTransferred {
            previous,
            new_owner,
            at: Utc::now(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The participant's encrypted share balance, if they ever had one.
    pub fn encrypted_collateral_of(&self, participant: &Address) -> Option<EncryptedU64> {
        self.state
            .lock()
            .store
            .get(participant, LedgerKind::Collateral)
            .cloned()
    }

    /// The participant's encrypted debt, if they ever had one.
    pub fn encrypted_debt_of(&self, participant: &Address) -> Option<EncryptedU64> {
        self.state.lock().store.get(participant, LedgerKind::Debt).cloned()
    }

    pub fn aggregate(&self) -> AggregateLedger {
        self.state.lock().ledger
    }

    pub fn status(&self) -> Result<VaultStatus, VaultError> {
        let state = self.state.lock();
        let exchange_rate = self.collaborators.pool.exchange_rate();
        Ok(VaultStatus {
            total_collateral: state.ledger.total_collateral,
            total_debt: state.ledger.total_debt,
            collateral_value: state.ledger.collateral_value(self.policy(), exchange_rate)?,
            exchange_rate,
            pending_operations: state.pending.len(),
            paused: state.access.is_paused(),
            owner: state.access.owner().clone(),
        })
    }

    pub fn pending_operation(&self, id: &CorrelationId) -> Option<PendingOperation> {
        self.state.lock().pending.get(id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Every in-flight operation, oldest first.
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.state.lock().pending.all().into_iter().cloned().collect()
    }

    pub fn pending_for(&self, participant: &Address) -> Vec<PendingOperation> {
        self.state
            .lock()
            .pending
            .for_participant(participant)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Pending entries past their advisory deadline. Nothing is expired.
    pub fn overdue_operations(&self, now: DateTime<Utc>) -> Vec<PendingOperation> {
        self.state
            .lock()
            .pending
            .overdue(now)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().access.is_paused()
    }

    pub fn owner(&self) -> Address {
        self.state.lock().access.owner().clone()
    }

    /// Runs `f` over every ciphertext the vault still references: stored
    /// slots, earmarks and pending amounts. The state lock is held
    /// throughout, so nothing is replaced while `f` runs.
    pub fn with_live_handles<T>(&self, f: impl FnOnce(&HashSet<Handle>) -> T) -> T {
        let state = self.state.lock();
        let mut live: HashSet<Handle> = state.store.handles().collect();
        live.extend(
            state
                .pending
                .all()
                .into_iter()
                .map(|op| op.encrypted_amount.handle()),
        );
        f(&live)
    }

    /// Removes and returns every event logged since the last drain.
    pub fn drain_events(&self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.state.lock().events)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The vault's evaluator, for building inputs and ACL-checked reads.
    pub fn evaluator(&self) -> &Evaluator {
        &self.fhe
    }
}

//! # Confidential Value Store
//!
//! Per-participant encrypted collateral and debt. A [`ConfidentialStore`]
//! maps each participant to two [`EncryptedU64`] slots and enforces two
//! rules:
//!
//! 1. A slot that has never been written reads as an encrypted zero that the
//!    vault may operate on. It is never fed uninitialized into an operation.
//! 2. Every write re-grants access to both the vault and the owning
//!    participant. A homomorphic result is born readable by the vault only;
//!    storing it without the re-grant would leave the owner unable to
//!    decrypt their own balance.
//!
//! Writes are split into [`prepare`](ConfidentialStore::prepare) (compute
//! the new ciphertext) and [`commit`](ConfidentialStore::commit) (install
//! it), so a settlement can finish every fallible step before touching the
//! store. [`update`](ConfidentialStore::update) does both.
//!
//! ## Reservations
//!
//! A gated withdrawal or repayment is earmarked against its slot until it
//! settles. Requests are gated against [`available`](ConfidentialStore::available),
//! the slot minus every earmark, so two in-flight operations can never
//! draw the same balance twice. Earmarks stay readable by the vault only:
//! they hold gate verdicts, and the participant learns those at settlement.
//! An earmark never exceeds its slot, so `available` cannot wrap.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::fhe::{EncryptedU64, Evaluator, FheError, Handle};

/// Which of a participant's two encrypted balances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Pool shares deposited.
    Collateral,
    /// Debt-asset units owed.
    Debt,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Collateral => write!(f, "collateral"),
            LedgerKind::Debt => write!(f, "debt"),
        }
    }
}

/// Gated amounts held back from a slot while their operation is pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reservation {
    /// Shares approved for pending withdrawals.
    Withdrawal,
    /// Debt approved for pending repayments.
    Repayment,
}

impl Reservation {
    /// The slot this reservation is drawn against.
    pub fn ledger(self) -> LedgerKind {
        match self {
            Reservation::Withdrawal => LedgerKind::Collateral,
            Reservation::Repayment => LedgerKind::Debt,
        }
    }
}

/// Whether an update adds to or subtracts from a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

/// Encrypted balances for every participant.
#[derive(Clone, Debug, Default)]
pub struct ConfidentialStore {
    collateral: HashMap<Address, EncryptedU64>,
    debt: HashMap<Address, EncryptedU64>,
    reserved: HashMap<(Address, Reservation), EncryptedU64>,
}

impl ConfidentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self, ledger: LedgerKind) -> &HashMap<Address, EncryptedU64> {
        match ledger {
            LedgerKind::Collateral => &self.collateral,
            LedgerKind::Debt => &self.debt,
        }
    }

    fn slots_mut(&mut self, ledger: LedgerKind) -> &mut HashMap<Address, EncryptedU64> {
        match ledger {
            LedgerKind::Collateral => &mut self.collateral,
            LedgerKind::Debt => &mut self.debt,
        }
    }

    /// The stored slot, if the participant ever had one.
    pub fn get(&self, participant: &Address, ledger: LedgerKind) -> Option<&EncryptedU64> {
        self.slots(ledger).get(participant)
    }

    /// The stored slot, or a fresh encrypted zero the vault may use.
    ///
    /// The zero is materialized into the store so later reads see the same
    /// handle. Like any stored slot it is readable by its owner too.
    pub fn get_or_zero(
        &mut self,
        fhe: &Evaluator,
        participant: &Address,
        ledger: LedgerKind,
    ) -> EncryptedU64 {
        self.slots_mut(ledger)
            .entry(participant.clone())
            .or_insert_with(|| {
                let mut zero = fhe.zero();
                zero.grant(participant);
                zero
            })
            .clone()
    }

    /// Computes `slot ± delta` with the owner re-granted, without storing it.
    pub fn prepare(
        &mut self,
        fhe: &Evaluator,
        participant: &Address,
        ledger: LedgerKind,
        delta: &EncryptedU64,
        direction: Direction,
    ) -> Result<EncryptedU64, FheError> {
        let current = self.get_or_zero(fhe, participant, ledger);
        let mut next = match direction {
            Direction::Credit => fhe.add(&current, delta)?,
            Direction::Debit => fhe.sub(&current, delta)?,
        };
        next.grant(fhe.principal());
        next.grant(participant);
        Ok(next)
    }

    /// Installs a value produced by [`prepare`](Self::prepare).
    pub fn commit(&mut self, participant: &Address, ledger: LedgerKind, value: EncryptedU64) {
        self.slots_mut(ledger).insert(participant.clone(), value);
    }

    /// Homomorphically adds or subtracts `delta` and stores the result.
    pub fn update(
        &mut self,
        fhe: &Evaluator,
        participant: &Address,
        ledger: LedgerKind,
        delta: &EncryptedU64,
        direction: Direction,
    ) -> Result<EncryptedU64, FheError> {
        let next = self.prepare(fhe, participant, ledger, delta, direction)?;
        self.commit(participant, ledger, next.clone());
        Ok(next)
    }

    /// What pending operations have earmarked, or a vault-only zero.
    pub fn reserved(
        &self,
        fhe: &Evaluator,
        participant: &Address,
        reservation: Reservation,
    ) -> EncryptedU64 {
        self.reserved
            .get(&(participant.clone(), reservation))
            .cloned()
            .unwrap_or_else(|| fhe.zero())
    }

    /// The slot minus everything reserved against it.
    pub fn available(
        &mut self,
        fhe: &Evaluator,
        participant: &Address,
        reservation: Reservation,
    ) -> Result<EncryptedU64, FheError> {
        let slot = self.get_or_zero(fhe, participant, reservation.ledger());
        let reserved = self.reserved(fhe, participant, reservation);
        fhe.sub(&slot, &reserved)
    }

    /// Computes `earmark ± amount` without storing it. The result is not
    /// granted to the participant.
    pub fn prepare_reservation(
        &self,
        fhe: &Evaluator,
        participant: &Address,
        reservation: Reservation,
        amount: &EncryptedU64,
        direction: Direction,
    ) -> Result<EncryptedU64, FheError> {
        let current = self.reserved(fhe, participant, reservation);
        match direction {
            Direction::Credit => fhe.add(&current, amount),
            Direction::Debit => fhe.sub(&current, amount),
        }
    }

    /// Installs a value produced by [`prepare_reservation`](Self::prepare_reservation).
    pub fn commit_reservation(
        &mut self,
        participant: &Address,
        reservation: Reservation,
        value: EncryptedU64,
    ) {
        self.reserved.insert((participant.clone(), reservation), value);
    }

    /// Every ciphertext the store references, earmarks included.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.collateral
            .values()
            .chain(self.debt.values())
            .chain(self.reserved.values())
            .map(EncryptedU64::handle)
    }

    /// Participants with at least one materialized slot.
    pub fn participants(&self) -> impl Iterator<Item = &Address> {
        let extra = self
            .debt
            .keys()
            .filter(move |addr| !self.collateral.contains_key(*addr));
        self.collateral.keys().chain(extra)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fhe::clear::ClearBackend;

    fn setup() -> (Evaluator, ConfidentialStore, Address) {
        let fhe = Evaluator::new(Arc::new(ClearBackend::new()), Address::from("vault"));
        (fhe, ConfidentialStore::new(), Address::from("alice"))
    }

    #[test]
    fn unwritten_slot_reads_as_usable_zero() {
        let (fhe, mut store, alice) = setup();
        assert!(store.get(&alice, LedgerKind::Debt).is_none());

        let zero = store.get_or_zero(&fhe, &alice, LedgerKind::Debt);
        assert!(zero.acl().permits(fhe.principal()));
        assert_eq!(fhe.decrypt_as(fhe.principal(), &zero).unwrap(), 0);
        assert_eq!(fhe.decrypt_as(&alice, &zero).unwrap(), 0);

        // Second read returns the materialized slot, not another fresh zero.
        let again = store.get_or_zero(&fhe, &alice, LedgerKind::Debt);
        assert_eq!(zero.handle(), again.handle());
    }

    #[test]
    fn update_regrants_owner_and_vault() {
        let (fhe, mut store, alice) = setup();
        let delta = fhe.constant(25);
        let stored = store
            .update(&fhe, &alice, LedgerKind::Collateral, &delta, Direction::Credit)
            .unwrap();

        assert!(stored.acl().permits(&alice));
        assert!(stored.acl().permits(fhe.principal()));
        assert_eq!(fhe.decrypt_as(&alice, &stored).unwrap(), 25);
        assert!(fhe.decrypt_as(&Address::from("bob"), &stored).is_err());
    }

    #[test]
    fn credit_then_debit() {
        let (fhe, mut store, alice) = setup();
        store
            .update(&fhe, &alice, LedgerKind::Debt, &fhe.constant(500), Direction::Credit)
            .unwrap();
        let after = store
            .update(&fhe, &alice, LedgerKind::Debt, &fhe.constant(200), Direction::Debit)
            .unwrap();
        assert_eq!(fhe.decrypt_as(&alice, &after).unwrap(), 300);
    }

    #[test]
    fn prepare_does_not_install() {
        let (fhe, mut store, alice) = setup();
        let before = store.get_or_zero(&fhe, &alice, LedgerKind::Collateral);
        let staged = store
            .prepare(&fhe, &alice, LedgerKind::Collateral, &fhe.constant(7), Direction::Credit)
            .unwrap();

        let current = store.get(&alice, LedgerKind::Collateral).unwrap();
        assert_eq!(current.handle(), before.handle());
        assert_ne!(current.handle(), staged.handle());

        store.commit(&alice, LedgerKind::Collateral, staged.clone());
        assert_eq!(
            store.get(&alice, LedgerKind::Collateral).unwrap().handle(),
            staged.handle()
        );
    }

    #[test]
    fn reservations_reduce_what_is_available() {
        let (fhe, mut store, alice) = setup();
        store
            .update(&fhe, &alice, LedgerKind::Collateral, &fhe.constant(5), Direction::Credit)
            .unwrap();

        let held = store
            .prepare_reservation(&fhe, &alice, Reservation::Withdrawal, &fhe.constant(3), Direction::Credit)
            .unwrap();
        store.commit_reservation(&alice, Reservation::Withdrawal, held);
        let available = store.available(&fhe, &alice, Reservation::Withdrawal).unwrap();
        assert_eq!(fhe.decrypt_as(fhe.principal(), &available).unwrap(), 2);

        // Debt is untouched by a collateral earmark.
        let debt = store.available(&fhe, &alice, Reservation::Repayment).unwrap();
        assert_eq!(fhe.decrypt_as(fhe.principal(), &debt).unwrap(), 0);

        let released = store
            .prepare_reservation(&fhe, &alice, Reservation::Withdrawal, &fhe.constant(3), Direction::Debit)
            .unwrap();
        store.commit_reservation(&alice, Reservation::Withdrawal, released);
        let available = store.available(&fhe, &alice, Reservation::Withdrawal).unwrap();
        assert_eq!(fhe.decrypt_as(fhe.principal(), &available).unwrap(), 5);
    }

    #[test]
    fn reservations_are_vault_only() {
        let (fhe, mut store, alice) = setup();
        let held = store
            .prepare_reservation(&fhe, &alice, Reservation::Repayment, &fhe.constant(4), Direction::Credit)
            .unwrap();
        store.commit_reservation(&alice, Reservation::Repayment, held);
        let reserved = store.reserved(&fhe, &alice, Reservation::Repayment);
        assert!(fhe.decrypt_as(&alice, &reserved).is_err());
        assert_eq!(fhe.decrypt_as(fhe.principal(), &reserved).unwrap(), 4);
    }

    #[test]
    fn ledgers_are_independent() {
        let (fhe, mut store, alice) = setup();
        store
            .update(&fhe, &alice, LedgerKind::Collateral, &fhe.constant(5), Direction::Credit)
            .unwrap();
        let debt = store.get_or_zero(&fhe, &alice, LedgerKind::Debt);
        assert_eq!(fhe.decrypt_as(fhe.principal(), &debt).unwrap(), 0);
        assert_eq!(store.participants().count(), 1);
    }
}

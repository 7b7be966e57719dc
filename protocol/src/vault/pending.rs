//! # Pending-Operation Table
//!
//! Borrow, withdraw and repay cannot settle until the oracle tells the vault
//! what the gated ciphertext decrypts to. Between request and callback the
//! operation lives here, keyed by a [`CorrelationId`].
//!
//! ## Rules
//!
//! - Ids are opaque and never reused for the lifetime of the table. Each id
//!   packs a per-table random salt with a strictly increasing sequence
//!   number, so two registrations can never collide.
//! - Consumption is take-and-delete. There is no peek-then-remove path: the
//!   settlement removes the entry before it does anything else, so a
//!   replayed callback finds nothing and has no effect.
//! - Nothing here expires. The deadline is recorded for the oracle and for
//!   operators (see [`PendingTable::overdue`]); the table never drops an
//!   entry on its own.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::Address;
use crate::fhe::EncryptedU64;

/// Opaque token linking a decryption request to its callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Parses the hyphenated form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which settlement path a pending entry takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Borrow,
    Withdraw,
    Repay,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Borrow => write!(f, "borrow"),
            OperationKind::Withdraw => write!(f, "withdraw"),
            OperationKind::Repay => write!(f, "repay"),
        }
    }
}

/// An in-flight request awaiting decryption.
#[derive(Clone, Debug, Serialize)]
pub struct PendingOperation {
    pub correlation_id: CorrelationId,
    pub participant: Address,
    pub kind: OperationKind,
    /// The gated (or clamped) amount sent to the oracle.
    pub encrypted_amount: EncryptedU64,
    /// Plaintext amount the participant declared. Repay only.
    pub declared_amount: Option<u64>,
    pub created_at: DateTime<Utc>,
    /// Advisory. Never enforced locally.
    pub deadline: DateTime<Utc>,
}

impl PendingOperation {
    /// Whether `now` is past the deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

/// Correlation-id-indexed registry of in-flight operations.
#[derive(Clone, Debug)]
pub struct PendingTable {
    entries: HashMap<CorrelationId, PendingOperation>,
    salt: u64,
    sequence: u64,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    /// Creates an empty table with a fresh id salt.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            salt: Uuid::new_v4().as_u64_pair().0,
            sequence: 0,
        }
    }

    fn next_id(&mut self) -> CorrelationId {
        self.sequence += 1;
        CorrelationId(Uuid::from_u64_pair(self.salt, self.sequence))
    }

    /// Stores a new pending operation and returns its id.
    pub fn register(
        &mut self,
        participant: Address,
        kind: OperationKind,
        encrypted_amount: EncryptedU64,
        declared_amount: Option<u64>,
        created_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> CorrelationId {
        let correlation_id = self.next_id();
        self.entries.insert(
            correlation_id,
            PendingOperation {
                correlation_id,
                participant,
                kind,
                encrypted_amount,
                declared_amount,
                created_at,
                deadline,
            },
        );
        correlation_id
    }

    /// Removes and returns the entry. `None` if unknown or already consumed.
    pub fn take(&mut self, id: &CorrelationId) -> Option<PendingOperation> {
        self.entries.remove(id)
    }

    /// Puts back an entry whose settlement was rolled back.
    ///
    /// Returns `false` (and leaves the table unchanged) if the id is live.
    pub fn restore(&mut self, op: PendingOperation) -> bool {
        if self.entries.contains_key(&op.correlation_id) {
            return false;
        }
        self.entries.insert(op.correlation_id, op);
        true
    }

    pub fn get(&self, id: &CorrelationId) -> Option<&PendingOperation> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, oldest first.
    pub fn all(&self) -> Vec<&PendingOperation> {
        let mut ops: Vec<_> = self.entries.values().collect();
        ops.sort_by_key(|op| (op.created_at, op.correlation_id));
        ops
    }

    /// Entries belonging to `participant`, oldest first.
    pub fn for_participant(&self, participant: &Address) -> Vec<&PendingOperation> {
        let mut ops: Vec<_> = self
            .entries
            .values()
            .filter(|op| &op.participant == participant)
            .collect();
        ops.sort_by_key(|op| (op.created_at, op.correlation_id));
        ops
    }

    /// Entries whose advisory deadline has passed, oldest first.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<&PendingOperation> {
        let mut ops: Vec<_> = self
            .entries
            .values()
            .filter(|op| op.is_overdue(now))
            .collect();
        ops.sort_by_key(|op| (op.deadline, op.correlation_id));
        ops
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::fhe::clear::ClearBackend;
    use crate::fhe::Evaluator;

    fn amount() -> EncryptedU64 {
        Evaluator::new(Arc::new(ClearBackend::new()), Address::from("vault")).constant(1)
    }

    fn register(table: &mut PendingTable, who: &str, kind: OperationKind) -> CorrelationId {
        let now = Utc::now();
        table.register(
            Address::from(who),
            kind,
            amount(),
            None,
            now,
            now + Duration::hours(1),
        )
    }

    #[test]
    fn ids_are_unique() {
        let mut table = PendingTable::new();
        let ids: HashSet<_> = (0..1_000)
            .map(|_| register(&mut table, "alice", OperationKind::Borrow))
            .collect();
        assert_eq!(ids.len(), 1_000);
        assert_eq!(table.len(), 1_000);
    }

    #[test]
    fn ids_are_not_reused_after_consumption() {
        let mut table = PendingTable::new();
        let first = register(&mut table, "alice", OperationKind::Borrow);
        table.take(&first).unwrap();
        let second = register(&mut table, "alice", OperationKind::Borrow);
        assert_ne!(first, second);
    }

    #[test]
    fn take_consumes_exactly_once() {
        let mut table = PendingTable::new();
        let id = register(&mut table, "alice", OperationKind::Repay);
        let op = table.take(&id).expect("first take");
        assert_eq!(op.kind, OperationKind::Repay);
        assert!(table.take(&id).is_none(), "replay must find nothing");
        assert!(table.is_empty());
    }

    #[test]
    fn restore_reinstates_rolled_back_entry() {
        let mut table = PendingTable::new();
        let id = register(&mut table, "alice", OperationKind::Withdraw);
        let op = table.take(&id).unwrap();
        assert!(table.restore(op.clone()));
        assert!(table.get(&id).is_some());
        assert!(!table.restore(op), "live id must not be overwritten");
    }

    #[test]
    fn coexisting_operations_for_one_participant() {
        let mut table = PendingTable::new();
        register(&mut table, "alice", OperationKind::Borrow);
        register(&mut table, "alice", OperationKind::Withdraw);
        register(&mut table, "bob", OperationKind::Borrow);
        let alice = table.for_participant(&Address::from("alice"));
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|op| op.participant.as_str() == "alice"));
        assert_eq!(table.all().len(), 3);
    }

    #[test]
    fn overdue_is_informational() {
        let mut table = PendingTable::new();
        let id = register(&mut table, "alice", OperationKind::Borrow);
        let later = Utc::now() + Duration::hours(2);
        assert_eq!(table.overdue(later).len(), 1);
        assert_eq!(table.overdue(Utc::now()).len(), 0);
        // Still there: nothing expires on its own.
        assert!(table.get(&id).is_some());
    }

    #[test]
    fn correlation_id_display_roundtrip() {
        let mut table = PendingTable::new();
        let id = register(&mut table, "alice", OperationKind::Borrow);
        assert_eq!(CorrelationId::parse(&id.to_string()), Some(id));
    }
}

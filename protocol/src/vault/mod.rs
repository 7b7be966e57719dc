//! # Vault Module: Confidential Collateral & Debt Accounting
//!
//! Where the books are kept. Per-participant collateral and debt exist only
//! as ciphertexts; the only plaintext numbers the vault holds are the two
//! aggregate totals, and those move only by amounts the oracle has already
//! revealed at settlement.
//!
//! ## Architecture
//!
//! ```text
//! store.rs    : Encrypted per-participant slots, earmarks, ACL re-grants
//! gate.rs     : Homomorphic health check: "requested or zero"
//! pending.rs  : Correlation-id table of operations awaiting decryption
//! ledger.rs   : Plaintext aggregate totals and the vault LTV check
//! access.rs   : Owner / pause gating
//! events.rs   : Settlement notifications
//! engine.rs   : The `Vault` itself: requests, callbacks, reads
//! error.rs    : Everything that can go wrong
//! ```
//!
//! ## Design Principles
//!
//! 1. **Unhealthy is not an error.** A request that fails the private health
//!    check is indistinguishable from a request for zero. It is queued,
//!    decrypted, and settles as a no-op.
//!
//! 2. **The vault LTV is the final authority.** The per-participant gate runs
//!    against whatever state existed at request time, net of the encrypted
//!    earmarks of pending withdrawals and repayments. Pending borrows are not
//!    earmarked; the aggregate check at settlement runs against the amount
//!    actually about to be applied.
//!
//! 3. **Settlement is all-or-nothing.** A failed pool or token call undoes
//!    every external effect, leaves the vault's own state untouched and puts
//!    the pending entry back.
//!
//! 4. **Callbacks are consumed once.** Take-and-delete, never peek. A replay
//!    is a no-op.

pub mod access;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod ledger;
pub mod pending;
pub mod store;

pub use access::AccessControl;
pub use engine::{Settlement, Vault, VaultStatus};
pub use error::VaultError;
pub use events::VaultEvent;
pub use gate::HealthGate;
pub use ledger::{check_vault_healthy, AggregateLedger};
pub use pending::{CorrelationId, OperationKind, PendingOperation, PendingTable};
pub use store::{ConfidentialStore, Direction, LedgerKind, Reservation};

// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Umbra Protocol: Confidential Lending Vault Core
//!
//! A lending vault that knows how much everybody owes without knowing how
//! much anybody owes. Collateral and debt balances are homomorphic
//! ciphertexts; solvency of each participant is checked under encryption;
//! only the vault-wide totals are ever plaintext.
//!
//! Anything that needs a real number (moving tokens, borrowing from the
//! pool) waits for an external decryption oracle. The vault files a request,
//! returns immediately, and settles when the oracle calls back.
//!
//! ## Architecture
//!
//! - **address**: Principal identities. Participants, the vault, the oracle.
//! - **fhe**: Encrypted values, their ACLs, and the backend seam.
//! - **collaborators**: Token, pool, journal and oracle traits.
//! - **vault**: Store, gate, pending table, ledger, settlement.
//! - **config**: Constants, the health policy, vault wiring.
//!
//! ## Design Philosophy
//!
//! 1. Plaintext per-participant balances never exist inside the vault.
//! 2. Multiply before divide, in one fixed order, everywhere.
//! 3. Every collaborator call returns a `Result`, and every one is checked.
//! 4. If it touches money, it has tests. Plural.

pub mod address;
pub mod collaborators;
pub mod config;
pub mod fhe;
pub mod vault;

pub use address::Address;
pub use vault::{Settlement, Vault, VaultError, VaultEvent};

//! # Umbra Reference Collaborators
//!
//! The vault core never moves an asset or decrypts a value itself; it calls
//! out to a token standard, a lending pool, a transaction journal and a
//! decryption oracle. This crate provides in-memory versions of all four so
//! the vault can run end to end in tests and in the node:
//!
//! - **Market**: the shared books every token and the pool write to. Also
//!   the journal: savepoints snapshot the books, rollback restores them.
//! - **InMemoryToken**: fungible balances, allowances and `transferFrom`.
//! - **InMemoryPool**: a Compound-style market with a moving exchange rate,
//!   finite liquidity and one-shot failure injection.
//! - **QueuedOracle**: queues decryption requests; [`relay`] answers them.
//! - **Deployment**: all of the above wired to a vault.
//!
//! ## Design Principles
//!
//! 1. Every balance change is checked. `checked_add` and `checked_sub`
//!    everywhere, errors instead of wrap-around.
//! 2. A failed call changes nothing, ever.
//! 3. Asynchrony is real: requests queue, settlement happens on a later call.

pub mod deployment;
pub mod market;
pub mod oracle;
pub mod pool;
pub mod token;

pub use deployment::Deployment;
pub use market::Market;
pub use oracle::{relay, QueuedOracle, RelayFailure, RelayReport};
pub use pool::{InMemoryPool, PoolConfig, PoolOperation};
pub use token::InMemoryToken;

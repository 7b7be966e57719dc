//! # Encrypted Values & Ciphertext Access Control
//!
//! The vault never holds a plaintext per-participant balance. It holds
//! *handles*: opaque references to ciphertexts that live inside a
//! homomorphic backend. Arithmetic, comparison and selection all happen on
//! handles and produce new handles.
//!
//! ## Capabilities
//!
//! A handle alone is useless. Every encrypted value travels with an
//! [`Acl`]: the set of principals allowed to operate on it or decrypt it.
//! The ACL is a field of the value wrapper, not an ambient registry, so a
//! value copied out of the store carries exactly the rights it was stored
//! with. The [`Evaluator`] refuses to touch a value whose ACL does not name
//! the vault, and refuses client-side decryption to anyone not on the list.
//!
//! ```text
//!  participant ──encrypt_input──► EncryptedU64 { acl: {participant} }
//!                                        │ adopt (caller must be listed)
//!                                        ▼
//!                                EncryptedU64 { acl: {participant, vault} }
//!                                        │ add / sub / ge / select ...
//!                                        ▼
//!                                EncryptedU64 { acl: {vault} }   (transient)
//!                                        │ store update re-grants owner
//!                                        ▼
//!                                EncryptedU64 { acl: {participant, vault} }
//! ```
//!
//! Only the constructors on [`Evaluator`] and crate-internal grants can
//! widen an ACL, so code outside the crate cannot forge access.
//!
//! ## Backends
//!
//! The homomorphic primitive itself is external and sits behind
//! [`FheBackend`]. [`clear::ClearBackend`] is a plaintext-shadowed backend
//! for local runs and tests; it reproduces 64-bit wrapping semantics of a
//! real encrypted integer.

pub mod clear;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the homomorphic layer.
#[derive(Debug, Error)]
pub enum FheError {
    /// The backend has no ciphertext for this handle.
    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(Handle),

    /// The handle refers to a ciphertext of a different type.
    #[error("ciphertext {handle} is not an encrypted {expected}")]
    TypeMismatch {
        /// The offending handle.
        handle: Handle,
        /// The type the operation needed.
        expected: &'static str,
    },

    /// The principal is not on the ciphertext's ACL.
    #[error("access denied: {principal} may not use ciphertext {handle}")]
    AccessDenied {
        /// Who asked.
        principal: Address,
        /// What they asked for.
        handle: Handle,
    },

    /// Scalar division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Opaque 32-byte reference to a ciphertext held by a backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle([u8; 32]);

impl Handle {
    /// Wraps raw handle bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw handle bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self)
    }
}

// ---------------------------------------------------------------------------
// Acl
// ---------------------------------------------------------------------------

/// Principals allowed to operate on or decrypt a ciphertext.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Acl(BTreeSet<Address>);

impl Acl {
    fn only(principal: &Address) -> Self {
        let mut set = BTreeSet::new();
        set.insert(principal.clone());
        Self(set)
    }

    /// Returns `true` if `principal` is listed.
    pub fn permits(&self, principal: &Address) -> bool {
        self.0.contains(principal)
    }

    /// Iterates over the listed principals in address order.
    pub fn principals(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }

    pub(crate) fn grant(&mut self, principal: &Address) {
        self.0.insert(principal.clone());
    }
}

// ---------------------------------------------------------------------------
// Encrypted wrappers
// ---------------------------------------------------------------------------

/// An encrypted 64-bit unsigned integer together with its ACL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EncryptedU64 {
    handle: Handle,
    acl: Acl,
}

/// An encrypted boolean together with its ACL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EncryptedBool {
    handle: Handle,
    acl: Acl,
}

impl EncryptedU64 {
    /// The ciphertext handle.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The principals allowed to use this value.
    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    pub(crate) fn grant(&mut self, principal: &Address) {
        self.acl.grant(principal);
    }
}

impl EncryptedBool {
    /// The ciphertext handle.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The principals allowed to use this value.
    pub fn acl(&self) -> &Acl {
        &self.acl
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// The homomorphic primitive library.
///
/// Integer operations work on encrypted `u64` and wrap on overflow, as
/// fixed-width encrypted integers do. Comparisons produce encrypted
/// booleans. Implementations must be safe to share between the vault and
/// the oracle.
pub trait FheBackend: Send + Sync {
    /// Encrypts a public constant.
    fn trivial_encrypt(&self, value: u64) -> Handle;
    /// `a + b`, wrapping.
    fn add(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError>;
    /// `a - b`, wrapping.
    fn sub(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError>;
    /// `a * scalar`, wrapping.
    fn mul_scalar(&self, a: &Handle, scalar: u64) -> Result<Handle, FheError>;
    /// `a / scalar`, flooring.
    fn div_scalar(&self, a: &Handle, scalar: u64) -> Result<Handle, FheError>;
    /// Encrypted `a >= b`.
    fn ge(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError>;
    /// Encrypted `a <= b`.
    fn le(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError>;
    /// Encrypted `min(a, b)`.
    fn min(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError>;
    /// Encrypted boolean `a && b`.
    fn and(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError>;
    /// `if cond { a } else { b }` without revealing `cond`.
    fn select(&self, cond: &Handle, a: &Handle, b: &Handle) -> Result<Handle, FheError>;
    /// Decrypts a handle. Booleans decrypt to 0 or 1.
    ///
    /// Reserved for the decryption oracle and for ACL-checked reads through
    /// [`Evaluator::decrypt_as`].
    fn reveal(&self, handle: &Handle) -> Result<u64, FheError>;
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// ACL-enforcing front end over an [`FheBackend`], acting as one principal.
///
/// Every operand must list the evaluator's principal. Every result is a
/// fresh value whose ACL names only that principal; callers that persist a
/// result are responsible for granting further access.
#[derive(Clone)]
pub struct Evaluator {
    backend: Arc<dyn FheBackend>,
    principal: Address,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl Evaluator {
    /// Creates an evaluator acting as `principal`.
    pub fn new(backend: Arc<dyn FheBackend>, principal: Address) -> Self {
        Self { backend, principal }
    }

    /// The principal this evaluator acts as.
    pub fn principal(&self) -> &Address {
        &self.principal
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn FheBackend> {
        &self.backend
    }

    /// Encrypted zero, usable by this evaluator only.
    pub fn zero(&self) -> EncryptedU64 {
        self.constant(0)
    }

    /// Trivially encrypts a public constant, usable by this evaluator only.
    pub fn constant(&self, value: u64) -> EncryptedU64 {
        self.wrap_u64(self.backend.trivial_encrypt(value))
    }

    /// Encrypts a client-side input owned by `owner`.
    ///
    /// Stands in for client encryption plus input proof: the resulting value
    /// is usable by `owner` only, until a contract adopts it.
    pub fn encrypt_input(&self, owner: &Address, value: u64) -> EncryptedU64 {
        EncryptedU64 {
            handle: self.backend.trivial_encrypt(value),
            acl: Acl::only(owner),
        }
    }

    /// Takes over an input submitted by `caller`.
    ///
    /// The caller must be on the input's ACL; the returned copy additionally
    /// lists this evaluator's principal.
    pub(crate) fn adopt(
        &self,
        caller: &Address,
        input: &EncryptedU64,
    ) -> Result<EncryptedU64, FheError> {
        if !input.acl.permits(caller) {
            return Err(FheError::AccessDenied {
                principal: caller.clone(),
                handle: input.handle,
            });
        }
        let mut adopted = input.clone();
        adopted.grant(&self.principal);
        Ok(adopted)
    }

    /// Decrypts `value` on behalf of `principal`, if the ACL allows it.
    pub fn decrypt_as(&self, principal: &Address, value: &EncryptedU64) -> Result<u64, FheError> {
        if !value.acl.permits(principal) {
            return Err(FheError::AccessDenied {
                principal: principal.clone(),
                handle: value.handle,
            });
        }
        self.backend.reveal(&value.handle)
    }

    pub fn add(&self, a: &EncryptedU64, b: &EncryptedU64) -> Result<EncryptedU64, FheError> {
        self.check(a.handle, &a.acl)?;
        self.check(b.handle, &b.acl)?;
        Ok(self.wrap_u64(self.backend.add(&a.handle, &b.handle)?))
    }

    pub fn sub(&self, a: &EncryptedU64, b: &EncryptedU64) -> Result<EncryptedU64, FheError> {
        self.check(a.handle, &a.acl)?;
        self.check(b.handle, &b.acl)?;
        Ok(self.wrap_u64(self.backend.sub(&a.handle, &b.handle)?))
    }

    pub fn mul_scalar(&self, a: &EncryptedU64, scalar: u64) -> Result<EncryptedU64, FheError> {
        self.check(a.handle, &a.acl)?;
        Ok(self.wrap_u64(self.backend.mul_scalar(&a.handle, scalar)?))
    }

    pub fn div_scalar(&self, a: &EncryptedU64, scalar: u64) -> Result<EncryptedU64, FheError> {
        if scalar == 0 {
            return Err(FheError::DivisionByZero);
        }
        self.check(a.handle, &a.acl)?;
        Ok(self.wrap_u64(self.backend.div_scalar(&a.handle, scalar)?))
    }

    pub fn ge(&self, a: &EncryptedU64, b: &EncryptedU64) -> Result<EncryptedBool, FheError> {
        self.check(a.handle, &a.acl)?;
        self.check(b.handle, &b.acl)?;
        Ok(self.wrap_bool(self.backend.ge(&a.handle, &b.handle)?))
    }

    pub fn le(&self, a: &EncryptedU64, b: &EncryptedU64) -> Result<EncryptedBool, FheError> {
        self.check(a.handle, &a.acl)?;
        self.check(b.handle, &b.acl)?;
        Ok(self.wrap_bool(self.backend.le(&a.handle, &b.handle)?))
    }

    pub fn min(&self, a: &EncryptedU64, b: &EncryptedU64) -> Result<EncryptedU64, FheError> {
        self.check(a.handle, &a.acl)?;
        self.check(b.handle, &b.acl)?;
        Ok(self.wrap_u64(self.backend.min(&a.handle, &b.handle)?))
    }

    pub fn and(&self, a: &EncryptedBool, b: &EncryptedBool) -> Result<EncryptedBool, FheError> {
        self.check(a.handle, &a.acl)?;
        self.check(b.handle, &b.acl)?;
        Ok(self.wrap_bool(self.backend.and(&a.handle, &b.handle)?))
    }

    pub fn select(
        &self,
        cond: &EncryptedBool,
        a: &EncryptedU64,
        b: &EncryptedU64,
    ) -> Result<EncryptedU64, FheError> {
        self.check(cond.handle, &cond.acl)?;
        self.check(a.handle, &a.acl)?;
        self.check(b.handle, &b.acl)?;
        Ok(self.wrap_u64(self.backend.select(&cond.handle, &a.handle, &b.handle)?))
    }

    fn check(&self, handle: Handle, acl: &Acl) -> Result<(), FheError> {
        if acl.permits(&self.principal) {
            Ok(())
        } else {
            Err(FheError::AccessDenied {
                principal: self.principal.clone(),
                handle,
            })
        }
    }

    fn wrap_u64(&self, handle: Handle) -> EncryptedU64 {
        EncryptedU64 {
            handle,
            acl: Acl::only(&self.principal),
        }
    }

    fn wrap_bool(&self, handle: Handle) -> EncryptedBool {
        EncryptedBool {
            handle,
            acl: Acl::only(&self.principal),
        }
    }
}

//! Plaintext-shadowed homomorphic backend.
//!
//! Stores the cleartext behind every handle in a concurrent map and
//! evaluates operations directly on it. Nothing here is confidential: it
//! exists so the vault, the reference collaborators and the node can run
//! end to end without a real encryption library, with the same 64-bit
//! wrapping semantics and the same handle discipline.
//!
//! Handles are `blake3(domain || instance salt || sequence)`, so they are
//! unique per backend instance and carry no information about the value.
//!
//! Every operation allocates a ciphertext and nothing is freed implicitly.
//! A long-running owner calls [`ClearBackend::sweep`] with the handles it
//! still references; everything else allocated before a given
//! [`watermark`](ClearBackend::watermark) is dropped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use super::{FheBackend, FheError, Handle};

const HANDLE_DOMAIN: &[u8] = b"umbra/clear-backend/handle/v1";

#[derive(Clone, Copy, Debug)]
enum Plain {
    Uint(u64),
    Bool(bool),
}

/// In-memory backend for local runs and tests.
#[derive(Debug)]
pub struct ClearBackend {
    /// Plaintext and allocation sequence of every live handle.
    values: DashMap<Handle, (Plain, u64)>,
    salt: [u8; 16],
    sequence: AtomicU64,
}

impl Default for ClearBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ClearBackend {
    /// Creates an empty backend with a fresh handle salt.
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            salt: *Uuid::new_v4().as_bytes(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Number of live ciphertexts. Every operation allocates one.
    pub fn ciphertext_count(&self) -> usize {
        self.values.len()
    }

    /// Sequence number the next allocation will get.
    pub fn watermark(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Drops every ciphertext allocated before `watermark` that is not in
    /// `keep`. Returns how many were dropped.
    pub fn sweep(&self, keep: &HashSet<Handle>, watermark: u64) -> usize {
        let before = self.values.len();
        self.values
            .retain(|handle, (_, seq)| *seq >= watermark || keep.contains(handle));
        before.saturating_sub(self.values.len())
    }

    fn next_handle(&self) -> (Handle, u64) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let mut hasher = blake3::Hasher::new();
        hasher.update(HANDLE_DOMAIN);
        hasher.update(&self.salt);
        hasher.update(&seq.to_le_bytes());
        (Handle::from_bytes(*hasher.finalize().as_bytes()), seq)
    }

    fn store(&self, value: Plain) -> Handle {
        let (handle, seq) = self.next_handle();
        self.values.insert(handle, (value, seq));
        handle
    }

    fn plain(&self, handle: &Handle) -> Option<Plain> {
        self.values.get(handle).map(|entry| entry.0)
    }

    fn uint(&self, handle: &Handle) -> Result<u64, FheError> {
        match self.plain(handle) {
            Some(Plain::Uint(v)) => Ok(v),
            Some(Plain::Bool(_)) => Err(FheError::TypeMismatch {
                handle: *handle,
                expected: "u64",
            }),
            None => Err(FheError::UnknownHandle(*handle)),
        }
    }

    fn boolean(&self, handle: &Handle) -> Result<bool, FheError> {
        match self.plain(handle) {
            Some(Plain::Bool(b)) => Ok(b),
            Some(Plain::Uint(_)) => Err(FheError::TypeMismatch {
                handle: *handle,
                expected: "bool",
            }),
            None => Err(FheError::UnknownHandle(*handle)),
        }
    }
}

impl FheBackend for ClearBackend {
    fn trivial_encrypt(&self, value: u64) -> Handle {
        self.store(Plain::Uint(value))
    }

    fn add(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError> {
        let v = self.uint(a)?.wrapping_add(self.uint(b)?);
        Ok(self.store(Plain::Uint(v)))
    }

    fn sub(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError> {
        let v = self.uint(a)?.wrapping_sub(self.uint(b)?);
        Ok(self.store(Plain::Uint(v)))
    }

    fn mul_scalar(&self, a: &Handle, scalar: u64) -> Result<Handle, FheError> {
        let v = self.uint(a)?.wrapping_mul(scalar);
        Ok(self.store(Plain::Uint(v)))
    }

    fn div_scalar(&self, a: &Handle, scalar: u64) -> Result<Handle, FheError> {
        if scalar == 0 {
            return Err(FheError::DivisionByZero);
        }
        let v = self.uint(a)? / scalar;
        Ok(self.store(Plain::Uint(v)))
    }

    fn ge(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError> {
        let v = self.uint(a)? >= self.uint(b)?;
        Ok(self.store(Plain::Bool(v)))
    }

    fn le(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError> {
        let v = self.uint(a)? <= self.uint(b)?;
        Ok(self.store(Plain::Bool(v)))
    }

    fn min(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError> {
        let v = self.uint(a)?.min(self.uint(b)?);
        Ok(self.store(Plain::Uint(v)))
    }

    fn and(&self, a: &Handle, b: &Handle) -> Result<Handle, FheError> {
        let v = self.boolean(a)? && self.boolean(b)?;
        Ok(self.store(Plain::Bool(v)))
    }

    fn select(&self, cond: &Handle, a: &Handle, b: &Handle) -> Result<Handle, FheError> {
        let picked = if self.boolean(cond)? {
            self.uint(a)?
        } else {
            self.uint(b)?
        };
        Ok(self.store(Plain::Uint(picked)))
    }

    fn reveal(&self, handle: &Handle) -> Result<u64, FheError> {
        match self.plain(handle) {
            Some(Plain::Uint(v)) => Ok(v),
            Some(Plain::Bool(b)) => Ok(b as u64),
            None => Err(FheError::UnknownHandle(*handle)),
        }
    }
}

//! # Principals
//!
//! Everything that can hold a balance, own a ciphertext, or call into the
//! vault is identified by an [`Address`]. The vault never interprets the
//! contents: an address is an opaque string that only has to be stable and
//! comparable. Participants, the vault itself, the oracle, the pool and the
//! owner all share the same type so that ACLs can name any of them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque principal identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps any string-like identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

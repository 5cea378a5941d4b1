//! Owner credentials.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted owner name length in bytes.
pub const MAX_OWNER_NAME_LEN: usize = 512;

/// Maximum accepted passphrase hash length in bytes.
pub const MAX_PASSPHRASE_HASH_LEN: usize = 1024;

/// Name identifying an owner. Case-sensitive and unique across the store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerName(String);

impl OwnerName {
    /// Parse an owner name, rejecting empty or oversized values.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidCredentials(
                "owner name is empty".to_string(),
            ));
        }
        if s.len() > MAX_OWNER_NAME_LEN {
            return Err(crate::Error::InvalidCredentials(format!(
                "owner name exceeds {MAX_OWNER_NAME_LEN} bytes"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<OwnerName> for String {
    fn from(value: OwnerName) -> Self {
        value.0
    }
}

impl fmt::Debug for OwnerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerName({})", self.0)
    }
}

impl fmt::Display for OwnerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-computed passphrase hash.
///
/// The server stores and compares this value verbatim and never sees the raw
/// passphrase. `Debug` is redacted and there is no `Display` impl.
#[derive(Clone, PartialEq, Eq)]
pub struct PassphraseHash(String);

impl PassphraseHash {
    /// Wrap a hash received from a client or read from the store.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidCredentials(
                "passphrase hash is empty".to_string(),
            ));
        }
        if s.len() > MAX_PASSPHRASE_HASH_LEN {
            return Err(crate::Error::InvalidCredentials(format!(
                "passphrase hash exceeds {MAX_PASSPHRASE_HASH_LEN} bytes"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// The encoded hash, for persisting or sending over the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compare against a stored hash without short-circuiting on the first
    /// differing byte.
    pub fn matches(&self, stored: &str) -> bool {
        let a = self.0.as_bytes();
        let b = stored.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl fmt::Debug for PassphraseHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PassphraseHash(<redacted>)")
    }
}

//! Client-side passphrase hashing.
//!
//! Passphrases never leave the client. Instead the client sends an Argon2d
//! PHC string computed with an application-wide salt, which makes the hash
//! deterministic: the same passphrase always authenticates the same owner.
//! Owner names can optionally be hashed the same way.

use crate::owner::PassphraseHash;
use crate::{Error, Result};
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};

/// Fixed salt shared by every client.
pub const APP_SALT: &[u8] = b"-nosalt-";

/// Length of the raw Argon2 output in bytes.
pub const HASH_LENGTH: usize = 64;

/// Argon2 cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 8,
            parallelism: 4,
        }
    }
}

impl HashParams {
    /// Cheap parameters for tests. Hashes produced with these do not match
    /// hashes produced by real clients.
    pub fn for_testing() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Deterministic Argon2d hasher.
#[derive(Clone, Debug, Default)]
pub struct PassphraseHasher {
    params: HashParams,
}

impl PassphraseHasher {
    pub fn new(params: HashParams) -> Self {
        Self { params }
    }

    /// Hash `input` and return the encoded PHC string.
    pub fn encode(&self, input: &str) -> Result<String> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            Some(HASH_LENGTH),
        )
        .map_err(|e| Error::Hash(format!("invalid parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2d, Version::V0x13, params);
        let salt = SaltString::encode_b64(APP_SALT).map_err(|e| Error::Hash(e.to_string()))?;

        let hash = argon2
            .hash_password(input.as_bytes(), &salt)
            .map_err(|e| Error::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Hash a passphrase into the credential sent to the server.
    pub fn hash_passphrase(&self, passphrase: &str) -> Result<PassphraseHash> {
        if passphrase.is_empty() {
            return Err(Error::InvalidCredentials("passphrase is empty".to_string()));
        }
        PassphraseHash::parse(&self.encode(passphrase)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PassphraseHasher {
        PassphraseHasher::new(HashParams::for_testing())
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = hasher().encode("correct horse").unwrap();
        let b = hasher().encode("correct horse").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, hasher().encode("battery staple").unwrap());
    }

    #[test]
    fn encoding_is_a_phc_string() {
        let encoded = hasher().encode("secret").unwrap();
        assert!(encoded.starts_with("$argon2d$v=19$m=64,t=1,p=1$"), "{encoded}");
        // base64 of "-nosalt-" without padding
        assert!(encoded.contains("$LW5vc2FsdC0$"), "{encoded}");
    }

    #[test]
    fn default_params_match_deployed_clients() {
        let params = HashParams::default();
        assert_eq!(params.memory_kib, 65536);
        assert_eq!(params.iterations, 8);
        assert_eq!(params.parallelism, 4);
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        assert!(hasher().hash_passphrase("").is_err());
        assert!(hasher().hash_passphrase("x").is_ok());
    }
}

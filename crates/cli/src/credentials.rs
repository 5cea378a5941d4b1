//! Turning a passphrase (or a stored hash) into wire credentials.

use crate::api_client::OwnerCredentials;
use crate::sync::SyncError;
use calsnap_core::PassphraseHasher;
use std::path::Path;

/// Where the passphrase hash comes from.
#[derive(Clone)]
pub enum PassphraseInput {
    /// Raw passphrase, hashed locally before use.
    Plain(String),
    /// Hash computed earlier with the same parameters.
    Hashed(String),
}

impl PassphraseInput {
    /// Read a raw passphrase from the first line of `path`.
    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let line = contents.lines().next().unwrap_or_default();
        Ok(Self::Plain(line.to_string()))
    }
}

/// Build the credentials sent with every call. The raw passphrase never leaves
/// this function; with `hash_name` the owner name is hashed the same way.
pub fn owner_credentials(
    owner_name: &str,
    passphrase: PassphraseInput,
    hash_name: bool,
    hasher: &PassphraseHasher,
) -> Result<OwnerCredentials, SyncError> {
    let passphrase_hash = match passphrase {
        PassphraseInput::Hashed(hash) => hash,
        PassphraseInput::Plain(plain) => hasher
            .hash_passphrase(&plain)
            .map_err(SyncError::Hash)?
            .expose()
            .to_string(),
    };
    let owner_name = if hash_name {
        hasher.encode(owner_name).map_err(SyncError::Hash)?
    } else {
        owner_name.to_string()
    };
    Ok(OwnerCredentials {
        owner_name,
        passphrase_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calsnap_core::HashParams;

    fn hasher() -> PassphraseHasher {
        PassphraseHasher::new(HashParams::for_testing())
    }

    #[test]
    fn plain_passphrase_is_hashed() {
        let creds =
            owner_credentials("alice", PassphraseInput::Plain("pw".into()), false, &hasher())
                .unwrap();
        assert_eq!(creds.owner_name, "alice");
        assert!(creds.passphrase_hash.starts_with("$argon2d$"));
        assert_ne!(creds.passphrase_hash, "pw");
    }

    #[test]
    fn prehashed_passphrase_passes_through() {
        let creds = owner_credentials(
            "alice",
            PassphraseInput::Hashed("precomputed".into()),
            false,
            &hasher(),
        )
        .unwrap();
        assert_eq!(creds.passphrase_hash, "precomputed");
    }

    #[test]
    fn hash_name_is_deterministic() {
        let a = owner_credentials("alice", PassphraseInput::Hashed("h".into()), true, &hasher())
            .unwrap();
        let b = owner_credentials("alice", PassphraseInput::Hashed("h".into()), true, &hasher())
            .unwrap();
        assert_ne!(a.owner_name, "alice");
        assert_eq!(a.owner_name, b.owner_name);
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        let err = owner_credentials("alice", PassphraseInput::Plain(String::new()), false, &hasher())
            .unwrap_err();
        assert!(matches!(err, SyncError::Hash(_)));
    }

    #[tokio::test]
    async fn passphrase_file_uses_first_line() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("pass");
        std::fs::write(&path, "secret\nignored\n").unwrap();
        let PassphraseInput::Plain(value) = PassphraseInput::from_file(&path).await.unwrap() else {
            panic!("expected plain passphrase");
        };
        assert_eq!(value, "secret");
    }
}

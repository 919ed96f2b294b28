//! Pluggable hashing and cipher capability for string fields.
//!
//! `hashed` fields call [`FieldCrypto::hash`]; `encrypted` fields call
//! [`FieldCrypto::encrypt`]. A schema without a capability rejects both with a
//! field error rather than storing the plain value.

use sha2::{Digest, Sha256};
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("{0} is not supported by this crypto provider")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

pub trait FieldCrypto: Send + Sync {
    /// One-way hash of `plain`.
    fn hash(&self, plain: &str) -> Result<String, CryptoError>;

    /// Reversible cipher of `plain`.
    fn encrypt(&self, plain: &str) -> Result<String, CryptoError>;
}

/// Salted SHA-256 digest rendered as lowercase hex. Hash only.
#[derive(Debug, Clone, Default)]
pub struct Sha256Digest {
    salt: Vec<u8>,
}

impl Sha256Digest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_salt(salt: impl Into<Vec<u8>>) -> Self {
        Self { salt: salt.into() }
    }
}

impl FieldCrypto for Sha256Digest {
    fn hash(&self, plain: &str) -> Result<String, CryptoError> {
        let mut hasher = Sha256::new();
        hasher.update(&self.salt);
        hasher.update(plain.as_bytes());

        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            write!(out, "{byte:02x}").map_err(|e| CryptoError::Failed(e.to_string()))?;
        }
        Ok(out)
    }

    fn encrypt(&self, _plain: &str) -> Result<String, CryptoError> {
        Err(CryptoError::Unsupported("encryption"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_known_input() {
        let digest = Sha256Digest::new().hash("abc").unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn salt_changes_the_digest() {
        let plain = Sha256Digest::new().hash("secret").unwrap();
        let salted = Sha256Digest::with_salt("pepper").hash("secret").unwrap();
        assert_ne!(plain, salted);
        assert_eq!(salted.len(), 64);
    }

    #[test]
    fn encryption_is_unsupported() {
        assert_eq!(
            Sha256Digest::new().encrypt("x"),
            Err(CryptoError::Unsupported("encryption"))
        );
    }
}

//! Credential hashing and verification using Argon2
//!
//! Hashes are salted per call, so hashing the same secret twice yields two
//! different strings that both verify.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

use crate::types::IdentityError;

/// One-way hashing primitive consumed by the engine
pub trait CredentialHasher: Send + Sync {
    /// Hash a secret into a self-describing digest string
    fn hash(&self, secret: &str) -> Result<String, IdentityError>;

    /// Check a secret against a stored digest
    fn verify(&self, secret: &str, digest: &str) -> Result<bool, IdentityError>;
}

/// Argon2id hasher with configurable cost
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Argon2Hasher {
    /// Custom memory (KiB) and iteration cost, single lane
    pub fn with_params(memory_kib: u32, iterations: u32) -> Result<Self, IdentityError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| IdentityError::Config(format!("Invalid Argon2 parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, IdentityError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| IdentityError::Hashing(format!("Failed to hash credential: {e}")))
    }

    /// Parameters are read from the digest itself, so hashes written with an
    /// older cost setting keep verifying.
    fn verify(&self, secret: &str, digest: &str) -> Result<bool, IdentityError> {
        let parsed_hash = PasswordHash::new(digest)
            .map_err(|e| IdentityError::Hashing(format!("Invalid credential hash format: {e}")))?;

        Ok(self
            .argon2()
            .verify_password(secret.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

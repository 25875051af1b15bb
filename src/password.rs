//! Password hashing with Argon2id.
//!
//! Digests are PHC strings, so each one records its own algorithm, version,
//! cost parameters and salt. Verification always reads the parameters from
//! the digest, which lets the configured cost change without invalidating
//! hashes produced under an older setting.

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier, Version};
use rand::RngCore;

/// Salt length in bytes.
const SALT_LEN: usize = 16;

/// Salt for `verify_absent`. Its output is never compared with anything.
const ABSENT_SALT: &[u8; SALT_LEN] = b"rolodex-no-user!";

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Invalid hash cost: {0}")]
    InvalidCost(argon2::Error),
    #[error("Failed to hash password: {0}")]
    Hash(argon2::password_hash::Error),
}

/// One-way password hasher with a fixed cost.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    cost: HashCost,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(PasswordError::InvalidCost)?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            cost,
        })
    }

    pub fn cost(&self) -> HashCost {
        self.cost
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordError::Hash)?;

        let digest = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(PasswordError::Hash)?;

        Ok(digest.to_string())
    }

    /// Check a password against a stored digest.
    /// A digest that cannot be parsed simply fails verification.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Spend the same work as `verify` when there is no digest to check
    /// against, so a missing account takes as long as a wrong password.
    /// Always returns false.
    pub fn verify_absent(&self, password: &str) -> bool {
        let mut out = [0u8; Params::DEFAULT_OUTPUT_LEN];
        let _ = self
            .argon2
            .hash_password_into(password.as_bytes(), ABSENT_SALT, &mut out);
        false
    }
}

use std::sync::Arc;

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use tracing::warn;

use crate::core::config::PasswordConfig;

/// Argon2id hashing for stored credentials.
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow!("Invalid Argon2 parameters: {e}"))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn from_config(config: &PasswordConfig) -> Result<Self> {
        Self::new(config.memory_kib, config.iterations, config.parallelism)
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed_hash =
            PasswordHash::new(hash).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;

        match self.argon2.verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow!("Password verification failed: {e}")),
        }
    }

    /// Verification for login paths: an unreadable hash counts as a failed
    /// attempt and is logged.
    pub fn matches(&self, password: &str, hash: &str) -> bool {
        self.verify(password, hash).unwrap_or_else(|e| {
            warn!("Stored password hash rejected: {e}");
            false
        })
    }
}

/// Runs [`PasswordHasher::hash`] off the async executor.
pub async fn hash_blocking(hasher: Arc<PasswordHasher>, password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| anyhow!("Password hashing task failed: {e}"))?
}

/// Runs [`PasswordHasher::matches`] off the async executor.
pub async fn matches_blocking(hasher: Arc<PasswordHasher>, password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || hasher.matches(&password, &hash))
        .await
        .unwrap_or_else(|e| {
            warn!("Password verification task failed: {e}");
            false
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_hasher() -> PasswordHasher {
        PasswordHasher::new(1024, 1, 1).expect("valid params")
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = create_test_hasher();
        let hash = hasher.hash("p1").expect("hash");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("p1", &hash).expect("verify"));
        assert!(!hasher.verify("p2", &hash).expect("verify"));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = create_test_hasher();
        let a = hasher.hash("same").expect("hash");
        let b = hasher.hash("same").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash() {
        let hasher = create_test_hasher();
        assert!(hasher.verify("p1", "not-a-hash").is_err());
        assert!(!hasher.matches("p1", "not-a-hash"));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(PasswordHasher::new(1, 1, 1).is_err());
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let hasher = Arc::new(create_test_hasher());
        let hash = hash_blocking(hasher.clone(), "secret".to_string())
            .await
            .expect("hash");
        assert!(matches_blocking(hasher.clone(), "secret".to_string(), hash.clone()).await);
        assert!(!matches_blocking(hasher, "nope".to_string(), hash).await);
    }
}

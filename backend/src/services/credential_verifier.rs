//! Password hashing and verification.
//!
//! bcrypt is CPU bound, so every call is moved onto the blocking pool instead
//! of stalling the async workers.

use crate::errors::{ServiceError, ServiceResult};
use bcrypt::{hash, verify};

/// Valid bcrypt hash of a random string; compared against on the
/// "no such identity" path so that it costs as much as a real mismatch.
const DUMMY_HASH: &str = "$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";

#[derive(Debug, Clone, Copy)]
pub struct CredentialVerifier {
    cost: u32,
}

impl CredentialVerifier {
    /// Creates a verifier hashing new passwords with `cost`.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Checks a plaintext password against a stored hash.
    ///
    /// A malformed stored hash counts as a mismatch.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let password = password.to_string();
        let stored_hash = stored_hash.to_string();

        let outcome = tokio::task::spawn_blocking(move || verify(password, &stored_hash)).await;
        match outcome {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::warn!("Stored password hash could not be checked: {}", e);
                false
            }
            Err(e) => {
                tracing::error!("Password verification task failed: {}", e);
                false
            }
        }
    }

    /// Burns one comparison; always `false`.
    pub async fn verify_dummy(&self, password: &str) -> bool {
        self.verify(password, DUMMY_HASH).await;
        false
    }

    /// Hashes a password before storing it in the database.
    pub async fn hash(&self, password: &str) -> ServiceResult<String> {
        let password = password.to_string();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| ServiceError::internal_error(format!("Password hashing task failed: {}", e)))?
            .map_err(|e| ServiceError::internal_error(format!("Password hashing failed: {}", e)))
    }
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

//! Second-factor challenge lookups.
//!
//! Challenges are issued and delivered elsewhere; this repository only
//! redeems them.

use crate::repositories::SecondFactorVerifier;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct MfaRepository {
    pool: SqlitePool,
}

impl MfaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecondFactorVerifier for MfaRepository {
    async fn verify_code(&self, user_id: &str, code: &str) -> Result<bool> {
        // Single statement so two racing redemptions cannot both succeed.
        let result = sqlx::query(
            r#"
            UPDATE mfa_challenges SET consumed_at = CURRENT_TIMESTAMP
            WHERE id = (
                SELECT id FROM mfa_challenges
                WHERE user_id = ? AND code = ? AND consumed_at IS NULL
                  AND datetime(expires_at) > datetime('now')
                ORDER BY id DESC
                LIMIT 1
            )
            "#,
        )
        .bind(user_id)
        .bind(code.trim())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

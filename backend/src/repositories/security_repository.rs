//! Database repository for login security policies.
//!
//! Provides the IP allow-list and trusted device lookups evaluated during
//! login.

use crate::repositories::SecurityPolicy;
use crate::utils::network::ip_matches;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::net::IpAddr;

#[derive(Clone)]
pub struct SecurityRepository {
    pool: SqlitePool,
}

impl SecurityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Active allow-list entries for a company, or the global list when
    /// `company_id` is `None`.
    pub async fn get_allowlist(&self, company_id: Option<&str>) -> Result<Vec<String>> {
        let entries = sqlx::query_scalar::<_, String>(
            "SELECT cidr FROM ip_allowlist WHERE is_active = 1 AND company_id IS ?",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

#[async_trait]
impl SecurityPolicy for SecurityRepository {
    async fn is_ip_allowed(&self, company_id: Option<&str>, ip: Option<IpAddr>) -> Result<bool> {
        let entries = self.get_allowlist(company_id).await?;
        if entries.is_empty() {
            return Ok(true);
        }

        // A restricted tenant cannot be reached from an unknown address.
        let Some(ip) = ip else {
            return Ok(false);
        };

        Ok(entries.iter().any(|entry| ip_matches(entry, ip)))
    }

    async fn is_device_trusted(&self, user_id: &str, fingerprint: Option<&str>) -> Result<bool> {
        let Some(fingerprint) = fingerprint else {
            return Ok(false);
        };

        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM trusted_devices
            WHERE user_id = ? AND fingerprint = ? AND datetime(trusted_until) > datetime('now')
            "#,
        )
        .bind(user_id)
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

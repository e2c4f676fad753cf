//! Settings store backed by the `system_settings` table.

use crate::database::models::RoleLevel;
use crate::repositories::SettingsProvider;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::str::FromStr;

pub const DEFAULT_SESSION_TIMEOUT_HOURS: u64 = 24;
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: u32 = 3;
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

/// One year.
pub const MAX_SESSION_TIMEOUT_HOURS: u64 = 8760;
const MAX_CONCURRENT_SESSIONS_LIMIT: u32 = 1000;
/// bcrypt only reads the first 72 bytes of a password.
const MAX_MIN_PASSWORD_LENGTH: usize = 72;

const SESSION_TIMEOUT_HOURS: &str = "session_timeout_hours";
const MAX_CONCURRENT_SESSIONS: &str = "max_concurrent_sessions";
const MIN_PASSWORD_LENGTH: &str = "min_password_length";
const MFA_ENFORCED_MIN_LEVEL: &str = "mfa_enforced_min_level";

#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Raw value of a setting, `None` when the key is absent.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM system_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Upserts a setting.
    #[cfg(test)]
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Parses a setting in `1..=max`, falling back to `default` on any problem.
    async fn bounded_or<T>(&self, key: &str, default: T, max: T) -> T
    where
        T: FromStr + PartialOrd + Default + Copy + std::fmt::Display,
    {
        match self.get_setting(key).await {
            Ok(Some(raw)) => match raw.trim().parse::<T>() {
                Ok(value) if value > T::default() && value <= max => value,
                _ => {
                    tracing::warn!(
                        "Setting {} has invalid value {:?}, using default {}",
                        key,
                        raw,
                        default
                    );
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                tracing::warn!("Failed to read setting {}: {}. Using default {}", key, e, default);
                default
            }
        }
    }
}

#[async_trait]
impl SettingsProvider for SettingsRepository {
    async fn session_timeout_hours(&self) -> u64 {
        self.bounded_or(
            SESSION_TIMEOUT_HOURS,
            DEFAULT_SESSION_TIMEOUT_HOURS,
            MAX_SESSION_TIMEOUT_HOURS,
        )
        .await
    }

    async fn max_concurrent_sessions(&self) -> u32 {
        self.bounded_or(
            MAX_CONCURRENT_SESSIONS,
            DEFAULT_MAX_CONCURRENT_SESSIONS,
            MAX_CONCURRENT_SESSIONS_LIMIT,
        )
        .await
    }

    async fn min_password_length(&self) -> usize {
        self.bounded_or(
            MIN_PASSWORD_LENGTH,
            DEFAULT_MIN_PASSWORD_LENGTH,
            MAX_MIN_PASSWORD_LENGTH,
        )
        .await
    }

    async fn mfa_enforced_min_level(&self) -> Option<RoleLevel> {
        match self.get_setting(MFA_ENFORCED_MIN_LEVEL).await {
            Ok(Some(raw)) => match raw.trim().parse::<i64>() {
                Ok(level) => Some(RoleLevel(level)),
                Err(_) => {
                    tracing::warn!("Setting {} has invalid value {:?}, not enforcing", MFA_ENFORCED_MIN_LEVEL, raw);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read setting {}: {}", MFA_ENFORCED_MIN_LEVEL, e);
                None
            }
        }
    }
}

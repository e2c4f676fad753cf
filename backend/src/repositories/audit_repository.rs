//! Database-backed audit sink.
//!
//! Writes login attempts to `login_audit` and generic actions to `audit_log`.

use crate::database::models::{ActionAudit, LoginAudit};
use crate::repositories::AuditSink;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for AuditRepository {
    async fn record_login(&self, entry: LoginAudit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_audit (user_id, email, ip_address, user_agent, status, failure_reason)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.email)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .bind(entry.status.as_str())
        .bind(entry.failure_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_action(&self, entry: ActionAudit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, action, table_name, schema_name, record_id, ip_address, user_agent)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(entry.table_name)
        .bind(entry.schema_name)
        .bind(entry.record_id)
        .bind(entry.ip_address)
        .bind(entry.user_agent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

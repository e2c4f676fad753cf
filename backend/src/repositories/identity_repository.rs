//! Database repository for identities and role assignments.
//!
//! Provides the reads the login flow and tenant scope resolution depend on,
//! plus the two writes login-adjacent flows perform (last login, password).

use crate::database::models::{Company, Identity, IdentityWithRoles, RoleAssignment};
use crate::repositories::IdentityStore;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Repository for identity database operations.
#[derive(Clone)]
pub struct IdentityRepository {
    /// Shared SQLite connection pool
    pool: SqlitePool,
}

impl IdentityRepository {
    /// Creates a new IdentityRepository instance.
    ///
    /// # Arguments
    /// * `pool` - SQLite connection pool (cheap to clone)
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Retrieves an identity by email.
    ///
    /// The `email` column is declared `COLLATE NOCASE`, so the comparison is
    /// case-insensitive.
    ///
    /// # Returns
    /// `Some(Identity)` if found and not deleted, `None` otherwise
    pub async fn get_identity_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            SELECT id, email, password_hash, first_name, last_name,
                   is_active, is_locked, mfa_enabled
            FROM users
            WHERE email = ? AND is_deleted = 0
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    /// Retrieves an identity by its unique identifier.
    pub async fn get_identity_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            SELECT id, email, password_hash, first_name, last_name,
                   is_active, is_locked, mfa_enabled
            FROM users
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    /// Retrieves the active role assignments of a user, most privileged first.
    pub async fn get_role_assignments(&self, user_id: &str) -> Result<Vec<RoleAssignment>> {
        let assignments = sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT ra.id, ra.user_id, ra.role_id, r.name AS role_name, r.level,
                   ra.company_id, ra.branch_id
            FROM role_assignments ra
            JOIN roles r ON r.id = ra.role_id
            WHERE ra.user_id = ? AND ra.is_active = 1
            ORDER BY r.level DESC, ra.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assignments)
    }
}

#[async_trait]
impl IdentityStore for IdentityRepository {
    async fn find_identity_with_roles(&self, email: &str) -> Result<Option<IdentityWithRoles>> {
        let Some(identity) = self.get_identity_by_email(email).await? else {
            return Ok(None);
        };
        let assignments = self.get_role_assignments(&identity.id).await?;

        Ok(Some(IdentityWithRoles {
            identity,
            assignments,
        }))
    }

    async fn find_identity_by_id(&self, user_id: &str) -> Result<Option<Identity>> {
        self.get_identity_by_id(user_id).await
    }

    async fn find_email_by_code(&self, code: &str) -> Result<Option<String>> {
        let email = sqlx::query_scalar::<_, String>(
            "SELECT email FROM students WHERE UPPER(student_code) = ? AND is_deleted = 0",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(email)
    }

    async fn role_assignments(&self, user_id: &str) -> Result<Vec<RoleAssignment>> {
        self.get_role_assignments(user_id).await
    }

    async fn is_company_active(&self, company_id: &str) -> Result<bool> {
        let company = sqlx::query_as::<_, Company>(
            "SELECT id, name, is_active FROM companies WHERE id = ? AND is_deleted = 0",
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(company.is_some_and(|company| company.is_active))
    }

    async fn touch_last_login(&self, user_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET last_login_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND is_deleted = 0",
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("no user row updated for {}", user_id);
        }

        Ok(())
    }
}

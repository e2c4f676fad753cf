//! Persistence ports used by the authentication core and their SQLite
//! implementations.
//!
//! The login flow and the tenant scope resolver only see the traits below, so
//! tests can swap in in-memory fakes and deployments can back them with any
//! store.

use crate::database::models::{ActionAudit, Identity, IdentityWithRoles, LoginAudit, RoleAssignment, RoleLevel};
use anyhow::Result;
use async_trait::async_trait;
use std::net::IpAddr;

pub mod audit_repository;
pub mod identity_repository;
pub mod mfa_repository;
pub mod security_repository;
pub mod settings_repository;

/// Read/write access to identities and their role assignments.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Looks an identity up by (case-insensitive) email, with its active
    /// role assignments.
    async fn find_identity_with_roles(&self, email: &str) -> Result<Option<IdentityWithRoles>>;

    async fn find_identity_by_id(&self, user_id: &str) -> Result<Option<Identity>>;

    /// Resolves an alternate login code (e.g. a student code) to an email.
    async fn find_email_by_code(&self, code: &str) -> Result<Option<String>>;

    /// Active role assignments of a user.
    async fn role_assignments(&self, user_id: &str) -> Result<Vec<RoleAssignment>>;

    /// `false` when the company is inactive or does not exist.
    async fn is_company_active(&self, company_id: &str) -> Result<bool>;

    async fn touch_last_login(&self, user_id: &str) -> Result<()>;

    async fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<()>;
}

/// Tenant/global settings, read fresh on every call.
///
/// Implementations fall back to defaults instead of failing: a broken
/// settings row must not lock everybody out.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn session_timeout_hours(&self) -> u64;

    async fn max_concurrent_sessions(&self) -> u32;

    async fn min_password_length(&self) -> usize;

    /// Role level from which a second factor is mandatory, if enforced.
    async fn mfa_enforced_min_level(&self) -> Option<RoleLevel>;
}

/// IP allow-list and device trust lookups.
#[async_trait]
pub trait SecurityPolicy: Send + Sync {
    /// An empty allow-list admits every address.
    async fn is_ip_allowed(&self, company_id: Option<&str>, ip: Option<IpAddr>) -> Result<bool>;

    async fn is_device_trusted(&self, user_id: &str, fingerprint: Option<&str>) -> Result<bool>;
}

/// Checks a second-factor code issued by the challenge delivery flow.
#[async_trait]
pub trait SecondFactorVerifier: Send + Sync {
    /// Returns `true` and consumes the challenge when the code is valid.
    async fn verify_code(&self, user_id: &str, code: &str) -> Result<bool>;
}

/// Destination of login and generic action audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_login(&self, entry: LoginAudit) -> Result<()>;

    async fn record_action(&self, entry: ActionAudit) -> Result<()>;
}

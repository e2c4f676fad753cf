//! Rust structs that represent database table mappings.
//!
//! These models define the structure of data as it is stored in and retrieved
//! from the database. Note that these may differ from API-specific models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Numeric privilege level of a role. Higher is more privileged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct RoleLevel(pub i64);

impl RoleLevel {
    pub const UNASSIGNED: RoleLevel = RoleLevel(0);
    pub const BRANCH_ADMIN: RoleLevel = RoleLevel(1);
    pub const COMPANY_ADMIN: RoleLevel = RoleLevel(4);
    pub const PLATFORM_ADMIN: RoleLevel = RoleLevel(5);

    pub fn is_platform(self) -> bool {
        self >= Self::PLATFORM_ADMIN
    }

    pub fn is_company(self) -> bool {
        self >= Self::COMPANY_ADMIN && self < Self::PLATFORM_ADMIN
    }
}

impl fmt::Display for RoleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A login-capable account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_locked: bool,
    pub mfa_enabled: bool,
}

/// A role granted to an identity at a company/branch scope, joined with the
/// role catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoleAssignment {
    pub id: i64,
    pub user_id: String,
    pub role_id: String,
    pub role_name: String,
    pub level: RoleLevel,
    pub company_id: Option<String>,
    pub branch_id: Option<String>,
}

impl RoleAssignment {
    /// Platform roles are global, company roles carry only a company, and
    /// everything below company level is pinned to a branch.
    pub fn has_consistent_scope(&self) -> bool {
        if self.level.is_platform() {
            self.company_id.is_none() && self.branch_id.is_none()
        } else if self.level.is_company() {
            self.company_id.is_some() && self.branch_id.is_none()
        } else {
            self.company_id.is_some() && self.branch_id.is_some()
        }
    }
}

/// An identity together with its active role assignments.
#[derive(Debug, Clone)]
pub struct IdentityWithRoles {
    pub identity: Identity,
    pub assignments: Vec<RoleAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginStatus {
    Success,
    Failed,
}

impl LoginStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LoginStatus::Success => "SUCCESS",
            LoginStatus::Failed => "FAILED",
        }
    }
}

/// One row of the login audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAudit {
    pub user_id: Option<String>,
    pub email: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: LoginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// One row of the generic action audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAudit {
    pub user_id: String,
    pub action: String,
    pub table_name: String,
    pub schema_name: String,
    pub record_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

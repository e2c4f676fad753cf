//! Data structures for authentication-related entities.
//!
//! Request payloads are validated with `validator` before they reach the
//! service; every payload crossing the wire uses camelCase field names.

use crate::cache::SessionRecord;
use crate::database::models::{Identity, RoleLevel};
use crate::services::tenant_scope::{ScopeFilter, TenantScope};
use crate::utils::jwt::TokenPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Email is required".into());
        return Err(error);
    }
    Ok(())
}

/// Login request payload
///
/// `email` also accepts an alternate login code (student code).
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(custom(function = "not_blank"))]
    pub email: String,

    /// Minimum length is a runtime setting, checked by the service.
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Second factor code, sent on the second pass of an MFA login.
    #[serde(default)]
    pub mfa_code: Option<String>,
}

/// User information returned in the login response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Most privileged first
    pub roles: Vec<String>,
    pub role_level: RoleLevel,
    pub company_id: Option<String>,
    pub branch_id: Option<String>,
}

impl UserInfo {
    pub fn new(identity: &Identity, roles: Vec<String>, scope: &TenantScope) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            roles,
            role_level: scope.role_level,
            company_id: scope.company_id.clone(),
            branch_id: scope.branch_id.clone(),
        }
    }
}

/// Successful login: user info plus a token pair bound to a new session.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserInfo,
    pub tokens: TokenPair,
}

/// Credentials were fine but a second factor is still needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaChallenge {
    pub mfa_required: bool,
    pub email: String,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    Authenticated(LoginResponse),
    MfaRequired(MfaChallenge),
}

/// Token refresh request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Token refresh response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

/// Password change request. The minimum length of `new_password` comes from
/// the settings store, not from this payload's validation.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

/// Caller identity established by the authorization middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub roles: Vec<String>,
    pub session_id: String,
}

/// Current session and freshly resolved scope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<String>,
    pub session_id: String,
    pub login_at: DateTime<Utc>,
    pub scope: TenantScope,
}

impl MeResponse {
    pub fn new(session: SessionRecord, scope: TenantScope) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email,
            first_name: session.first_name,
            last_name: session.last_name,
            roles: session.roles,
            session_id: session.session_id,
            login_at: session.login_at,
            scope,
        }
    }
}

/// Caller scope together with the row filter derived from it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeResponse {
    pub scope: TenantScope,
    pub filter: ScopeFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedSessions {
    pub revoked: usize,
}

//! Core business logic for the authentication system.
//!
//! [`AuthService::login`] is the only way a session comes into existence.
//! It runs in this order:
//!
//! 1. payload validation;
//! 2. identifier resolution (student codes are mapped to an email);
//! 3. identity, session timeout, session limit and minimum password length,
//!    fetched together, then the password length check;
//! 4. password, company status, IP allow-list, device trust and the second
//!    factor policy, fetched together;
//! 5. status gates, each producing exactly one failed audit record;
//! 6. second factor;
//! 7. concurrency enforcement and the session write, both awaited;
//! 8. audit and `last_login_at`, spawned;
//! 9. token issuance.
//!
//! An unknown identifier and a wrong password produce the same error, and the
//! unknown path still pays for one bcrypt comparison.

use crate::auth::models::*;
use crate::cache::{SessionCache, SessionRecord};
use crate::database::models::{ActionAudit, Identity, IdentityWithRoles, LoginAudit, LoginStatus, RoleAssignment, RoleLevel};
use crate::errors::{AuthFailure, ServiceError, ServiceResult};
use crate::repositories::settings_repository::MAX_SESSION_TIMEOUT_HOURS;
use crate::repositories::{AuditSink, IdentityStore, SecondFactorVerifier, SecurityPolicy, SettingsProvider};
use crate::services::credential_verifier::CredentialVerifier;
use crate::services::tenant_scope::{TenantScope, TenantScopeResolver, sort_by_privilege, usable_assignments};
use crate::utils::jwt::{TokenCodec, TokenType};
use crate::utils::network::ClientContext;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

pub const ACTION_LOGIN: &str = "LOGIN";
pub const ACTION_LOGOUT: &str = "LOGOUT";
pub const ACTION_PASSWORD_CHANGE: &str = "PASSWORD_CHANGE";
pub const ACTION_FORCE_LOGOUT: &str = "FORCE_LOGOUT";

const AUDIT_TABLE: &str = "users";
const AUDIT_SCHEMA: &str = "public";

/// Collaborators of [`AuthService`].
pub struct AuthDependencies {
    pub identities: Arc<dyn IdentityStore>,
    pub settings: Arc<dyn SettingsProvider>,
    pub security: Arc<dyn SecurityPolicy>,
    pub second_factor: Arc<dyn SecondFactorVerifier>,
    pub audit: Arc<dyn AuditSink>,
    pub sessions: SessionCache,
    pub tokens: TokenCodec,
    pub credentials: CredentialVerifier,
}

/// Authentication service for login, token refresh and session management
#[derive(Clone)]
pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    settings: Arc<dyn SettingsProvider>,
    security: Arc<dyn SecurityPolicy>,
    second_factor: Arc<dyn SecondFactorVerifier>,
    audit: Arc<dyn AuditSink>,
    sessions: SessionCache,
    tokens: TokenCodec,
    credentials: CredentialVerifier,
    scopes: TenantScopeResolver,
}

impl AuthService {
    pub fn new(deps: AuthDependencies) -> Self {
        let scopes = TenantScopeResolver::new(Arc::clone(&deps.identities));

        AuthService {
            identities: deps.identities,
            settings: deps.settings,
            security: deps.security,
            second_factor: deps.second_factor,
            audit: deps.audit,
            sessions: deps.sessions,
            tokens: deps.tokens,
            credentials: deps.credentials,
            scopes,
        }
    }

    /// Authenticates a user and opens a session.
    ///
    /// Returns [`LoginOutcome::MfaRequired`] without creating anything when a
    /// second factor is needed and `mfa_code` was not supplied.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientContext,
    ) -> ServiceResult<LoginOutcome> {
        request
            .validate()
            .map_err(|e| ServiceError::from_validation_errors(&e))?;

        let email = self.resolve_login_email(&request.email).await;

        let (found, timeout_hours, max_sessions, min_password_length) = tokio::join!(
            self.identities.find_identity_with_roles(&email),
            self.settings.session_timeout_hours(),
            self.settings.max_concurrent_sessions(),
            self.settings.min_password_length(),
        );

        if request.password.chars().count() < min_password_length {
            return Err(ServiceError::validation(format!(
                "password: Password must be at least {} characters",
                min_password_length
            )));
        }

        let Some(IdentityWithRoles {
            identity,
            assignments,
        }) = found?
        else {
            self.credentials.verify_dummy(&request.password).await;
            return Err(self
                .reject(None, &email, client, "User not found", ServiceError::InvalidCredentials)
                .await);
        };

        let mut assignments = usable_assignments(assignments);
        sort_by_privilege(&mut assignments);
        let scope = primary_scope(&assignments);
        let roles = role_names(&assignments);

        let company_status = async {
            match scope.company_id.as_deref() {
                Some(company_id) if !scope.role_level.is_platform() => {
                    self.identities.is_company_active(company_id).await
                }
                _ => Ok(true),
            }
        };
        let device_trust = async {
            self.security
                .is_device_trusted(&identity.id, client.device_fingerprint.as_deref())
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Device trust lookup failed for user {}: {}", identity.id, e);
                    false
                })
        };

        let (password_ok, company_active, ip_allowed, device_trusted, mfa_min_level) = tokio::join!(
            self.credentials.verify(&request.password, &identity.password_hash),
            company_status,
            self.security
                .is_ip_allowed(scope.company_id.as_deref(), client.ip_address),
            device_trust,
            self.settings.mfa_enforced_min_level(),
        );

        let user_id = Some(identity.id.as_str());
        if !password_ok {
            return Err(self
                .reject(user_id, &email, client, "Invalid password", ServiceError::InvalidCredentials)
                .await);
        }
        if !company_active? {
            return Err(self
                .reject(user_id, &email, client, "Company suspended", ServiceError::CompanySuspended)
                .await);
        }
        if identity.is_locked {
            return Err(self
                .reject(user_id, &email, client, "Account locked", ServiceError::AccountLocked)
                .await);
        }
        if !identity.is_active {
            return Err(self
                .reject(user_id, &email, client, "Account inactive", ServiceError::AccountInactive)
                .await);
        }
        if !ip_allowed? {
            return Err(self
                .reject(user_id, &email, client, "IP address not allowed", ServiceError::UnauthorizedIp)
                .await);
        }

        let mfa_enforced = mfa_min_level.is_some_and(|min| scope.role_level >= min);
        if (identity.mfa_enabled || mfa_enforced) && !device_trusted {
            let code = request
                .mfa_code
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty());
            let Some(code) = code else {
                tracing::info!("Second factor required for user {}", identity.id);
                return Ok(LoginOutcome::MfaRequired(MfaChallenge {
                    mfa_required: true,
                    email: identity.email.clone(),
                    user_id: identity.id.clone(),
                }));
            };
            if !self.second_factor.verify_code(&identity.id, code).await? {
                return Err(self
                    .reject(
                        user_id,
                        &email,
                        client,
                        "Invalid second factor code",
                        ServiceError::InvalidMfaCode,
                    )
                    .await);
            }
        }

        let session_ttl = session_ttl(timeout_hours);
        let session = SessionRecord {
            user_id: identity.id.clone(),
            email: identity.email.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            roles: roles.clone(),
            session_id: Uuid::new_v4().to_string(),
            login_at: Utc::now(),
        };

        tokio::try_join!(
            self.sessions.enforce_max_concurrency(&session, max_sessions),
            self.sessions.put(&session, session_ttl),
        )?;

        self.spawn_login_side_effects(&identity, &email, client);

        let tokens = self.tokens.issue_pair(
            &identity.id,
            &identity.email,
            &roles,
            session_ttl,
            &session.session_id,
        )?;

        tracing::info!(
            "User {} logged in (session {}, level {})",
            identity.id,
            session.session_id,
            scope.role_level
        );

        Ok(LoginOutcome::Authenticated(LoginResponse {
            user: UserInfo::new(&identity, roles, &scope),
            tokens,
        }))
    }

    /// Issues a new access token for a live session and slides its expiry.
    pub async fn refresh_token(
        &self,
        request: RefreshTokenRequest,
    ) -> ServiceResult<RefreshTokenResponse> {
        request
            .validate()
            .map_err(|e| ServiceError::from_validation_errors(&e))?;

        let claims = self
            .tokens
            .verify_refresh(&request.refresh_token)
            .ok_or(ServiceError::authentication(AuthFailure::InvalidToken))?;

        let (session, identity, assignments, timeout_hours) = tokio::join!(
            self.sessions.get(claims.user_id(), claims.session_id()),
            self.identities.find_identity_by_id(claims.user_id()),
            self.identities.role_assignments(claims.user_id()),
            self.settings.session_timeout_hours(),
        );

        let mut session =
            session?.ok_or(ServiceError::authentication(AuthFailure::SessionExpired))?;

        let gate = match identity? {
            None => Some(ServiceError::authentication(AuthFailure::InvalidToken)),
            Some(identity) if identity.is_locked => Some(ServiceError::AccountLocked),
            Some(identity) if !identity.is_active => Some(ServiceError::AccountInactive),
            Some(_) => None,
        };
        if let Some(error) = gate {
            tracing::warn!(
                "Refresh refused for user {}: {}; closing session {}",
                claims.user_id(),
                error,
                claims.session_id()
            );
            self.sessions
                .remove(claims.user_id(), claims.session_id())
                .await?;
            return Err(error);
        }

        let mut assignments = usable_assignments(assignments?);
        sort_by_privilege(&mut assignments);
        session.roles = role_names(&assignments);

        let session_ttl = session_ttl(timeout_hours);
        self.sessions.put(&session, session_ttl).await?;

        let access_token = self.tokens.issue(
            &session.user_id,
            &session.email,
            &session.roles,
            session_ttl,
            &session.session_id,
            TokenType::Access,
        )?;

        Ok(RefreshTokenResponse {
            access_token,
            expires_in: session_ttl.as_secs(),
        })
    }

    /// Ends the caller's session.
    pub async fn logout(&self, user: &AuthenticatedUser, client: &ClientContext) -> ServiceResult<()> {
        self.sessions.remove(&user.user_id, &user.session_id).await?;
        self.spawn_action(action_entry(&user.user_id, ACTION_LOGOUT, None, client));
        tracing::info!("User {} logged out of session {}", user.user_id, user.session_id);

        Ok(())
    }

    /// Ends every session of the caller. Returns how many were closed.
    pub async fn logout_all(
        &self,
        user: &AuthenticatedUser,
        client: &ClientContext,
    ) -> ServiceResult<usize> {
        let revoked = self.sessions.remove_all(&user.user_id).await?;
        self.spawn_action(action_entry(&user.user_id, ACTION_LOGOUT, None, client));
        tracing::info!("User {} logged out of {} session(s)", user.user_id, revoked);

        Ok(revoked)
    }

    /// Replaces the caller's password and closes their other sessions.
    ///
    /// Returns how many other sessions were closed.
    pub async fn change_password(
        &self,
        user: &AuthenticatedUser,
        request: ChangePasswordRequest,
        client: &ClientContext,
    ) -> ServiceResult<usize> {
        request
            .validate()
            .map_err(|e| ServiceError::from_validation_errors(&e))?;

        let (identity, min_length) = tokio::join!(
            self.identities.find_identity_by_id(&user.user_id),
            self.settings.min_password_length(),
        );
        let identity = identity?.ok_or_else(|| ServiceError::not_found("User", &user.user_id))?;

        if request.new_password.chars().count() < min_length {
            return Err(ServiceError::validation(format!(
                "newPassword: Password must be at least {} characters",
                min_length
            )));
        }
        if request.new_password == request.current_password {
            return Err(ServiceError::validation(
                "newPassword: New password must differ from the current one",
            ));
        }
        if !self
            .credentials
            .verify(&request.current_password, &identity.password_hash)
            .await
        {
            tracing::warn!("Password change refused for user {}: wrong current password", identity.id);
            return Err(ServiceError::InvalidCredentials);
        }

        let password_hash = self.credentials.hash(&request.new_password).await?;
        self.identities
            .update_password_hash(&identity.id, &password_hash)
            .await?;

        let mut revoked = 0;
        for session in self.sessions.active_sessions(&identity.id).await? {
            if session.session_id != user.session_id
                && self.sessions.remove(&identity.id, &session.session_id).await?
            {
                revoked += 1;
            }
        }

        self.spawn_action(action_entry(&identity.id, ACTION_PASSWORD_CHANGE, Some(identity.id.as_str()), client));
        tracing::info!(
            "User {} changed password, {} other session(s) closed",
            identity.id,
            revoked
        );

        Ok(revoked)
    }

    /// Closes every session of `target_user_id` on behalf of an administrator.
    ///
    /// The caller must be company admin or above and the target must hold at
    /// least one assignment inside the caller's scope.
    pub async fn force_logout(
        &self,
        actor: &AuthenticatedUser,
        actor_scope: &TenantScope,
        target_user_id: &str,
        client: &ClientContext,
    ) -> ServiceResult<usize> {
        actor_scope.require_level(RoleLevel::COMPANY_ADMIN)?;

        let (target, assignments) = tokio::join!(
            self.identities.find_identity_by_id(target_user_id),
            self.identities.role_assignments(target_user_id),
        );
        if target?.is_none() {
            return Err(ServiceError::not_found("User", target_user_id));
        }

        let in_scope = usable_assignments(assignments?).iter().any(|assignment| {
            assignment.level <= actor_scope.role_level
                && actor_scope.can_access(
                    assignment.company_id.as_deref(),
                    assignment.branch_id.as_deref(),
                )
        });
        if !in_scope && !actor_scope.role_level.is_platform() {
            tracing::warn!(
                "User {} tried to close sessions of {} outside their scope",
                actor.user_id,
                target_user_id
            );
            return Err(ServiceError::forbidden("Target user is outside your scope"));
        }

        let revoked = self.sessions.remove_all(target_user_id).await?;
        self.spawn_action(action_entry(&actor.user_id, ACTION_FORCE_LOGOUT, Some(target_user_id), client));
        tracing::info!(
            "User {} closed {} session(s) of user {}",
            actor.user_id,
            revoked,
            target_user_id
        );

        Ok(revoked)
    }

    /// Session details of the caller with a freshly resolved scope.
    pub async fn me(&self, user: &AuthenticatedUser) -> ServiceResult<MeResponse> {
        let (session, scope) = tokio::join!(
            self.sessions.get(&user.user_id, &user.session_id),
            self.scopes.resolve(&user.user_id),
        );
        let session = session?.ok_or(ServiceError::authentication(AuthFailure::SessionExpired))?;

        Ok(MeResponse::new(session, scope?))
    }

    /// Maps an identifier to the email used for the identity lookup.
    ///
    /// Identifiers without `@` are tried as an alternate login code first.
    async fn resolve_login_email(&self, identifier: &str) -> String {
        let identifier = identifier.trim();
        if !identifier.contains('@') {
            match self
                .identities
                .find_email_by_code(&identifier.to_uppercase())
                .await
            {
                Ok(Some(email)) => return email.trim().to_lowercase(),
                Ok(None) => {}
                Err(e) => tracing::warn!("Login code lookup failed, using identifier as email: {}", e),
            }
        }
        identifier.to_lowercase()
    }

    /// Records one failed login and hands back `error`.
    async fn reject(
        &self,
        user_id: Option<&str>,
        email: &str,
        client: &ClientContext,
        reason: &str,
        error: ServiceError,
    ) -> ServiceError {
        tracing::warn!(
            "Login failed for {} (user {}): {}",
            email,
            user_id.unwrap_or("-"),
            reason
        );

        let entry = LoginAudit {
            user_id: user_id.map(str::to_string),
            email: email.to_string(),
            ip_address: client.ip_string(),
            user_agent: client.user_agent.clone(),
            status: LoginStatus::Failed,
            failure_reason: Some(reason.to_string()),
        };
        if let Err(e) = self.audit.record_login(entry).await {
            tracing::error!("Failed to record login audit for {}: {}", email, e);
        }

        error
    }

    fn spawn_login_side_effects(&self, identity: &Identity, email: &str, client: &ClientContext) {
        let audit = Arc::clone(&self.audit);
        let identities = Arc::clone(&self.identities);
        let user_id = identity.id.clone();
        let login = LoginAudit {
            user_id: Some(identity.id.clone()),
            email: email.to_string(),
            ip_address: client.ip_string(),
            user_agent: client.user_agent.clone(),
            status: LoginStatus::Success,
            failure_reason: None,
        };
        let action = action_entry(&identity.id, ACTION_LOGIN, Some(identity.id.as_str()), client);

        tokio::spawn(async move {
            let (login, action, touched) = tokio::join!(
                audit.record_login(login),
                audit.record_action(action),
                identities.touch_last_login(&user_id),
            );
            if let Err(e) = login {
                tracing::error!("Failed to record login audit for user {}: {}", user_id, e);
            }
            if let Err(e) = action {
                tracing::error!("Failed to record LOGIN action for user {}: {}", user_id, e);
            }
            if let Err(e) = touched {
                tracing::error!("Failed to update last login of user {}: {}", user_id, e);
            }
        });
    }

    fn spawn_action(&self, entry: ActionAudit) {
        let audit = Arc::clone(&self.audit);
        tokio::spawn(async move {
            let action = entry.action.clone();
            if let Err(e) = audit.record_action(entry).await {
                tracing::error!("Failed to record {} action: {}", action, e);
            }
        });
    }
}

/// Session and access token lifetime for a timeout setting in hours.
fn session_ttl(timeout_hours: u64) -> Duration {
    let hours = timeout_hours.clamp(1, MAX_SESSION_TIMEOUT_HOURS);
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Scope of the most privileged assignment, or an unassigned scope.
fn primary_scope(sorted: &[RoleAssignment]) -> TenantScope {
    sorted
        .first()
        .map(TenantScope::from_assignment)
        .unwrap_or(TenantScope {
            role_level: RoleLevel::UNASSIGNED,
            company_id: None,
            branch_id: None,
        })
}

/// Role names in privilege order without duplicates.
fn role_names(sorted: &[RoleAssignment]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(sorted.len());
    for assignment in sorted {
        if !names.contains(&assignment.role_name) {
            names.push(assignment.role_name.clone());
        }
    }
    names
}

fn action_entry(
    user_id: &str,
    action: &str,
    record_id: Option<&str>,
    client: &ClientContext,
) -> ActionAudit {
    ActionAudit {
        user_id: user_id.to_string(),
        action: action.to_string(),
        table_name: AUDIT_TABLE.to_string(),
        schema_name: AUDIT_SCHEMA.to_string(),
        record_id: record_id.map(str::to_string),
        ip_address: client.ip_string(),
        user_agent: client.user_agent.clone(),
    }
}

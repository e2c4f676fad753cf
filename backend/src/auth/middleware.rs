//! Middleware for protecting authenticated routes and handling authorization.
//!
//! A bearer token alone is never enough: after the signature and expiry check
//! the session it is bound to must still be live in the session cache. That is
//! what makes logout, forced logout and session eviction take effect
//! immediately.

use crate::auth::models::AuthenticatedUser;
use crate::database::models::RoleLevel;
use crate::errors::{AuthFailure, ServiceError, ServiceResult};
use crate::services::tenant_scope::TenantScope;
use crate::state::AppState;
use axum::{
    extract::{Extension, Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the caller of a request.
///
/// Fails with, in this order of checks: `AUTHENTICATION_ERROR` when no bearer
/// token is present, `INVALID_TOKEN` when it does not verify as an access
/// token, `SESSION_EXPIRED` when its session is gone.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> ServiceResult<AuthenticatedUser> {
    let token = bearer_token(headers)
        .ok_or(ServiceError::authentication(AuthFailure::MissingToken))?;

    let claims = state
        .tokens
        .verify_access(token)
        .ok_or(ServiceError::authentication(AuthFailure::InvalidToken))?;

    let session = state
        .sessions
        .get(claims.user_id(), claims.session_id())
        .await?;
    if session.is_none() {
        tracing::debug!(
            "Rejected token of user {}: session {} is not live",
            claims.user_id(),
            claims.session_id()
        );
        return Err(ServiceError::authentication(AuthFailure::SessionExpired));
    }

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        email: claims.email,
        roles: claims.roles,
        session_id: claims.sid,
    })
}

/// JWT authentication middleware
pub async fn jwt_auth(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = authenticate(&state, request.headers()).await?;

    // Add the caller to request extensions for use in handlers
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Resolves the caller's tenant scope. Must run after [`jwt_auth`].
pub async fn tenant_scope(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.user_id.clone())
        .ok_or(ServiceError::authentication(AuthFailure::MissingToken))?;

    let scope = state.scopes.resolve(&user_id).await?;

    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}

/// Rejects callers below `min`. Must run after [`tenant_scope`].
///
/// Mount with `middleware::from_fn_with_state(RoleLevel::COMPANY_ADMIN, require_role_level)`.
pub async fn require_role_level(
    State(min): State<RoleLevel>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let scope = request
        .extensions()
        .get::<TenantScope>()
        .ok_or_else(|| ServiceError::forbidden("No role assigned"))?;

    scope.require_level(min)?;

    Ok(next.run(request).await)
}

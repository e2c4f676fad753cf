//! Shared application state handed to every handler and middleware.

use crate::auth::service::{AuthDependencies, AuthService};
use crate::cache::SessionCache;
use crate::services::tenant_scope::TenantScopeResolver;
use crate::utils::jwt::TokenCodec;
use std::sync::Arc;

/// Stateless services and pools only; the session cache is the one piece of
/// shared mutable state and it lives behind its store.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub tokens: TokenCodec,
    pub sessions: SessionCache,
    pub scopes: TenantScopeResolver,
}

impl AppState {
    pub fn new(deps: AuthDependencies) -> Self {
        let tokens = deps.tokens.clone();
        let sessions = deps.sessions.clone();
        let scopes = TenantScopeResolver::new(Arc::clone(&deps.identities));

        AppState {
            auth: AuthService::new(deps),
            tokens,
            sessions,
            scopes,
        }
    }
}

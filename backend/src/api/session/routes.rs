//! Defines the HTTP routes for administrative session management.

use super::handlers::force_logout;
use crate::auth::middleware::{jwt_auth, require_role_level, tenant_scope};
use crate::database::models::RoleLevel;
use axum::{Router, middleware, routing::delete};

pub fn session_router() -> Router {
    Router::new().route(
        "/sessions/{user_id}",
        delete(force_logout)
            .layer(middleware::from_fn_with_state(
                RoleLevel::COMPANY_ADMIN,
                require_role_level,
            ))
            .layer(middleware::from_fn(tenant_scope))
            .layer(middleware::from_fn(jwt_auth)),
    )
}

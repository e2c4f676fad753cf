//! Defines the HTTP routes for tenant scope inspection.

use super::handlers::get_scope;
use crate::auth::middleware::{jwt_auth, tenant_scope};
use axum::{Router, middleware, routing::get};

pub fn scope_router() -> Router {
    Router::new().route(
        "/scope",
        get(get_scope)
            .layer(middleware::from_fn(tenant_scope))
            .layer(middleware::from_fn(jwt_auth)),
    )
}

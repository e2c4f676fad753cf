//! Central module for organizing the application's main API endpoints.
//!
//! This module acts as a top-level container for the tenant-scoped API
//! domains, excluding core authentication routes which are handled
//! separately.

use axum::Router;

pub mod common;
pub mod scope;
pub mod session;

/// Every `/api` route.
pub fn api_router() -> Router {
    scope::routes::scope_router().merge(session::routes::session_router())
}

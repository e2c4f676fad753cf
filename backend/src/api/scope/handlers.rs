//! Handler functions for tenant scope endpoints.

use crate::api::common::ApiResponse;
use crate::auth::models::ScopeResponse;
use crate::services::tenant_scope::TenantScope;
use axum::{extract::Extension, response::Json as ResponseJson};

/// Returns the scope resolved for this request by the `tenant_scope` layer
#[axum::debug_handler]
pub async fn get_scope(
    Extension(scope): Extension<TenantScope>,
) -> ResponseJson<ApiResponse<ScopeResponse>> {
    let filter = scope.filter();
    ResponseJson(ApiResponse::ok(ScopeResponse { scope, filter }))
}

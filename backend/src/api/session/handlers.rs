//! Handler functions for administrative session management.

use crate::api::common::{ApiResponse, ErrorResponse, service_error_to_http};
use crate::auth::models::{AuthenticatedUser, RevokedSessions};
use crate::services::tenant_scope::TenantScope;
use crate::state::AppState;
use crate::utils::network::ClientContext;
use axum::{
    extract::{Extension, Path},
    http::HeaderMap,
    response::Json as ResponseJson,
};
use std::sync::Arc;

/// Closes every session of `user_id`
#[axum::debug_handler]
pub async fn force_logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(scope): Extension<TenantScope>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<ResponseJson<ApiResponse<RevokedSessions>>, ErrorResponse> {
    let client = ClientContext::from_headers(&headers);

    match state.auth.force_logout(&user, &scope, &user_id, &client).await {
        Ok(revoked) => Ok(ResponseJson(ApiResponse::success(
            RevokedSessions { revoked },
            "Sessions closed",
        ))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

//! Handler functions for authentication-related API endpoints.
//!
//! These functions parse request data and client metadata, then delegate to
//! `auth::service` for the core business logic.

use crate::api::common::{ApiResponse, ErrorResponse, json_payload, service_error_to_http};
use crate::auth::models::*;
use crate::state::AppState;
use crate::utils::network::ClientContext;
use axum::{
    extract::{Extension, Json, rejection::JsonRejection},
    http::HeaderMap,
    response::Json as ResponseJson,
};
use std::sync::Arc;

/// Handle user login request
#[axum::debug_handler]
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<LoginOutcome>>, ErrorResponse> {
    let payload = json_payload(payload)?;
    let client = ClientContext::from_headers(&headers);

    match state.auth.login(payload, &client).await {
        Ok(outcome @ LoginOutcome::Authenticated(_)) => {
            Ok(ResponseJson(ApiResponse::success(outcome, "Login successful")))
        }
        Ok(outcome @ LoginOutcome::MfaRequired(_)) => Ok(ResponseJson(ApiResponse::success(
            outcome,
            "Second factor verification required",
        ))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

/// Handle token refresh request
#[axum::debug_handler]
pub async fn refresh_token(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<RefreshTokenResponse>>, ErrorResponse> {
    let payload = json_payload(payload)?;

    match state.auth.refresh_token(payload).await {
        Ok(response) => Ok(ResponseJson(ApiResponse::ok(response))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

/// Handle logout of the current session
#[axum::debug_handler]
pub async fn logout(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<ResponseJson<ApiResponse<()>>, ErrorResponse> {
    let client = ClientContext::from_headers(&headers);

    match state.auth.logout(&user, &client).await {
        Ok(()) => Ok(ResponseJson(ApiResponse::success((), "Logged out successfully"))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

/// Handle logout of every session of the caller
#[axum::debug_handler]
pub async fn logout_all(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<ResponseJson<ApiResponse<RevokedSessions>>, ErrorResponse> {
    let client = ClientContext::from_headers(&headers);

    match state.auth.logout_all(&user, &client).await {
        Ok(revoked) => Ok(ResponseJson(ApiResponse::success(
            RevokedSessions { revoked },
            "Logged out of all sessions",
        ))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

/// Handle password change of the caller
#[axum::debug_handler]
pub async fn change_password(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<RevokedSessions>>, ErrorResponse> {
    let payload = json_payload(payload)?;
    let client = ClientContext::from_headers(&headers);

    match state.auth.change_password(&user, payload, &client).await {
        Ok(revoked) => Ok(ResponseJson(ApiResponse::success(
            RevokedSessions { revoked },
            "Password changed successfully",
        ))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

/// Get current user information from the session
#[axum::debug_handler]
pub async fn me(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<ResponseJson<ApiResponse<MeResponse>>, ErrorResponse> {
    match state.auth.me(&user).await {
        Ok(response) => Ok(ResponseJson(ApiResponse::ok(response))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

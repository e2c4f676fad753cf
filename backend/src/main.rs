//! Main entry point for the ERP authentication backend.
//!
//! This file initializes the Axum web server, sets up the database and
//! session cache connections, and registers all API routes and middleware.

mod api;
mod auth;
mod cache;
mod config;
mod database;
mod errors;
mod repositories;
mod services;
mod state;
mod utils;

#[cfg(test)]
mod testing;

use crate::api::common::ApiResponse;
use crate::auth::service::AuthDependencies;
use crate::cache::{MemorySessionStore, RedisSessionStore, SessionCache, SessionStore};
use crate::repositories::{
    audit_repository::AuditRepository, identity_repository::IdentityRepository,
    mfa_repository::MfaRepository, security_repository::SecurityRepository,
    settings_repository::SettingsRepository,
};
use crate::services::credential_verifier::CredentialVerifier;
use crate::state::AppState;
use crate::utils::jwt::TokenCodec;
use anyhow::Context;
use axum::{Extension, Router, response::Json, routing::get};
use config::Config;
use database::Database;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let db = Database::new(&config).await?;
    let pool = db.pool().clone();

    let store: Arc<dyn SessionStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisSessionStore::connect(url)
                .await
                .context("failed to connect to the session cache")?,
        ),
        None => Arc::new(MemorySessionStore::new()),
    };
    info!("Session cache: {}", store.store_name());

    let state = Arc::new(AppState::new(AuthDependencies {
        identities: Arc::new(IdentityRepository::new(pool.clone())),
        settings: Arc::new(SettingsRepository::new(pool.clone())),
        security: Arc::new(SecurityRepository::new(pool.clone())),
        second_factor: Arc::new(MfaRepository::new(pool.clone())),
        audit: Arc::new(AuditRepository::new(pool)),
        sessions: SessionCache::new(store),
        tokens: TokenCodec::new(
            &config.jwt_secret,
            Duration::from_secs(config.refresh_token_expires_in_seconds),
        ),
        credentials: CredentialVerifier::new(config.bcrypt_cost),
    }));

    let bind_address = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;

    info!("Starting ERP auth server on port {}", config.server_port);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    Ok(())
}

/// Builds the full application router.
fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .nest("/auth", auth::routes::auth_router())
        .nest("/api", api::api_router())
        .layer(Extension(state))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

async fn root_handler() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(
        serde_json::json!({
            "service": "ERP Auth Backend",
            "version": env!("CARGO_PKG_VERSION")
        }),
        "Welcome to the ERP authentication API",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::LoginStatus;
    use crate::testing::{Harness, PASSWORD, assignment};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn send(
        harness: &Harness,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7")
            .header(header::USER_AGENT, "router-tests/1.0");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app(harness.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn login(harness: &Harness, email: &str, password: &str) -> (StatusCode, Value) {
        send(
            harness,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": email, "password": password})),
        )
        .await
    }

    fn access_token(body: &Value) -> String {
        body["data"]["tokens"]["accessToken"]
            .as_str()
            .expect("access token in login response")
            .to_string()
    }

    #[tokio::test]
    async fn test_scenario_successful_login() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");

        let (status, body) = login(&harness, "alice@acme.com", PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["user"]["id"], json!("u1"));
        assert_eq!(body["data"]["user"]["roleLevel"], json!(4));
        assert!(body["data"]["tokens"]["refreshToken"].is_string());

        let logins = harness.audit.wait_for_logins(1).await;
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].status, LoginStatus::Success);
        assert_eq!(harness.sessions.active_sessions("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_suspended_company() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");
        harness.identities.set_company_active("c1", false);

        let (status, body) = login(&harness, "alice@acme.com", PASSWORD).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["code"], json!("COMPANY_SUSPENDED"));

        let logins = harness.audit.logins();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].failure_reason.as_deref(), Some("Company suspended"));
        assert!(harness.sessions.active_sessions("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_mfa_required() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");
        harness.identities.update_identity("u1", |identity| identity.mfa_enabled = true);

        let (status, body) = login(&harness, "alice@acme.com", PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["mfaRequired"], json!(true));
        assert_eq!(body["data"]["userId"], json!("u1"));
        assert!(body["data"].get("tokens").is_none());
        assert!(harness.sessions.active_sessions("u1").await.unwrap().is_empty());
        assert!(
            harness
                .audit
                .logins()
                .iter()
                .all(|entry| entry.status != LoginStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_scenario_student_code_login() {
        let harness = Harness::new().await;
        harness.seed_identity("u9", "bob@school.edu");
        harness
            .identities
            .add_assignment(assignment(1, "u9", 0, Some("c1"), Some("b1")));
        harness.identities.add_student_code("STU-001", "bob@school.edu");

        let (status, body) = login(&harness, "stu-001", PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["email"], json!("bob@school.edu"));
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_share_envelope() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");

        let (unknown_status, unknown) = login(&harness, "ghost@acme.com", PASSWORD).await;
        let (wrong_status, wrong) = login(&harness, "alice@acme.com", "wrong-password").await;

        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown["error"], wrong["error"]);
        assert_eq!(unknown["error"]["code"], json!("INVALID_CREDENTIALS"));
    }

    #[tokio::test]
    async fn test_validation_error_envelope() {
        let harness = Harness::new().await;
        let (status, body) = login(&harness, "alice@acme.com", "123").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
        assert!(harness.audit.logins().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_bodies_use_validation_envelope() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");

        let (status, body) = send(
            &harness,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "alice@acme.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

        let (status, body) = send(&harness, Method::POST, "/auth/refresh", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

        let (_, login_body) = login(&harness, "alice@acme.com", PASSWORD).await;
        let (status, body) = send(
            &harness,
            Method::POST,
            "/auth/change-password",
            Some(&access_token(&login_body)),
            Some(json!({"newPassword": 42})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app(harness.state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

        assert_eq!(harness.audit.wait_for_logins(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_unknown_student_code() {
        let harness = Harness::new().await;
        harness.identities.add_student_code("STU-001", "bob@school.edu");

        let (status, body) = login(&harness, "stu-404", PASSWORD).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], json!("INVALID_CREDENTIALS"));

        let logins = harness.audit.logins();
        assert_eq!(logins.len(), 1);
        assert_eq!(logins[0].email, "stu-404");
        assert_eq!(logins[0].user_id, None);
        assert_eq!(logins[0].failure_reason.as_deref(), Some("User not found"));
    }

    #[tokio::test]
    async fn test_token_stops_working_once_session_is_gone() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");
        let (_, body) = login(&harness, "alice@acme.com", PASSWORD).await;
        let token = access_token(&body);

        let (status, me) = send(&harness, Method::GET, "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["data"]["scope"]["companyId"], json!("c1"));

        harness.sessions.remove_all("u1").await.unwrap();
        let (status, body) = send(&harness, Method::GET, "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], json!("SESSION_EXPIRED"));
    }

    #[tokio::test]
    async fn test_single_session_limit_invalidates_first_login() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");
        harness.settings.set_max_sessions(1);

        let (_, first) = login(&harness, "alice@acme.com", PASSWORD).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (_, second) = login(&harness, "alice@acme.com", PASSWORD).await;

        let (status, _) = send(&harness, Method::GET, "/auth/me", Some(&access_token(&first)), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&harness, Method::GET, "/auth/me", Some(&access_token(&second)), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");
        let (_, body) = login(&harness, "alice@acme.com", PASSWORD).await;
        let refresh = body["data"]["tokens"]["refreshToken"].as_str().unwrap().to_string();

        let (status, body) = send(&harness, Method::GET, "/auth/me", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], json!("INVALID_TOKEN"));

        let (status, body) = send(
            &harness,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["accessToken"].is_string());
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let harness = Harness::new().await;
        harness.seed_company_admin("u1", "alice@acme.com", "c1");
        let (_, body) = login(&harness, "alice@acme.com", PASSWORD).await;
        let token = access_token(&body);

        let (status, _) = send(&harness, Method::POST, "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&harness, Method::GET, "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let harness = Harness::new().await;
        let (status, body) = send(&harness, Method::GET, "/api/scope", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], json!("AUTHENTICATION_ERROR"));
    }

    #[tokio::test]
    async fn test_scope_endpoint_reports_row_filter() {
        let harness = Harness::new().await;
        harness.seed_identity("u2", "clerk@acme.com");
        harness
            .identities
            .add_assignment(assignment(1, "u2", 1, Some("c1"), Some("b1")));
        let (_, body) = login(&harness, "clerk@acme.com", PASSWORD).await;

        let (status, body) = send(&harness, Method::GET, "/api/scope", Some(&access_token(&body)), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["scope"]["roleLevel"], json!(1));
        assert_eq!(
            body["data"]["filter"],
            json!({"kind": "branch", "companyId": "c1", "branchId": "b1"})
        );
    }

    #[tokio::test]
    async fn test_force_logout_requires_company_admin() {
        let harness = Harness::new().await;
        harness.seed_company_admin("admin", "admin@acme.com", "c1");
        harness.seed_identity("clerk", "clerk@acme.com");
        harness
            .identities
            .add_assignment(assignment(1, "clerk", 1, Some("c1"), Some("b1")));

        let (_, admin) = login(&harness, "admin@acme.com", PASSWORD).await;
        let (_, clerk) = login(&harness, "clerk@acme.com", PASSWORD).await;
        let clerk_token = access_token(&clerk);

        let (status, body) =
            send(&harness, Method::DELETE, "/api/sessions/admin", Some(&clerk_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], json!("FORBIDDEN"));

        let (status, body) = send(
            &harness,
            Method::DELETE,
            "/api/sessions/clerk",
            Some(&access_token(&admin)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["revoked"], json!(1));

        let (status, _) = send(&harness, Method::GET, "/auth/me", Some(&clerk_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_root_banner() {
        let harness = Harness::new().await;
        let (status, body) = send(&harness, Method::GET, "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["service"], json!("ERP Auth Backend"));
    }
}

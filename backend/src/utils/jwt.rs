//! JWT token utilities for authentication.
//!
//! Issues and verifies the signed access/refresh tokens handed out at login.
//! Verification never errors: anything that is not a valid, unexpired token of
//! the expected type is `None`, and callers decide what that means.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims carried by both token types.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: String,
    /// Role names, most privileged first
    pub roles: Vec<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Session the token is bound to
    pub sid: String,
    /// Token expiration timestamp
    pub exp: usize,
    /// Token issued at timestamp
    pub iat: usize,
}

impl Claims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    pub fn session_id(&self) -> &str {
        &self.sid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Signs and verifies tokens with a single active HS256 key.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, refresh_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        TokenCodec {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            refresh_ttl,
        }
    }

    /// Issues a token of the given type expiring `ttl` from now.
    pub fn issue(
        &self,
        user_id: &str,
        email: &str,
        roles: &[String],
        ttl: Duration,
        session_id: &str,
        token_type: TokenType,
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            roles: roles.to_vec(),
            token_type,
            sid: session_id.to_string(),
            exp: now + ttl.as_secs() as usize,
            iat: now,
        };

        self.encode_claims(&claims)
    }

    /// Issues an access/refresh pair bound to one session.
    ///
    /// The refresh token lives at least as long as the access token.
    pub fn issue_pair(
        &self,
        user_id: &str,
        email: &str,
        roles: &[String],
        access_ttl: Duration,
        session_id: &str,
    ) -> Result<TokenPair, ServiceError> {
        let refresh_ttl = self.refresh_ttl.max(access_ttl);

        Ok(TokenPair {
            access_token: self.issue(user_id, email, roles, access_ttl, session_id, TokenType::Access)?,
            refresh_token: self.issue(user_id, email, roles, refresh_ttl, session_id, TokenType::Refresh)?,
            expires_in: access_ttl.as_secs(),
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, ServiceError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| ServiceError::internal_error(format!("Token generation failed: {}", e)))
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("Token rejected: {}", e);
                None
            }
        }
    }

    /// Like [`verify`](Self::verify), but only accepts access tokens.
    pub fn verify_access(&self, token: &str) -> Option<Claims> {
        self.verify(token)
            .filter(|claims| claims.token_type == TokenType::Access)
    }

    /// Like [`verify`](Self::verify), but only accepts refresh tokens.
    pub fn verify_refresh(&self, token: &str) -> Option<Claims> {
        self.verify(token)
            .filter(|claims| claims.token_type == TokenType::Refresh)
    }
}

//! Bearer-token authentication and role checks.
//!
//! User management lives in a separate service; this module only validates
//! the JWTs it issues, exposes the authenticated user to handlers and
//! enforces the role gate on mutating endpoints.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{ApiError, ServiceError};

/// Roles allowed to mutate inventory and orders.
pub const STAFF_ROLES: &[&str] = &["admin", "manager"];

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated user extracted from a validated token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_staff(&self) -> bool {
        STAFF_ROLES.iter().any(|r| self.has_role(r))
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Rejects callers whose token lacks a staff role.
pub fn require_staff(user: &AuthUser) -> Result<(), ServiceError> {
    if user.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "staff role required for this operation".to_string(),
        ))
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        issuer: String,
        audience: String,
        token_ttl: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            issuer,
            audience,
            token_ttl,
        }
    }
}

pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Mints a token for the given subject and roles. Used by ops tooling and
    /// the test harness; interactive login lives in the auth collaborator.
    pub fn issue_token(&self, user_id: &str, roles: &[&str]) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            iat: now,
            exp: now + self.config.token_ttl.as_secs() as i64,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {e}")))
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {e}")))?;

        Ok(AuthUser {
            user_id: data.claims.sub,
            roles: data.claims.roles,
        })
    }
}

/// Layer that validates the bearer token and injects `AuthUser` into request
/// extensions for the extractor above.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

    let user = auth.validate_token(token)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

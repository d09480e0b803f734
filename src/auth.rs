use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::AppConfig,
    error::AppError,
    models::Person,
    repository::{RepositoryError, RepositoryState},
};

/// Claims
///
/// The payload carried inside every bearer token. `id` is the primary key of the person
/// the token was issued to.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    /// Issued At (iat).
    pub iat: usize,
    /// Expiration Time (exp). Always validated.
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingCredentials,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Unable to find user")]
    UserNotFound,
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// Signing failed while issuing a token.
    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// AuthUser
///
/// The person resolved by [`authenticate`], stored in the request extensions for the
/// lifetime of one request. Handlers take it as an extractor argument.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Person);

/// Reads the user attached by [`authenticate`].
///
/// Reaching a handler without it means the route was mounted outside the
/// authentication layer, which is a wiring defect and is reported as a 500.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthUser>().cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "no authenticated user on request; authentication layer is missing for {}",
                parts.uri.path()
            ))
        })
    }
}

/// AuthStrategy
///
/// Turns a raw credential into the person it identifies.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Person, AuthError>;
}

pub type AuthState = Arc<dyn AuthStrategy>;

/// JwtKeys
///
/// Signing and verification material derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            // `AppConfig::load` keeps the configured lifetime within range.
            ttl: Duration::try_minutes(ttl_minutes).unwrap_or(Duration::zero()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.jwt_ttl_minutes)
    }

    /// Signs an HS256 token for `person_id`, valid for the configured lifetime.
    pub fn issue(&self, person_id: i64) -> Result<String, AuthError> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(now);
        let claims = Claims {
            id: person_id,
            iat: now.timestamp() as usize,
            // A pre-epoch expiry clamps to 0, which is already expired.
            exp: expires_at.timestamp().max(0) as usize,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Checks signature and expiry and returns the decoded claims.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                AuthError::InvalidToken
            })
    }
}

/// JwtStrategy
///
/// Verifies a bearer token and resolves its `id` claim against the repository, so a
/// token for a person that has since been deleted is rejected.
pub struct JwtStrategy {
    keys: JwtKeys,
    repo: RepositoryState,
}

impl JwtStrategy {
    pub fn new(keys: JwtKeys, repo: RepositoryState) -> Self {
        Self { keys, repo }
    }
}

#[async_trait]
impl AuthStrategy for JwtStrategy {
    async fn verify(&self, credential: &str) -> Result<Person, AuthError> {
        let claims = self.keys.decode(credential)?;
        self.repo
            .find_by_primary_key(claims.id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

/// Extracts the token from `Authorization: Bearer <token>`. The scheme is matched
/// case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MissingCredentials)?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}

/// authenticate
///
/// Middleware applied to every protected router. Rejects the request with a 401
/// envelope unless the bearer token verifies and names an existing person, in which
/// case the person is attached as [`AuthUser`] and the request continues.
pub async fn authenticate(
    State(strategy): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let verified = match bearer_token(request.headers()) {
        Ok(token) => strategy.verify(token).await,
        Err(e) => Err(e),
    };

    let person = verified.inspect_err(|e| {
        tracing::warn!(reason = %e, path = %request.uri().path(), "authentication failed");
    })?;

    request.extensions_mut().insert(AuthUser(person));
    Ok(next.run(request).await)
}

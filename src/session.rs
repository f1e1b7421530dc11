//! Admin sessions: signed JWTs minted after a successful OTP verification.
//!
//! The token travels either as `Authorization: Bearer <token>` or in the
//! `admin_session` cookie. Logged-out tokens are remembered by `jti` until
//! they would have expired anyway.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "admin_session";

const JTI_LEN: usize = 32;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,   // OTP session id
    pub email: String, // Admin email
    pub jti: String,   // Random token id, used for revocation
    pub iat: i64,      // Issued at timestamp
    pub exp: i64,      // Expiry timestamp
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("token has been revoked")]
    Revoked,
}

pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    /// jti -> exp of logged-out tokens.
    revoked: RwLock<HashMap<String, i64>>,
}

impl SessionManager {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds().max(0)
    }

    pub fn issue(&self, session_id: &str, email: &str) -> Result<(String, Claims), SessionError> {
        let now = Utc::now();
        let claims = Claims {
            sub: session_id.to_string(),
            email: email.to_string(),
            jti: Alphanumeric.sample_string(&mut rand::rng(), JTI_LEN),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    /// Check signature, expiry and revocation.
    pub async fn verify(&self, token: &str) -> Result<Claims, SessionError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())?.claims;
        if self.revoked.read().await.contains_key(&claims.jti) {
            return Err(SessionError::Revoked);
        }
        Ok(claims)
    }

    /// Remember `claims.jti` as logged out; drops entries past their expiry.
    pub async fn revoke(&self, claims: &Claims) {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        revoked.retain(|_, exp| *exp > now);
        revoked.insert(claims.jti.clone(), claims.exp);
    }

    #[cfg(test)]
    async fn revoked_len(&self) -> usize {
        self.revoked.read().await.len()
    }
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// The presented session token, header first, then cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| extract_cookie_token(headers))
}

pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        max_age_secs,
        if secure { "; Secure" } else { "" }
    )
}

pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// An authenticated admin. Rejects with 401 when no valid session is present.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub claims: Claims,
}

impl AdminSession {
    /// Resolve a session from request headers. Returns the 401 error instead
    /// of rejecting, so callers such as the `/admin` page choose how to react.
    pub async fn from_headers(headers: &HeaderMap, state: &AppState) -> Result<Self, AppError> {
        let token = token_from_headers(headers)
            .ok_or_else(|| AppError::unauthorized("Authorization required"))?;

        let claims = state.sessions.verify(&token).await.map_err(|e| {
            tracing::debug!(error = %e, "session rejected");
            AppError::unauthorized("Invalid or expired session")
        })?;

        if !state.config.is_admin_email(&claims.email) {
            tracing::warn!("session for a non-admin email rejected");
            return Err(AppError::unauthorized("Invalid or expired session"));
        }

        Ok(AdminSession { claims })
    }
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        AdminSession::from_headers(&parts.headers, state).await
    }
}

//! Admin sessions: password login issuing random bearer tokens, a
//! middleware guarding the admin routes, and the step-up password check
//! that gates launch and relaunch.
//!
//! Production: back sessions with a shared store so they survive restarts.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use roster_core::config::AdminConfig;
use roster_core::{RosterError, RosterResult};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{ErrorResponse, LoginRequest, LoginResponse};

const TOKEN_PREFIX: &str = "roster_";

fn digest(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

/// Compare digests without short-circuiting on the first differing byte.
fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Generate a random bearer token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

pub struct AdminAuth {
    username: String,
    password_digest: [u8; 32],
    session_ttl: Duration,
    sessions: DashMap<String, DateTime<Utc>>,
}

impl AdminAuth {
    pub fn new(config: &AdminConfig) -> Self {
        if config.password.is_empty() {
            warn!("Admin password is empty, every login will be rejected");
        }
        Self {
            username: config.username.clone(),
            password_digest: digest(&config.password),
            session_ttl: Duration::hours(config.session_ttl_hours.max(1)),
            sessions: DashMap::new(),
        }
    }

    /// Step-up check used before any action that emails real people.
    pub fn verify_password(&self, password: &str) -> bool {
        !password.is_empty() && digests_match(&digest(password), &self.password_digest)
    }

    pub fn login(&self, req: &LoginRequest) -> RosterResult<LoginResponse> {
        if req.username != self.username || !self.verify_password(&req.password) {
            warn!(user = %req.username, "Admin login rejected");
            return Err(RosterError::Unauthorized("invalid credentials".to_string()));
        }
        let token = generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.sessions.insert(token.clone(), expires_at);
        info!(user = %req.username, %expires_at, "Admin session opened");
        Ok(LoginResponse {
            token,
            user: req.username.clone(),
            expires_at,
        })
    }

    pub fn validate(&self, token: &str) -> bool {
        self.sessions
            .get(token)
            .is_some_and(|expires_at| *expires_at > Utc::now())
    }

    pub fn logout(&self, token: &str) {
        self.sessions.remove(token);
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.sessions.len())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Axum middleware rejecting requests without a live bearer token.
pub async fn require_admin(State(auth): State<Arc<AdminAuth>>, req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if auth.validate(token) => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "unauthorized".to_string(),
                message: "Missing or invalid bearer token".to_string(),
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn auth() -> AdminAuth {
        AdminAuth::new(&AdminConfig {
            username: "admin".to_string(),
            password: "s3cret".to_string(),
            session_ttl_hours: 8,
        })
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_login_issues_valid_token() {
        let auth = auth();
        let resp = auth.login(&login("admin", "s3cret")).unwrap();
        assert!(resp.token.starts_with(TOKEN_PREFIX));
        assert_eq!(resp.token.len(), TOKEN_PREFIX.len() + 64);
        assert!(auth.validate(&resp.token));
        assert!(!auth.validate("roster_nope"));

        auth.logout(&resp.token);
        assert!(!auth.validate(&resp.token));
    }

    #[test]
    fn test_bad_credentials_rejected() {
        let auth = auth();
        assert!(matches!(
            auth.login(&login("admin", "wrong")),
            Err(RosterError::Unauthorized(_))
        ));
        assert!(auth.login(&login("root", "s3cret")).is_err());
        assert!(!auth.verify_password(""));
        assert!(auth.verify_password("s3cret"));
    }

    #[test]
    fn test_purge_removes_expired_sessions() {
        let auth = auth();
        auth.login(&login("admin", "s3cret")).unwrap();
        auth.sessions
            .insert("roster_old".to_string(), Utc::now() - Duration::minutes(1));
        assert_eq!(auth.purge_expired(), 1);
        assert_eq!(auth.session_count(), 1);
    }
}

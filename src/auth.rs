//! Request identity: HTTP Basic auth for admin routes, user identity for participant routes

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::error::GameError;
use crate::state::AppState;
use crate::types::User;

/// Header carrying the caller's user id on participant routes
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Username for admin routes (None = auth disabled)
    pub username: Option<String>,
    /// Password for admin routes
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from environment variables
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        let username = std::env::var("ADMIN_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Admin authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Admin authentication DISABLED - anyone can reveal winners!");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                constant_time_eq(u.as_bytes(), username.as_bytes())
                    && constant_time_eq(p.as_bytes(), password.as_bytes())
            }
            _ => true,
        }
    }
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Split a `Basic` authorization header value into (username, password)
fn parse_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware for HTTP Basic Authentication on admin routes
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() {
        return next.run(request).await;
    }

    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic);

    if let Some((username, password)) = credentials {
        if auth_config.validate(&username, &password) {
            return next.run(request).await;
        }
        tracing::warn!(username, "Rejected admin credentials");
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Envelope Admin\"")],
        "Unauthorized",
    )
        .into_response()
}

/// The participant making a request, resolved from [`USER_ID_HEADER`]
#[derive(Debug, Clone)]
pub struct Caller(pub User);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = GameError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        state.authenticate(user_id).await.map(Caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_disabled_when_incomplete() {
        let config = AuthConfig::disabled();
        assert!(!config.is_enabled());
        assert!(config.validate("any", "thing"));

        let config = AuthConfig {
            username: Some("user".to_string()),
            password: None,
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_auth_config_enabled() {
        let config = AuthConfig {
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
        };
        assert!(config.is_enabled());
        assert!(config.validate("admin", "secret"));
        assert!(!config.validate("admin", "wrong"));
        assert!(!config.validate("wrong", "secret"));
        assert!(!config.validate("", ""));
    }

    #[test]
    fn test_parse_basic() {
        // "admin:secret"
        assert_eq!(
            parse_basic("Basic YWRtaW46c2VjcmV0"),
            Some(("admin".to_string(), "secret".to_string()))
        );
        // Passwords may contain colons
        let encoded = STANDARD.encode("admin:se:cret");
        assert_eq!(
            parse_basic(&format!("Basic {encoded}")),
            Some(("admin".to_string(), "se:cret".to_string()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(constant_time_eq(b"", b""));
    }
}

//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::error::ApiError;
use crate::web::state::AppState;

/// Name of the cookie that carries the session token.
pub const SESSION_COOKIE: &str = "token";

/// The verified identity attached to requests that passed `require_auth`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
}

/// Reads one cookie value from the `Cookie` header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (key, value) = c.trim().split_once('=')?;
            (key == name).then_some(value)
        })
        .filter(|v| !v.is_empty())
}

/// Reads the token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that verifies the session token from the `token` cookie or a
/// bearer header.
///
/// If valid, inserts the `AuthUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the token, cookie first
    let token = cookie_value(req.headers(), SESSION_COOKIE)
        .or_else(|| bearer_token(req.headers()))
        .ok_or_else(|| ApiError::Unauthenticated("No token provided".to_string()))?;

    // 2. Verify signature and expiry
    let claims = state.tokens.verify(token).map_err(|e| {
        warn!("Rejected session token: {}", e);
        ApiError::Unauthenticated("Invalid or expired token".to_string())
    })?;

    // 3. Insert the identity into request extensions
    req.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        email: claims.email,
    });

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user registration, login, logout and the
//! current-session lookup.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use bookshelf_core::domain::{NewUser, User};
use bookshelf_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::web::extract::{non_blank, JsonBody};
use crate::web::middleware::{AuthUser, SESSION_COOKIE};
use crate::web::state::AppState;
use crate::web::token::SESSION_TTL_SECONDS;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub mobile: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// The public projection of a user. Never includes the password hash.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub mobile: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            mobile: user.mobile,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UserEnvelope {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserResponse,
    /// Only present when token echo is enabled for non-cookie clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: i64,
    pub email: String,
}

//=========================================================================================
// Cookies
//=========================================================================================

fn session_cookie(token: &str, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        SESSION_TTL_SECONDS,
        if secure { "; Secure" } else { "" }
    )
}

fn cleared_session_cookie(secure: bool) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
        SESSION_COOKIE,
        if secure { "; Secure" } else { "" }
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserEnvelope),
        (status = 400, description = "Missing fields", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. Validate required fields
    let (Some(full_name), Some(email), Some(password)) =
        (non_blank(req.full_name), non_blank(req.email), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::BadRequest(
            "Missing required fields: fullName, email, password".to_string(),
        ));
    };

    // 2. Reject known emails before paying for a hash
    match state.db.get_user_by_email(&email).await {
        Ok(_) => return Err(ApiError::Conflict("Email already registered".to_string())),
        Err(PortError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    // 3. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    // 4. Create the user; the unique index still guards concurrent registrations
    let user = state
        .db
        .create_user(NewUser {
            email,
            password_hash,
            full_name,
            mobile: non_blank(req.mobile),
        })
        .await?;
    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            message: "User registered successfully".to_string(),
            user: user.into(),
        }),
    ))
}

/// POST /auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid JSON or missing fields", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(email), Some(password)) =
        (non_blank(req.email), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    };

    // 1. Get user by email; an unknown email looks exactly like a wrong password
    let credentials = state
        .db
        .get_user_by_email(&email)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::InvalidCredentials,
            other => other.into(),
        })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&credentials.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    let valid = Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }

    // 3. Issue the session token
    let token = state.tokens.issue(&credentials.user).map_err(|e| {
        error!("Failed to issue token: {:?}", e);
        ApiError::Internal("Failed to create session".to_string())
    })?;
    let cookie = session_cookie(&token, state.config.production);

    // 4. Return response with cookie
    let response = LoginResponse {
        message: "Login successful".to_string(),
        user: credentials.user.into(),
        token: state.config.expose_token_in_body.then_some(token),
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Clear the session cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse)
    )
)]
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cookie = cleared_session_cookie(state.config.production);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    )
}

/// GET /auth/me - The identity behind the current session
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Session is valid", body = SessionResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = []), ("cookie" = []))
)]
pub async fn me_handler(Extension(auth): Extension<AuthUser>) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: auth.user_id,
        email: auth.email,
    })
}

//! services/api/src/web/profile.rs
//!
//! Profile endpoint for the authenticated user.

use axum::{extract::State, Extension, Json};
use bookshelf_core::domain::ProfileUpdate;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::web::auth::UserEnvelope;
use crate::web::extract::{non_blank, JsonBody};
use crate::web::middleware::AuthUser;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub mobile: Option<String>,
}

/// PATCH /user - Update the caller's own profile
#[utoipa::path(
    patch,
    path = "/user",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserEnvelope),
        (status = 400, description = "No data provided", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "User no longer exists", body = ErrorBody)
    ),
    security(("bearer" = []), ("cookie" = []))
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let update = ProfileUpdate {
        full_name: non_blank(req.full_name),
        mobile: non_blank(req.mobile),
    };
    if update.full_name.is_none() && update.mobile.is_none() {
        return Err(ApiError::BadRequest("No data provided to update".to_string()));
    }

    let user = state.db.update_user_profile(auth.user_id, update).await?;
    Ok(Json(UserEnvelope {
        message: "Profile updated successfully".to_string(),
        user: user.into(),
    }))
}

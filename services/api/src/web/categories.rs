//! services/api/src/web/categories.rs

use axum::{extract::State, Json};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::web::books::{to_responses, BookResponse, CategoryResponse};
use crate::web::state::AppState;

/// Window used to rank books by recent bookmark activity.
const TRENDING_WINDOW_DAYS: i64 = 7;
const FEATURED_LIMIT: usize = 10;

#[derive(Serialize, ToSchema)]
pub struct FeaturedResponse {
    pub trending: Vec<BookResponse>,
    pub recommended: Vec<BookResponse>,
}

/// GET /categories - All categories sorted by name
#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "All categories", body = [CategoryResponse]),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = state.db.list_categories().await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

/// GET /categories/featured - Trending and recommended books
#[utoipa::path(
    get,
    path = "/categories/featured",
    responses(
        (status = 200, description = "Trending and recommended books", body = FeaturedResponse),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn featured_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FeaturedResponse>, ApiError> {
    let active_since = Utc::now() - Duration::days(TRENDING_WINDOW_DAYS);
    let featured = state.db.featured_books(active_since, FEATURED_LIMIT).await?;
    Ok(Json(FeaturedResponse {
        trending: to_responses(featured.trending),
        recommended: to_responses(featured.recommended),
    }))
}

//! services/api/src/web/search.rs

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::error::{ApiError, ErrorBody};
use crate::web::books::{to_responses, BookResponse};
use crate::web::extract::non_blank;
use crate::web::state::AppState;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Matched case-insensitively against title, author and category names.
    pub q: Option<String>,
}

/// GET /search?q= - Books matching the query
#[utoipa::path(
    get,
    path = "/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching books", body = [BookResponse]),
        (status = 400, description = "Search query is required", body = ErrorBody)
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let needle = non_blank(query.q)
        .ok_or_else(|| ApiError::BadRequest("Search query is required".to_string()))?;
    let books = state.db.search_books(&needle).await?;
    Ok(Json(to_responses(books)))
}

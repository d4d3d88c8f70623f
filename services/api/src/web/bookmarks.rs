//! services/api/src/web/bookmarks.rs
//!
//! Reading-progress endpoints. A bookmark is unique per (user, book); posting
//! progress for an existing pair updates it in place.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use bookshelf_core::domain::{Bookmark, BookmarkWithBook};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ErrorBody};
use crate::web::books::BookResponse;
use crate::web::extract::{parse_path_id, value_as_f64, value_as_i64, JsonBody};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkQuery {
    pub user_id: Option<String>,
}

/// Ids and progress may be numbers or numeric strings.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertBookmarkRequest {
    #[schema(value_type = Option<i64>)]
    pub book_id: Option<Value>,
    #[schema(value_type = Option<i64>)]
    pub user_id: Option<Value>,
    #[schema(value_type = Option<f64>)]
    pub progress: Option<Value>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProgressRequest {
    #[schema(value_type = Option<f64>)]
    pub progress: Option<Value>,
}

/// A validated upsert command.
#[derive(Debug, PartialEq)]
pub struct UpsertBookmark {
    pub user_id: i64,
    pub book_id: i64,
    pub progress: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkResponse {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Bookmark> for BookmarkResponse {
    fn from(bookmark: Bookmark) -> Self {
        Self {
            id: bookmark.id,
            user_id: bookmark.user_id,
            book_id: bookmark.book_id,
            progress: bookmark.progress,
            created_at: bookmark.created_at,
            updated_at: bookmark.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookmarkWithBookResponse {
    #[serde(flatten)]
    pub bookmark: BookmarkResponse,
    pub book: BookResponse,
}

impl From<BookmarkWithBook> for BookmarkWithBookResponse {
    fn from(entry: BookmarkWithBook) -> Self {
        Self {
            bookmark: entry.bookmark.into(),
            book: entry.book.into(),
        }
    }
}

//=========================================================================================
// Validation
//=========================================================================================

fn parse_progress(value: &Value) -> Result<f64, ApiError> {
    value_as_f64(value)
        .filter(|p| (0.0..=1.0).contains(p))
        .ok_or_else(|| {
            ApiError::BadRequest("Progress must be a number between 0 and 1".to_string())
        })
}

impl UpsertBookmarkRequest {
    pub fn validate(self) -> Result<UpsertBookmark, ApiError> {
        let present = |v: Option<Value>| v.filter(|v| !v.is_null());
        let (Some(book_id), Some(user_id), Some(progress)) = (
            present(self.book_id),
            present(self.user_id),
            present(self.progress),
        ) else {
            return Err(ApiError::BadRequest(
                "Missing required fields: bookId, userId, progress".to_string(),
            ));
        };

        let (Some(book_id), Some(user_id)) = (value_as_i64(&book_id), value_as_i64(&user_id))
        else {
            return Err(ApiError::BadRequest(
                "Invalid data types: bookId and userId must be integers".to_string(),
            ));
        };
        Ok(UpsertBookmark {
            user_id,
            book_id,
            progress: parse_progress(&progress)?,
        })
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /bookmarks?userId= - A user's bookmarks with their books
#[utoipa::path(
    get,
    path = "/bookmarks",
    params(BookmarkQuery),
    responses(
        (status = 200, description = "The user's bookmarks", body = [BookmarkWithBookResponse]),
        (status = 400, description = "Missing or invalid userId", body = ErrorBody)
    )
)]
pub async fn list_bookmarks_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookmarkQuery>,
) -> Result<Json<Vec<BookmarkWithBookResponse>>, ApiError> {
    let user_id = query
        .user_id
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::BadRequest("Valid userId is required".to_string()))?;

    let bookmarks = state.db.list_bookmarks_for_user(user_id).await?;
    Ok(Json(bookmarks.into_iter().map(Into::into).collect()))
}

/// POST /bookmarks - Create or update reading progress for (user, book)
#[utoipa::path(
    post,
    path = "/bookmarks",
    request_body = UpsertBookmarkRequest,
    responses(
        (status = 200, description = "Bookmark stored", body = BookmarkResponse),
        (status = 400, description = "Missing or invalid fields", body = ErrorBody),
        (status = 404, description = "Book or user not found", body = ErrorBody)
    )
)]
pub async fn upsert_bookmark_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<UpsertBookmarkRequest>,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let command = req.validate()?;
    let bookmark = state
        .db
        .upsert_bookmark(command.user_id, command.book_id, command.progress)
        .await?;
    Ok(Json(bookmark.into()))
}

/// PUT /bookmarks/{id} - Update progress only
#[utoipa::path(
    put,
    path = "/bookmarks/{id}",
    params(("id" = i64, Path, description = "Bookmark id")),
    request_body = UpdateProgressRequest,
    responses(
        (status = 200, description = "Bookmark updated", body = BookmarkResponse),
        (status = 400, description = "Invalid id or progress", body = ErrorBody),
        (status = 404, description = "Bookmark not found", body = ErrorBody)
    )
)]
pub async fn update_bookmark_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateProgressRequest>,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let bookmark_id = parse_path_id(&id, "bookmark")?;
    let progress = req
        .progress
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("Progress must be a valid number".to_string()))
        .and_then(parse_progress)?;

    let bookmark = state.db.update_bookmark_progress(bookmark_id, progress).await?;
    Ok(Json(bookmark.into()))
}

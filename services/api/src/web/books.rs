//! services/api/src/web/books.rs
//!
//! Catalog endpoints: list, fetch, create, update and delete books.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bookshelf_core::domain::{Book, Category, ContentBlock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::error::{ApiError, ErrorBody};
use crate::web::auth::MessageResponse;
use crate::web::book_form::{BookForm, BookPayload, UploadedFile};
use crate::web::extract::parse_path_id;
use crate::web::state::AppState;

//=========================================================================================
// Response Types
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryResponse {
    pub id: i64,
    pub name: String,
}

impl From<Category> for CategoryResponse {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockResponse {
    pub id: i64,
    pub book_id: i64,
    #[serde(rename = "type")]
    pub block_type: String,
    pub content: String,
    pub order: i32,
}

impl From<ContentBlock> for ContentBlockResponse {
    fn from(block: ContentBlock) -> Self {
        Self {
            id: block.id,
            book_id: block.book_id,
            block_type: block.block_type,
            content: block.content,
            order: block.order,
        }
    }
}

/// A book with its categories and ordered content blocks.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookResponse {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub language: String,
    pub cover_image: Option<String>,
    pub small_description: Option<String>,
    pub content: Option<String>,
    pub page_count: Option<i32>,
    pub audio_link: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub related_info: Option<Value>,
    pub layout: String,
    pub images: Vec<String>,
    pub categories: Vec<CategoryResponse>,
    pub content_blocks: Vec<ContentBlockResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            language: book.language,
            cover_image: book.cover_image,
            small_description: book.small_description,
            content: book.content,
            page_count: book.page_count,
            audio_link: book.audio_link,
            related_info: book.related_info,
            layout: book.layout.to_string(),
            images: book.images,
            categories: book.categories.into_iter().map(Into::into).collect(),
            content_blocks: book.content_blocks.into_iter().map(Into::into).collect(),
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

pub fn to_responses(books: Vec<Book>) -> Vec<BookResponse> {
    books.into_iter().map(BookResponse::from).collect()
}

//=========================================================================================
// Upload Helpers
//=========================================================================================

async fn save_upload(state: &AppState, file: UploadedFile) -> Result<String, ApiError> {
    state
        .storage
        .save_file(&file.file_name, &file.data)
        .await
        .map_err(|e| {
            error!("Failed to store upload '{}': {:?}", file.file_name, e);
            ApiError::Internal("Failed to store uploaded file".to_string())
        })
}

/// Stores the uploaded files and returns the cover ref and the gallery refs.
/// Files saved before a failure are left in place.
async fn store_uploads(
    state: &AppState,
    cover: Option<UploadedFile>,
    images: Vec<UploadedFile>,
) -> Result<(Option<String>, Option<Vec<String>>), ApiError> {
    let cover_ref = match cover {
        Some(file) => Some(save_upload(state, file).await?),
        None => None,
    };
    let mut image_refs = Vec::with_capacity(images.len());
    for file in images {
        image_refs.push(save_upload(state, file).await?);
    }
    let image_refs = (!image_refs.is_empty()).then_some(image_refs);
    Ok((cover_ref, image_refs))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /books - Every book with categories and content blocks
#[utoipa::path(
    get,
    path = "/books",
    responses(
        (status = 200, description = "All books", body = [BookResponse]),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn list_books_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BookResponse>>, ApiError> {
    let books = state.db.list_books().await?;
    Ok(Json(to_responses(books)))
}

/// GET /books/{id} - One book
#[utoipa::path(
    get,
    path = "/books/{id}",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "The book", body = BookResponse),
        (status = 400, description = "Invalid book ID", body = ErrorBody),
        (status = 404, description = "Book not found", body = ErrorBody)
    )
)]
pub async fn get_book_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BookResponse>, ApiError> {
    let book_id = parse_path_id(&id, "book")?;
    let book = state.db.get_book(book_id).await?;
    Ok(Json(book.into()))
}

/// POST /books - Create a book (JSON or multipart)
#[utoipa::path(
    post,
    path = "/books",
    request_body(
        content = BookPayload,
        description = "Book fields as JSON, or the same fields as multipart/form-data with optional `coverImage` and `images` files."
    ),
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 400, description = "Missing required fields or invalid input", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    )
)]
pub async fn create_book_handler(
    State(state): State<Arc<AppState>>,
    form: BookForm,
) -> Result<impl IntoResponse, ApiError> {
    let mut draft = form.payload.into_draft()?;

    let (cover_ref, image_refs) = store_uploads(&state, form.cover_upload, form.image_uploads).await?;
    if let Some(cover_ref) = cover_ref {
        draft.cover_image = Some(cover_ref);
    }
    if let Some(image_refs) = image_refs {
        draft.images = image_refs;
    }

    let book = state.db.create_book(draft).await?;
    info!("Created book {} '{}'", book.id, book.title);
    Ok((StatusCode::CREATED, Json(BookResponse::from(book))))
}

/// PUT /books/{id} - Update a book (JSON or multipart)
#[utoipa::path(
    put,
    path = "/books/{id}",
    params(("id" = i64, Path, description = "Book id")),
    request_body(
        content = BookPayload,
        description = "Fields to change, as JSON or multipart/form-data. Categories and content blocks are replaced."
    ),
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 400, description = "Invalid book ID or input", body = ErrorBody),
        (status = 404, description = "Book not found", body = ErrorBody)
    )
)]
pub async fn update_book_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    form: BookForm,
) -> Result<Json<BookResponse>, ApiError> {
    let book_id = parse_path_id(&id, "book")?;
    let mut changes = form.payload.into_changes()?;

    // No files are written for a book that does not exist.
    if form.cover_upload.is_some() || !form.image_uploads.is_empty() {
        state.db.get_book(book_id).await?;
    }
    let (cover_ref, image_refs) = store_uploads(&state, form.cover_upload, form.image_uploads).await?;
    if cover_ref.is_some() {
        changes.cover_image = cover_ref;
    }
    if image_refs.is_some() {
        changes.images = image_refs;
    }

    let book = state.db.update_book(book_id, changes).await?;
    info!("Updated book {}", book.id);
    Ok(Json(book.into()))
}

/// DELETE /books/{id} - Delete a book and its bookmarks
#[utoipa::path(
    delete,
    path = "/books/{id}",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 400, description = "Invalid book ID", body = ErrorBody),
        (status = 404, description = "Book not found", body = ErrorBody)
    )
)]
pub async fn delete_book_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let book_id = parse_path_id(&id, "book")?;
    state.db.delete_book(book_id).await?;
    info!("Deleted book {}", book_id);
    Ok(Json(MessageResponse {
        message: "Book deleted successfully".to_string(),
    }))
}

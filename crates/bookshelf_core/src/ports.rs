//! crates/bookshelf_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or disks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Book, BookChanges, BookDraft, Bookmark, BookmarkWithBook, Category, FeaturedBooks, NewUser,
    ProfileUpdate, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn update_user_profile(&self, user_id: i64, update: ProfileUpdate) -> PortResult<User>;

    // --- Catalog ---
    async fn list_books(&self) -> PortResult<Vec<Book>>;

    async fn get_book(&self, book_id: i64) -> PortResult<Book>;

    /// Creates the book, any missing categories and its content blocks as one unit.
    async fn create_book(&self, draft: BookDraft) -> PortResult<Book>;

    /// Applies the changes, sets the category association and replaces all
    /// content blocks as one unit.
    async fn update_book(&self, book_id: i64, changes: BookChanges) -> PortResult<Book>;

    /// Deletes the book; bookmarks, content blocks and associations go with it.
    async fn delete_book(&self, book_id: i64) -> PortResult<()>;

    async fn search_books(&self, query: &str) -> PortResult<Vec<Book>>;

    /// Books with bookmark activity since `active_since`, and the most bookmarked books.
    async fn featured_books(
        &self,
        active_since: DateTime<Utc>,
        limit: usize,
    ) -> PortResult<FeaturedBooks>;

    async fn list_categories(&self) -> PortResult<Vec<Category>>;

    // --- Reading Progress ---
    async fn list_bookmarks_for_user(&self, user_id: i64) -> PortResult<Vec<BookmarkWithBook>>;

    /// Creates or updates the single bookmark for (user, book). Fails with
    /// `NotFound` when either the book or the user does not exist.
    async fn upsert_bookmark(&self, user_id: i64, book_id: i64, progress: f64)
        -> PortResult<Bookmark>;

    async fn update_bookmark_progress(&self, bookmark_id: i64, progress: f64)
        -> PortResult<Bookmark>;
}

#[async_trait]
pub trait FileStorageService: Send + Sync {
    /// Persists the bytes and returns the public reference path of the stored file.
    async fn save_file(&self, original_name: &str, data: &[u8]) -> PortResult<String>;
}

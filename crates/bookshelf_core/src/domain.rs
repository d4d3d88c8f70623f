//! crates/bookshelf_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or wire format.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Users
//=========================================================================================

/// Represents a user - used throughout the app. Never carries the password hash.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub mobile: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Data needed to create a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub mobile: Option<String>,
}

/// A partial profile update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub mobile: Option<String>,
}

//=========================================================================================
// Catalog
//=========================================================================================

/// How a book's content is laid out by the reader UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    FullText,
    ImageTopTextBottom,
    TextTopImageBottom,
    #[default]
    Mixed,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::FullText => "FULL_TEXT",
            Layout::ImageTopTextBottom => "IMAGE_TOP_TEXT_BOTTOM",
            Layout::TextTopImageBottom => "TEXT_TOP_IMAGE_BOTTOM",
            Layout::Mixed => "MIXED",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown layout '{0}'")]
pub struct UnknownLayout(pub String);

impl FromStr for Layout {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FULL_TEXT" => Ok(Layout::FullText),
            "IMAGE_TOP_TEXT_BOTTOM" => Ok(Layout::ImageTopTextBottom),
            "TEXT_TOP_IMAGE_BOTTOM" => Ok(Layout::TextTopImageBottom),
            "MIXED" => Ok(Layout::Mixed),
            _ => Err(UnknownLayout(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// One ordered unit of a book's body.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub id: i64,
    pub book_id: i64,
    pub block_type: String,
    pub content: String,
    pub order: i32,
}

/// A content block as submitted by a caller, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewContentBlock {
    pub block_type: String,
    pub content: String,
    pub order: i32,
}

/// The catalog aggregate: a book with its categories and content blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub language: String,
    pub cover_image: Option<String>,
    pub small_description: Option<String>,
    pub content: Option<String>,
    pub page_count: Option<i32>,
    pub audio_link: Option<String>,
    pub related_info: Option<Value>,
    pub layout: Layout,
    pub images: Vec<String>,
    pub categories: Vec<Category>,
    pub content_blocks: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fully validated "create book" command.
#[derive(Debug, Clone, PartialEq)]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub language: String,
    pub cover_image: Option<String>,
    pub small_description: Option<String>,
    pub content: Option<String>,
    pub page_count: Option<i32>,
    pub audio_link: Option<String>,
    pub related_info: Option<Value>,
    pub layout: Layout,
    pub images: Vec<String>,
    pub category_names: Vec<String>,
    pub content_blocks: Vec<NewContentBlock>,
}

/// A fully validated "update book" command.
///
/// Scalar `None`s leave the stored value as is. Categories and content blocks
/// are always replaced with the given lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookChanges {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub cover_image: Option<String>,
    pub small_description: Option<String>,
    pub content: Option<String>,
    pub page_count: Option<i32>,
    pub audio_link: Option<String>,
    pub related_info: Option<Value>,
    pub layout: Option<Layout>,
    pub images: Option<Vec<String>>,
    pub category_names: Vec<String>,
    pub content_blocks: Vec<NewContentBlock>,
}

/// Books highlighted on the landing page.
#[derive(Debug, Clone, Default)]
pub struct FeaturedBooks {
    pub trending: Vec<Book>,
    pub recommended: Vec<Book>,
}

//=========================================================================================
// Reading progress
//=========================================================================================

/// A user's reading progress in one book. Unique per (user, book).
#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BookmarkWithBook {
    pub bookmark: Bookmark,
    pub book: Book,
}

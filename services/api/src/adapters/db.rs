//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use bookshelf_core::catalog::{missing_category_names, normalize_category_names};
use bookshelf_core::domain::{
    Book, BookChanges, BookDraft, Bookmark, BookmarkWithBook, Category, ContentBlock,
    FeaturedBooks, NewContentBlock, NewUser, ProfileUpdate, UnknownLayout, User,
    UserCredentials,
};
use bookshelf_core::ports::{DatabaseService, PortError, PortResult};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use tracing::info;

const USER_COLUMNS: &str = "id, email, password_hash, full_name, mobile, created_at";
const BOOK_COLUMNS: &str = "id, title, author, language, cover_image, small_description, \
     content, page_count, audio_link, related_info, layout, images, created_at, updated_at";
const BOOKMARK_COLUMNS: &str = "id, user_id, book_id, progress, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Closes every pooled connection. Called once on shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    email: String,
    password_hash: String,
    full_name: String,
    mobile: Option<String>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            mobile: self.mobile,
            created_at: self.created_at,
        }
    }

    fn to_credentials(mut self) -> UserCredentials {
        let password_hash = std::mem::take(&mut self.password_hash);
        UserCredentials {
            user: self.to_domain(),
            password_hash,
        }
    }
}

#[derive(FromRow)]
struct BookRecord {
    id: i64,
    title: String,
    author: String,
    language: String,
    cover_image: Option<String>,
    small_description: Option<String>,
    content: Option<String>,
    page_count: Option<i32>,
    audio_link: Option<String>,
    related_info: Option<Value>,
    layout: String,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl BookRecord {
    fn to_domain(
        self,
        categories: Vec<Category>,
        content_blocks: Vec<ContentBlock>,
    ) -> PortResult<Book> {
        let layout = self.layout.parse().map_err(|e: UnknownLayout| {
            PortError::Unexpected(format!("Book {} has unknown layout '{}'", self.id, e.0))
        })?;
        Ok(Book {
            id: self.id,
            title: self.title,
            author: self.author,
            language: self.language,
            cover_image: self.cover_image,
            small_description: self.small_description,
            content: self.content,
            page_count: self.page_count,
            audio_link: self.audio_link,
            related_info: self.related_info,
            layout,
            images: self.images,
            categories,
            content_blocks,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CategoryRecord {
    id: i64,
    name: String,
}
impl CategoryRecord {
    fn to_domain(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
        }
    }
}

#[derive(FromRow)]
struct BookCategoryRecord {
    book_id: i64,
    id: i64,
    name: String,
}

#[derive(FromRow)]
struct ContentBlockRecord {
    id: i64,
    book_id: i64,
    block_type: String,
    content: String,
    sort_order: i32,
}
impl ContentBlockRecord {
    fn to_domain(self) -> ContentBlock {
        ContentBlock {
            id: self.id,
            book_id: self.book_id,
            block_type: self.block_type,
            content: self.content,
            order: self.sort_order,
        }
    }
}

#[derive(FromRow)]
struct BookmarkRecord {
    id: i64,
    user_id: i64,
    book_id: i64,
    progress: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl BookmarkRecord {
    fn to_domain(self) -> Bookmark {
        Bookmark {
            id: self.id,
            user_id: self.user_id,
            book_id: self.book_id,
            progress: self.progress,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// Query Helpers
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn book_not_found() -> PortError {
    PortError::NotFound("Book not found".to_string())
}

fn user_not_found() -> PortError {
    PortError::NotFound("User not found".to_string())
}

/// A bookmark write whose book or user vanished after the existence checks
/// trips a foreign key; the constraint name tells which one.
fn bookmark_write_error(e: sqlx::Error) -> PortError {
    match e.as_database_error() {
        Some(db_err) if db_err.is_foreign_key_violation() => {
            missing_bookmark_target(db_err.constraint())
        }
        _ => unexpected(e),
    }
}

fn missing_bookmark_target(constraint: Option<&str>) -> PortError {
    match constraint {
        Some(name) if name.contains("user_id") => user_not_found(),
        _ => book_not_found(),
    }
}

/// Escapes `%`, `_` and `\` so user input is matched literally by `ILIKE`.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Loads categories and content blocks for the given rows, keeping row order.
async fn hydrate_books(conn: &mut PgConnection, records: Vec<BookRecord>) -> PortResult<Vec<Book>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i64> = records.iter().map(|r| r.id).collect();

    let category_links = sqlx::query_as::<_, BookCategoryRecord>(
        "SELECT bc.book_id, c.id, c.name FROM book_categories bc \
         JOIN categories c ON c.id = bc.category_id \
         WHERE bc.book_id = ANY($1) ORDER BY c.name ASC",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await
    .map_err(unexpected)?;

    let blocks = sqlx::query_as::<_, ContentBlockRecord>(
        "SELECT id, book_id, block_type, content, sort_order FROM content_blocks \
         WHERE book_id = ANY($1) ORDER BY sort_order ASC, id ASC",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await
    .map_err(unexpected)?;

    let mut categories_by_book: HashMap<i64, Vec<Category>> = HashMap::new();
    for link in category_links {
        categories_by_book.entry(link.book_id).or_default().push(Category {
            id: link.id,
            name: link.name,
        });
    }
    let mut blocks_by_book: HashMap<i64, Vec<ContentBlock>> = HashMap::new();
    for block in blocks {
        blocks_by_book
            .entry(block.book_id)
            .or_default()
            .push(block.to_domain());
    }

    records
        .into_iter()
        .map(|record| {
            let categories = categories_by_book.remove(&record.id).unwrap_or_default();
            let content_blocks = blocks_by_book.remove(&record.id).unwrap_or_default();
            record.to_domain(categories, content_blocks)
        })
        .collect()
}

async fn load_book(conn: &mut PgConnection, book_id: i64) -> PortResult<Book> {
    let record = sqlx::query_as::<_, BookRecord>(&format!(
        "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
    ))
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(unexpected)?
    .ok_or_else(book_not_found)?;

    hydrate_books(conn, vec![record])
        .await?
        .pop()
        .ok_or_else(book_not_found)
}

/// Creates missing categories and sets the book's association to exactly `names`.
async fn set_book_categories(
    conn: &mut PgConnection,
    book_id: i64,
    names: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM book_categories WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    if names.is_empty() {
        return Ok(());
    }

    let existing: Vec<Category> = sqlx::query_as::<_, CategoryRecord>(
        "SELECT id, name FROM categories WHERE name = ANY($1)",
    )
    .bind(names)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(CategoryRecord::to_domain)
    .collect();

    let missing = missing_category_names(names, &existing);
    if !missing.is_empty() {
        // A concurrent writer may create the same name first; the unique index
        // makes that a no-op instead of a duplicate row.
        let created = sqlx::query(
            "INSERT INTO categories (name) SELECT UNNEST($1::text[]) ON CONFLICT (name) DO NOTHING",
        )
        .bind(&missing[..])
        .execute(&mut *conn)
        .await?
        .rows_affected();
        info!("Created {} new categories for book {}", created, book_id);
    }

    sqlx::query(
        "INSERT INTO book_categories (book_id, category_id) \
         SELECT $1, id FROM categories WHERE name = ANY($2)",
    )
    .bind(book_id)
    .bind(names)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Deletes every content block of the book and inserts `blocks` with their given order.
async fn replace_content_blocks(
    conn: &mut PgConnection,
    book_id: i64,
    blocks: &[NewContentBlock],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM content_blocks WHERE book_id = $1")
        .bind(book_id)
        .execute(&mut *conn)
        .await?;
    if blocks.is_empty() {
        return Ok(());
    }

    let types: Vec<String> = blocks.iter().map(|b| b.block_type.clone()).collect();
    let contents: Vec<String> = blocks.iter().map(|b| b.content.clone()).collect();
    let orders: Vec<i32> = blocks.iter().map(|b| b.order).collect();
    sqlx::query(
        "INSERT INTO content_blocks (book_id, block_type, content, sort_order) \
         SELECT $1, t.block_type, t.content, t.sort_order \
         FROM UNNEST($2::text[], $3::text[], $4::int4[]) AS t(block_type, content, sort_order)",
    )
    .bind(book_id)
    .bind(&types[..])
    .bind(&contents[..])
    .bind(&orders[..])
    .execute(&mut *conn)
    .await?;
    Ok(())
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (email, password_hash, full_name, mobile) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.full_name)
        .bind(&new_user.mobile)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => {
                PortError::Conflict("Email already registered".to_string())
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(user_not_found)?;
        Ok(record.to_credentials())
    }

    async fn update_user_profile(&self, user_id: i64, update: ProfileUpdate) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET full_name = COALESCE($2, full_name), mobile = COALESCE($3, mobile) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(update.full_name)
        .bind(update.mobile)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(user_not_found)?;
        Ok(record.to_domain())
    }

    async fn list_books(&self) -> PortResult<Vec<Book>> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY id ASC"
        ))
        .fetch_all(&mut *conn)
        .await
        .map_err(unexpected)?;
        hydrate_books(&mut conn, records).await
    }

    async fn get_book(&self, book_id: i64) -> PortResult<Book> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        load_book(&mut conn, book_id).await
    }

    async fn create_book(&self, draft: BookDraft) -> PortResult<Book> {
        let category_names = normalize_category_names(&draft.category_names);
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let book_id: i64 = sqlx::query_scalar(
            "INSERT INTO books (title, author, language, cover_image, small_description, content, \
             page_count, audio_link, related_info, layout, images) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
        )
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.language)
        .bind(&draft.cover_image)
        .bind(&draft.small_description)
        .bind(&draft.content)
        .bind(draft.page_count)
        .bind(&draft.audio_link)
        .bind(&draft.related_info)
        .bind(draft.layout.as_str())
        .bind(&draft.images[..])
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        set_book_categories(&mut tx, book_id, &category_names)
            .await
            .map_err(unexpected)?;
        replace_content_blocks(&mut tx, book_id, &draft.content_blocks)
            .await
            .map_err(unexpected)?;
        let book = load_book(&mut tx, book_id).await?;

        tx.commit().await.map_err(unexpected)?;
        Ok(book)
    }

    async fn update_book(&self, book_id: i64, changes: BookChanges) -> PortResult<Book> {
        let category_names = normalize_category_names(&changes.category_names);
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query_scalar::<_, i64>(
            "UPDATE books SET \
               title = COALESCE($2, title), \
               author = COALESCE($3, author), \
               language = COALESCE($4, language), \
               cover_image = COALESCE($5, cover_image), \
               small_description = COALESCE($6, small_description), \
               content = COALESCE($7, content), \
               page_count = COALESCE($8, page_count), \
               audio_link = COALESCE($9, audio_link), \
               related_info = COALESCE($10, related_info), \
               layout = COALESCE($11, layout), \
               images = COALESCE($12, images), \
               updated_at = NOW() \
             WHERE id = $1 RETURNING id",
        )
        .bind(book_id)
        .bind(&changes.title)
        .bind(&changes.author)
        .bind(&changes.language)
        .bind(&changes.cover_image)
        .bind(&changes.small_description)
        .bind(&changes.content)
        .bind(changes.page_count)
        .bind(&changes.audio_link)
        .bind(&changes.related_info)
        .bind(changes.layout.map(|l| l.as_str()))
        .bind(changes.images.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(book_not_found)?;

        set_book_categories(&mut tx, book_id, &category_names)
            .await
            .map_err(unexpected)?;
        replace_content_blocks(&mut tx, book_id, &changes.content_blocks)
            .await
            .map_err(unexpected)?;
        let book = load_book(&mut tx, book_id).await?;

        tx.commit().await.map_err(unexpected)?;
        Ok(book)
    }

    async fn delete_book(&self, book_id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(book_not_found());
        }
        Ok(())
    }

    async fn search_books(&self, query: &str) -> PortResult<Vec<Book>> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books b \
             WHERE b.title ILIKE $1 ESCAPE '\\' \
                OR b.author ILIKE $1 ESCAPE '\\' \
                OR EXISTS ( \
                    SELECT 1 FROM book_categories bc \
                    JOIN categories c ON c.id = bc.category_id \
                    WHERE bc.book_id = b.id AND c.name ILIKE $1 ESCAPE '\\') \
             ORDER BY b.id ASC"
        ))
        .bind(like_pattern(query))
        .fetch_all(&mut *conn)
        .await
        .map_err(unexpected)?;
        hydrate_books(&mut conn, records).await
    }

    async fn featured_books(
        &self,
        active_since: DateTime<Utc>,
        limit: usize,
    ) -> PortResult<FeaturedBooks> {
        let limit = limit as i64;
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;

        let trending = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books \
             WHERE id IN (SELECT book_id FROM bookmarks WHERE updated_at >= $1) \
             ORDER BY id ASC LIMIT $2"
        ))
        .bind(active_since)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(unexpected)?;

        let recommended = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books b \
             ORDER BY (SELECT COUNT(*) FROM bookmarks bm WHERE bm.book_id = b.id) DESC, b.id ASC \
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(unexpected)?;

        Ok(FeaturedBooks {
            trending: hydrate_books(&mut conn, trending).await?,
            recommended: hydrate_books(&mut conn, recommended).await?,
        })
    }

    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name FROM categories ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_bookmarks_for_user(&self, user_id: i64) -> PortResult<Vec<BookmarkWithBook>> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        let bookmarks = sqlx::query_as::<_, BookmarkRecord>(&format!(
            "SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(unexpected)?;
        if bookmarks.is_empty() {
            return Ok(Vec::new());
        }

        let book_ids: Vec<i64> = bookmarks.iter().map(|b| b.book_id).collect();
        let records = sqlx::query_as::<_, BookRecord>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = ANY($1)"
        ))
        .bind(&book_ids[..])
        .fetch_all(&mut *conn)
        .await
        .map_err(unexpected)?;
        let books = hydrate_books(&mut conn, records).await?;

        // The foreign key guarantees every bookmark's book was loaded.
        let with_books = bookmarks
            .into_iter()
            .filter_map(|record| {
                let book = books.iter().find(|b| b.id == record.book_id)?.clone();
                Some(BookmarkWithBook {
                    bookmark: record.to_domain(),
                    book,
                })
            })
            .collect();
        Ok(with_books)
    }

    async fn upsert_bookmark(
        &self,
        user_id: i64,
        book_id: i64,
        progress: f64,
    ) -> PortResult<Bookmark> {
        let book_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE id = $1)")
                .bind(book_id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        if !book_exists {
            return Err(book_not_found());
        }
        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(unexpected)?;
        if !user_exists {
            return Err(user_not_found());
        }

        let record = sqlx::query_as::<_, BookmarkRecord>(&format!(
            "INSERT INTO bookmarks (user_id, book_id, progress) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, book_id) \
             DO UPDATE SET progress = EXCLUDED.progress, updated_at = NOW() \
             RETURNING {BOOKMARK_COLUMNS}"
        ))
        .bind(user_id)
        .bind(book_id)
        .bind(progress)
        .fetch_one(&self.pool)
        .await
        .map_err(bookmark_write_error)?;
        Ok(record.to_domain())
    }

    async fn update_bookmark_progress(
        &self,
        bookmark_id: i64,
        progress: f64,
    ) -> PortResult<Bookmark> {
        let record = sqlx::query_as::<_, BookmarkRecord>(&format!(
            "UPDATE bookmarks SET progress = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {BOOKMARK_COLUMNS}"
        ))
        .bind(bookmark_id)
        .bind(progress)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound("Bookmark not found".to_string()))?;
        Ok(record.to_domain())
    }
}

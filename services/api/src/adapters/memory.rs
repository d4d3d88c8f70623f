//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. It mirrors the
//! constraints of the PostgreSQL schema (unique emails, unique category names,
//! one bookmark per user and book, cascading deletes) and backs the
//! `memory://` database URL as well as the integration tests.

use async_trait::async_trait;
use bookshelf_core::catalog::{matches_query, missing_category_names, normalize_category_names};
use bookshelf_core::domain::{
    Book, BookChanges, BookDraft, Bookmark, BookmarkWithBook, Category, ContentBlock,
    FeaturedBooks, NewContentBlock, NewUser, ProfileUpdate, User, UserCredentials,
};
use bookshelf_core::ports::{DatabaseService, PortError, PortResult};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

const SEED_CATEGORIES: [&str; 5] = ["Fiction", "Non-Fiction", "Science Fiction", "Fantasy", "Mystery"];

#[derive(Default)]
struct MemoryState {
    next_user_id: i64,
    next_book_id: i64,
    next_category_id: i64,
    next_block_id: i64,
    next_bookmark_id: i64,
    users: Vec<UserCredentials>,
    /// Stored without categories and content blocks; those are joined on read.
    books: Vec<Book>,
    categories: Vec<Category>,
    book_categories: Vec<(i64, i64)>,
    content_blocks: Vec<ContentBlock>,
    bookmarks: Vec<Bookmark>,
}

impl MemoryState {
    fn assemble(&self, stored: &Book) -> Book {
        let mut book = stored.clone();
        book.categories = self
            .categories
            .iter()
            .filter(|c| self.book_categories.contains(&(stored.id, c.id)))
            .cloned()
            .collect();
        book.categories.sort_by(|a, b| a.name.cmp(&b.name));
        book.content_blocks = self
            .content_blocks
            .iter()
            .filter(|b| b.book_id == stored.id)
            .cloned()
            .collect();
        book.content_blocks.sort_by_key(|b| (b.order, b.id));
        book
    }

    fn find_book(&self, book_id: i64) -> PortResult<Book> {
        self.books
            .iter()
            .find(|b| b.id == book_id)
            .map(|b| self.assemble(b))
            .ok_or_else(book_not_found)
    }

    fn create_category(&mut self, name: &str) {
        // Names are unique, like the `categories.name` index.
        if self.categories.iter().any(|c| c.name == name) {
            return;
        }
        self.next_category_id += 1;
        self.categories.push(Category {
            id: self.next_category_id,
            name: name.to_string(),
        });
    }

    fn set_book_categories(&mut self, book_id: i64, names: &[String]) {
        for name in missing_category_names(names, &self.categories) {
            self.create_category(&name);
        }
        self.book_categories.retain(|(b, _)| *b != book_id);
        let ids: Vec<i64> = self
            .categories
            .iter()
            .filter(|c| names.contains(&c.name))
            .map(|c| c.id)
            .collect();
        self.book_categories
            .extend(ids.into_iter().map(|category_id| (book_id, category_id)));
    }

    fn replace_content_blocks(&mut self, book_id: i64, blocks: &[NewContentBlock]) {
        self.content_blocks.retain(|b| b.book_id != book_id);
        for block in blocks {
            self.next_block_id += 1;
            self.content_blocks.push(ContentBlock {
                id: self.next_block_id,
                book_id,
                block_type: block.block_type.clone(),
                content: block.content.clone(),
                order: block.order,
            });
        }
    }
}

fn book_not_found() -> PortError {
    PortError::NotFound("Book not found".to_string())
}

fn user_not_found() -> PortError {
    PortError::NotFound("User not found".to_string())
}

/// A `DatabaseService` that keeps everything in memory behind one async mutex.
pub struct InMemoryDb {
    state: Mutex<MemoryState>,
}

impl InMemoryDb {
    /// Creates a store holding the same seed categories as the SQL migrations.
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        for name in SEED_CATEGORIES {
            state.create_category(name);
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Number of stored bookmarks across all users.
    pub async fn bookmark_count(&self) -> usize {
        self.state.lock().await.bookmarks.len()
    }

    /// Number of categories with exactly this name.
    pub async fn category_count(&self, name: &str) -> usize {
        let state = self.state.lock().await;
        state.categories.iter().filter(|c| c.name == name).count()
    }
}

impl Default for InMemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.user.email == new_user.email) {
            return Err(PortError::Conflict("Email already registered".to_string()));
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            email: new_user.email,
            full_name: new_user.full_name,
            mobile: new_user.mobile,
            created_at: Utc::now(),
        };
        state.users.push(UserCredentials {
            user: user.clone(),
            password_hash: new_user.password_hash,
        });
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let state = self.state.lock().await;
        state
            .users
            .iter()
            .find(|u| u.user.email == email)
            .cloned()
            .ok_or_else(user_not_found)
    }

    async fn update_user_profile(&self, user_id: i64, update: ProfileUpdate) -> PortResult<User> {
        let mut state = self.state.lock().await;
        let stored = state
            .users
            .iter_mut()
            .find(|u| u.user.id == user_id)
            .ok_or_else(user_not_found)?;
        if let Some(full_name) = update.full_name {
            stored.user.full_name = full_name;
        }
        if let Some(mobile) = update.mobile {
            stored.user.mobile = Some(mobile);
        }
        Ok(stored.user.clone())
    }

    async fn list_books(&self) -> PortResult<Vec<Book>> {
        let state = self.state.lock().await;
        Ok(state.books.iter().map(|b| state.assemble(b)).collect())
    }

    async fn get_book(&self, book_id: i64) -> PortResult<Book> {
        self.state.lock().await.find_book(book_id)
    }

    async fn create_book(&self, draft: BookDraft) -> PortResult<Book> {
        let category_names = normalize_category_names(&draft.category_names);
        let mut state = self.state.lock().await;
        state.next_book_id += 1;
        let now = Utc::now();
        let book = Book {
            id: state.next_book_id,
            title: draft.title,
            author: draft.author,
            language: draft.language,
            cover_image: draft.cover_image,
            small_description: draft.small_description,
            content: draft.content,
            page_count: draft.page_count,
            audio_link: draft.audio_link,
            related_info: draft.related_info,
            layout: draft.layout,
            images: draft.images,
            categories: Vec::new(),
            content_blocks: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let book_id = book.id;
        state.books.push(book);
        state.set_book_categories(book_id, &category_names);
        state.replace_content_blocks(book_id, &draft.content_blocks);
        state.find_book(book_id)
    }

    async fn update_book(&self, book_id: i64, changes: BookChanges) -> PortResult<Book> {
        let category_names = normalize_category_names(&changes.category_names);
        let mut state = self.state.lock().await;
        let stored = state
            .books
            .iter_mut()
            .find(|b| b.id == book_id)
            .ok_or_else(book_not_found)?;

        if let Some(title) = changes.title {
            stored.title = title;
        }
        if let Some(author) = changes.author {
            stored.author = author;
        }
        if let Some(language) = changes.language {
            stored.language = language;
        }
        if let Some(cover_image) = changes.cover_image {
            stored.cover_image = Some(cover_image);
        }
        if let Some(small_description) = changes.small_description {
            stored.small_description = Some(small_description);
        }
        if let Some(content) = changes.content {
            stored.content = Some(content);
        }
        if let Some(page_count) = changes.page_count {
            stored.page_count = Some(page_count);
        }
        if let Some(audio_link) = changes.audio_link {
            stored.audio_link = Some(audio_link);
        }
        if let Some(related_info) = changes.related_info {
            stored.related_info = Some(related_info);
        }
        if let Some(layout) = changes.layout {
            stored.layout = layout;
        }
        if let Some(images) = changes.images {
            stored.images = images;
        }
        stored.updated_at = Utc::now();

        state.set_book_categories(book_id, &category_names);
        state.replace_content_blocks(book_id, &changes.content_blocks);
        state.find_book(book_id)
    }

    async fn delete_book(&self, book_id: i64) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let before = state.books.len();
        state.books.retain(|b| b.id != book_id);
        if state.books.len() == before {
            return Err(book_not_found());
        }
        state.book_categories.retain(|(b, _)| *b != book_id);
        state.content_blocks.retain(|b| b.book_id != book_id);
        state.bookmarks.retain(|b| b.book_id != book_id);
        Ok(())
    }

    async fn search_books(&self, query: &str) -> PortResult<Vec<Book>> {
        let state = self.state.lock().await;
        Ok(state
            .books
            .iter()
            .map(|b| state.assemble(b))
            .filter(|book| {
                matches_query(&book.title, query)
                    || matches_query(&book.author, query)
                    || book.categories.iter().any(|c| matches_query(&c.name, query))
            })
            .collect())
    }

    async fn featured_books(
        &self,
        active_since: DateTime<Utc>,
        limit: usize,
    ) -> PortResult<FeaturedBooks> {
        let state = self.state.lock().await;
        let trending = state
            .books
            .iter()
            .filter(|book| {
                state
                    .bookmarks
                    .iter()
                    .any(|bm| bm.book_id == book.id && bm.updated_at >= active_since)
            })
            .take(limit)
            .map(|b| state.assemble(b))
            .collect();

        let mut ranked: Vec<(usize, &Book)> = state
            .books
            .iter()
            .map(|book| {
                let count = state.bookmarks.iter().filter(|bm| bm.book_id == book.id).count();
                (count, book)
            })
            .collect();
        // Stable sort keeps id order among equal counts.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        let recommended = ranked
            .into_iter()
            .take(limit)
            .map(|(_, b)| state.assemble(b))
            .collect();

        Ok(FeaturedBooks {
            trending,
            recommended,
        })
    }

    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        let state = self.state.lock().await;
        let mut categories = state.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn list_bookmarks_for_user(&self, user_id: i64) -> PortResult<Vec<BookmarkWithBook>> {
        let state = self.state.lock().await;
        let mut bookmarks: Vec<&Bookmark> =
            state.bookmarks.iter().filter(|b| b.user_id == user_id).collect();
        bookmarks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        bookmarks
            .into_iter()
            .map(|bookmark| {
                Ok(BookmarkWithBook {
                    bookmark: bookmark.clone(),
                    book: state.find_book(bookmark.book_id)?,
                })
            })
            .collect()
    }

    async fn upsert_bookmark(
        &self,
        user_id: i64,
        book_id: i64,
        progress: f64,
    ) -> PortResult<Bookmark> {
        let mut state = self.state.lock().await;
        if !state.books.iter().any(|b| b.id == book_id) {
            return Err(book_not_found());
        }
        if !state.users.iter().any(|u| u.user.id == user_id) {
            return Err(user_not_found());
        }

        let now = Utc::now();
        if let Some(existing) = state
            .bookmarks
            .iter_mut()
            .find(|b| b.user_id == user_id && b.book_id == book_id)
        {
            existing.progress = progress;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        state.next_bookmark_id += 1;
        let bookmark = Bookmark {
            id: state.next_bookmark_id,
            user_id,
            book_id,
            progress,
            created_at: now,
            updated_at: now,
        };
        state.bookmarks.push(bookmark.clone());
        Ok(bookmark)
    }

    async fn update_bookmark_progress(
        &self,
        bookmark_id: i64,
        progress: f64,
    ) -> PortResult<Bookmark> {
        let mut state = self.state.lock().await;
        let bookmark = state
            .bookmarks
            .iter_mut()
            .find(|b| b.id == bookmark_id)
            .ok_or_else(|| PortError::NotFound("Bookmark not found".to_string()))?;
        bookmark.progress = progress;
        bookmark.updated_at = Utc::now();
        Ok(bookmark.clone())
    }
}

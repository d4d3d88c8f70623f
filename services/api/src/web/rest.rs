//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::error::ErrorBody;
use crate::web::{auth, book_form, bookmarks, books, categories, profile, search};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        profile::update_profile_handler,
        books::list_books_handler,
        books::get_book_handler,
        books::create_book_handler,
        books::update_book_handler,
        books::delete_book_handler,
        categories::list_categories_handler,
        categories::featured_handler,
        search::search_handler,
        bookmarks::list_bookmarks_handler,
        bookmarks::upsert_bookmark_handler,
        bookmarks::update_bookmark_handler,
    ),
    components(
        schemas(
            ErrorBody,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::UserResponse,
            auth::UserEnvelope,
            auth::LoginResponse,
            auth::MessageResponse,
            auth::SessionResponse,
            profile::UpdateProfileRequest,
            book_form::BookPayload,
            book_form::ContentBlockPayload,
            books::BookResponse,
            books::CategoryResponse,
            books::ContentBlockResponse,
            categories::FeaturedResponse,
            bookmarks::UpsertBookmarkRequest,
            bookmarks::UpdateProgressRequest,
            bookmarks::BookmarkResponse,
            bookmarks::BookmarkWithBookResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Bookshelf API", description = "Accounts, catalog, search and reading progress.")
    )
)]
pub struct ApiDoc;

/// Registers the two ways a session token may be presented.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("token"))),
        );
    }
}

//! services/api/src/web/router.rs
//!
//! Assembles the HTTP router: public and protected routes, static uploads,
//! and the CORS, body-limit and tracing layers.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

use crate::adapters::uploads::UPLOADS_PREFIX;
use crate::config::Config;
use crate::web::{
    auth::{login_handler, logout_handler, me_handler, register_handler},
    bookmarks::{list_bookmarks_handler, update_bookmark_handler, upsert_bookmark_handler},
    books::{
        create_book_handler, delete_book_handler, get_book_handler, list_books_handler,
        update_book_handler,
    },
    categories::{featured_handler, list_categories_handler},
    middleware::require_auth,
    profile::update_profile_handler,
    search::search_handler,
    state::AppState,
};

/// With credentials enabled the origin can't be a wildcard, so an empty
/// allow-list mirrors the caller's origin instead.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/books", get(list_books_handler).post(create_book_handler))
        .route(
            "/books/{id}",
            get(get_book_handler)
                .put(update_book_handler)
                .delete(delete_book_handler),
        )
        .route("/categories", get(list_categories_handler))
        .route("/categories/featured", get(featured_handler))
        .route("/search", get(search_handler))
        .route(
            "/bookmarks",
            get(list_bookmarks_handler).post(upsert_bookmark_handler),
        )
        .route("/bookmarks/{id}", put(update_bookmark_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/user", patch(update_profile_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(UPLOADS_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub mod auth;
pub mod book_form;
pub mod bookmarks;
pub mod books;
pub mod categories;
pub mod extract;
pub mod middleware;
pub mod profile;
pub mod rest;
pub mod router;
pub mod search;
pub mod state;
pub mod token;

// Re-export the router builder so the binary and the integration tests
// assemble the same application.
pub use router::build_router;

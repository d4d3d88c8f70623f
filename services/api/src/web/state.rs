//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::web::token::TokenService;
use bookshelf_core::ports::{DatabaseService, FileStorageService};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub storage: Arc<dyn FileStorageService>,
    pub tokens: Arc<TokenService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        storage: Arc<dyn FileStorageService>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            storage,
            tokens: Arc::new(TokenService::new(config.jwt_secret.as_bytes())),
            config,
        }
    }
}

//! services/api/src/adapters/uploads.rs
//!
//! Local-disk implementation of the `FileStorageService` port. Files are
//! written under the configured upload directory, which the router serves
//! publicly under `/uploads/`.

use async_trait::async_trait;
use bookshelf_core::ports::{FileStorageService, PortError, PortResult};
use chrono::Utc;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;
use uuid::Uuid;

/// Public URL prefix of stored files.
pub const UPLOADS_PREFIX: &str = "/uploads";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    /// Creates the adapter, making sure the upload directory exists.
    pub async fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keeps only short alphanumeric extensions; anything else is stored as `.bin`.
fn sanitized_extension(original_name: &str) -> String {
    static EXTENSION: OnceLock<Regex> = OnceLock::new();
    let re = EXTENSION.get_or_init(|| Regex::new(r"\.([A-Za-z0-9]{1,10})$").expect("valid regex"));
    re.captures(original_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// `<unix-millis>-<random>.<ext>`
fn unique_file_name(original_name: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        &random[..12],
        sanitized_extension(original_name)
    )
}

//=========================================================================================
// `FileStorageService` Trait Implementation
//=========================================================================================

#[async_trait]
impl FileStorageService for LocalFileStorage {
    async fn save_file(&self, original_name: &str, data: &[u8]) -> PortResult<String> {
        let file_name = unique_file_name(original_name);
        let path = self.root.join(&file_name);
        tokio::fs::write(&path, data).await.map_err(|e| {
            PortError::Unexpected(format!("Failed to write {}: {}", path.display(), e))
        })?;
        info!("Stored upload '{}' as {} ({} bytes)", original_name, file_name, data.len());
        Ok(format!("{}/{}", UPLOADS_PREFIX, file_name))
    }
}

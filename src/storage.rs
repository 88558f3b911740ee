// src/storage.rs

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;

/// A stored image as the rest of the system sees it: a public URL plus the
/// opaque key needed to delete it later. This is also the shape persisted
/// inside the `items.images` JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    pub url: String,
    pub storage_key: String,
}

/// Image storage contract. Selected once at startup and injected through
/// `AppState`; handlers never reach for a global.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists raw image bytes and returns the public URL + storage key.
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<StoredImage, AppError>;

    /// Removes a previously stored image. Idempotent: deleting a key that is
    /// already gone is not an error.
    async fn delete(&self, storage_key: &str) -> Result<(), AppError>;
}

pub type DynImageStore = Arc<dyn ImageStore>;

/// Picks the backend configured by `IMAGE_STORAGE`.
pub fn from_config(config: &Config) -> DynImageStore {
    match config.image_storage.as_str() {
        "disabled" => {
            tracing::warn!("Image storage disabled. Uploads will return placeholder URLs.");
            Arc::new(PlaceholderImageStore)
        }
        _ => Arc::new(LocalImageStore::new(
            PathBuf::from(&config.upload_dir),
            "/uploads".to_string(),
        )),
    }
}

/// Local filesystem backend. Files are written under `root` with a
/// uuid-v4 name and served back through the static `/uploads` route.
pub struct LocalImageStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalImageStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self { root, url_prefix }
    }

    /// Derive a file extension from the part's content type.
    fn extension(content_type: &str) -> &str {
        match content_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<StoredImage, AppError> {
        let key = format!("{}.{}", Uuid::new_v4(), Self::extension(content_type));

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        let path = self.root.join(&key);
        fs::write(&path, &data)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        Ok(StoredImage {
            url: format!("{}/{}", self.url_prefix, key),
            storage_key: key,
        })
    }

    async fn delete(&self, storage_key: &str) -> Result<(), AppError> {
        // Keys are generated uuid file names; reject anything that could
        // escape the upload directory.
        if storage_key.contains('/') || storage_key.contains("..") {
            return Err(AppError::BadRequest("Invalid storage key".to_string()));
        }

        match fs::remove_file(self.root.join(storage_key)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::InternalServerError(e.to_string())),
        }
    }
}

/// Dev-mode backend used when no storage is configured: uploads succeed with
/// a placeholder URL and never touch disk, deletion is a no-op.
pub struct PlaceholderImageStore;

#[async_trait]
impl ImageStore for PlaceholderImageStore {
    async fn upload(&self, _data: Bytes, _content_type: &str) -> Result<StoredImage, AppError> {
        Ok(StoredImage {
            url: "https://via.placeholder.com/400x300?text=Image+Upload+Disabled".to_string(),
            storage_key: format!("dummy-image-{}", Uuid::new_v4()),
        })
    }

    async fn delete(&self, _storage_key: &str) -> Result<(), AppError> {
        Ok(())
    }
}

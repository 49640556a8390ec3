// Asset storage abstraction for local disk and R2 backends

pub mod key;
pub mod local;
pub mod r2;

pub use key::{content_type_for, generate_key, is_valid_key, normalize_reference};
pub use local::LocalBackend;
pub use r2::R2Backend;

use crate::error::AppResult;

/// Backend-independent store of image assets, addressed by key.
#[tonic::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Stores the asset under `key`, replacing any previous content. Returns
    /// the backend-specific location string.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<String>;

    /// Fails with `NotFound` when no asset exists under `key`.
    async fn download(&self, key: &str) -> AppResult<Vec<u8>>;

    /// Deleting a missing asset is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    async fn list_keys(&self) -> AppResult<Vec<String>>;

    /// Deletes every asset and returns how many were removed.
    async fn purge(&self) -> AppResult<u64> {
        let keys = self.list_keys().await?;
        let mut removed = 0;
        for key in &keys {
            self.delete(key).await?;
            removed += 1;
        }
        tracing::info!("Purged {} assets from {}", removed, self.location());
        Ok(removed)
    }

    /// Human-readable location for logs (directory or bucket name).
    fn location(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_purge_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path()).await.unwrap();
        backend.upload("a.png", b"a", "image/png").await.unwrap();
        backend.upload("b.jpg", b"b", "image/jpeg").await.unwrap();

        let backend: &dyn StorageBackend = &backend;
        assert_eq!(backend.purge().await.unwrap(), 2);
        assert!(backend.list_keys().await.unwrap().is_empty());
    }
}

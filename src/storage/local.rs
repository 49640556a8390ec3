use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

use super::{is_valid_key, StorageBackend};

/// Assets as plain files in a single directory.
pub struct LocalBackend {
    root: PathBuf,
    location: String,
}

impl LocalBackend {
    pub async fn new(root: impl AsRef<Path>) -> AppResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            AppError::Storage(format!("Cannot create asset directory {:?}: {}", root, e))
        })?;
        let location = root.display().to_string();
        Ok(Self { root, location })
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        if !is_valid_key(key) {
            return Err(AppError::InvalidInput(format!("invalid asset key '{}'", key)));
        }
        Ok(self.root.join(key))
    }
}

#[tonic::async_trait]
impl StorageBackend for LocalBackend {
    async fn upload(&self, key: &str, data: &[u8], _content_type: &str) -> AppResult<String> {
        let path = self.path_for(key)?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Local upload failed: {}", e)))?;

        tracing::info!("Local upload: dir={}, key={}, size={}", self.location, key, data.len());
        Ok(path.display().to_string())
    }

    async fn download(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Asset not found: {}", key)))
            }
            Err(e) => Err(AppError::Storage(format!("Local download failed: {}", e))),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Local delete: dir={}, key={}", self.location, key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Local delete failed: {}", e))),
        }
    }

    async fn list_keys(&self) -> AppResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot list {}: {}", self.location, e)))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn location(&self) -> &str {
        &self.location
    }
}

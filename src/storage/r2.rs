use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::Region;

use crate::config::R2Settings;
use crate::error::{AppError, AppResult};

use super::{is_valid_key, StorageBackend};

pub struct R2Backend {
    bucket: Box<Bucket>,
    bucket_name: String,
    prefix: String,
}

impl R2Backend {
    pub fn new(settings: &R2Settings) -> AppResult<Self> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: format!("https://{}.r2.cloudflarestorage.com", settings.account_id),
        };

        let credentials = Credentials::new(
            Some(&settings.access_key),
            Some(&settings.secret_key),
            None, // security token
            None, // session token
            None, // profile
        )
        .map_err(|e| AppError::Storage(format!("R2 credentials error: {}", e)))?;

        let bucket = Bucket::new(&settings.bucket, region, credentials)
            .map_err(|e| AppError::Storage(format!("R2 bucket error: {}", e)))?;

        Ok(Self {
            bucket,
            bucket_name: settings.bucket.clone(),
            prefix: settings.prefix.clone(),
        })
    }

    fn object_path(&self, key: &str) -> AppResult<String> {
        if !is_valid_key(key) {
            return Err(AppError::InvalidInput(format!("invalid asset key '{}'", key)));
        }
        Ok(format!("{}{}", self.prefix, key))
    }
}

#[tonic::async_trait]
impl StorageBackend for R2Backend {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<String> {
        let path = self.object_path(key)?;
        self.bucket
            .put_object_with_content_type(&path, data, content_type)
            .await
            .map_err(|e| AppError::Storage(format!("R2 upload failed: {}", e)))?;

        tracing::info!("R2 upload: bucket={}, key={}", self.bucket_name, path);
        Ok(format!("r2://{}/{}", self.bucket_name, path))
    }

    async fn download(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.object_path(key)?;
        let response = self
            .bucket
            .get_object(&path)
            .await
            .map_err(|e| AppError::Storage(format!("R2 download failed: {}", e)))?;

        match response.status_code() {
            200..=299 => {}
            404 => return Err(AppError::NotFound(format!("Asset not found: {}", key))),
            code => {
                return Err(AppError::Storage(format!(
                    "R2 download failed with status {}",
                    code
                )))
            }
        }

        tracing::info!(
            "R2 download: bucket={}, key={}, size={}",
            self.bucket_name,
            path,
            response.bytes().len()
        );
        Ok(response.bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.object_path(key)?;
        let response = self
            .bucket
            .delete_object(&path)
            .await
            .map_err(|e| AppError::Storage(format!("R2 delete failed: {}", e)))?;

        match response.status_code() {
            200..=299 | 404 => {}
            code => {
                return Err(AppError::Storage(format!(
                    "R2 delete failed with status {}",
                    code
                )))
            }
        }

        tracing::info!("R2 delete: bucket={}, key={}", self.bucket_name, path);
        Ok(())
    }

    async fn list_keys(&self) -> AppResult<Vec<String>> {
        let pages = self
            .bucket
            .list(self.prefix.clone(), None)
            .await
            .map_err(|e| AppError::Storage(format!("R2 list failed: {}", e)))?;

        let keys = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .filter_map(|object| {
                object
                    .key
                    .strip_prefix(&self.prefix)
                    .filter(|key| is_valid_key(key))
                    .map(str::to_string)
            })
            .collect();
        Ok(keys)
    }

    fn location(&self) -> &str {
        &self.bucket_name
    }
}

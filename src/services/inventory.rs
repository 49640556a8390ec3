use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::archive::{self, ExportedArchive, ImportSummary};
use crate::error::{AppError, AppResult};
use crate::models::{ImageChange, Item, ItemPatch, NewItem};
use crate::query::{ItemQuery, Page};
use crate::storage::{content_type_for, generate_key, is_valid_key, StorageBackend};
use crate::store::ItemStore;

/// An image file attached to a create or update.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub items_removed: u64,
    pub assets_removed: u64,
}

/// The collection as a whole: records, their images, and the bulk
/// export/import/purge operations. Every write keeps records and image
/// assets in step.
#[derive(Clone)]
pub struct Inventory {
    store: Arc<dyn ItemStore>,
    assets: Arc<dyn StorageBackend>,
    staging_root: PathBuf,
    max_upload_bytes: usize,
    max_archive_bytes: usize,
    max_extracted_bytes: u64,
}

impl Inventory {
    pub fn new(
        store: Arc<dyn ItemStore>,
        assets: Arc<dyn StorageBackend>,
        staging_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            assets,
            staging_root: staging_root.into(),
            max_upload_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
            max_archive_bytes: crate::config::DEFAULT_MAX_ARCHIVE_BYTES,
            max_extracted_bytes: crate::config::DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }

    pub fn with_limits(mut self, max_upload_bytes: usize, max_archive_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self.max_archive_bytes = max_archive_bytes;
        self
    }

    /// Caps how far an imported archive may expand on disk.
    pub fn with_extraction_limit(mut self, max_extracted_bytes: u64) -> Self {
        self.max_extracted_bytes = max_extracted_bytes;
        self
    }

    pub fn max_archive_bytes(&self) -> usize {
        self.max_archive_bytes
    }

    pub async fn list(&self, query: &ItemQuery) -> AppResult<Page<Item>> {
        let filter = query.filter();
        let sort = query.sort();
        let page = query.page_request();

        let total_count = self.store.count(&filter).await?;
        let items = self.store.find(&filter, &sort, page.window()).await?;
        tracing::debug!(
            "Listed items: filter={:?}, sort={:?}, page={}, total={}",
            filter,
            sort,
            page.page(),
            total_count
        );
        Ok(Page::new(items, total_count, &page))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Item> {
        self.store.get(id).await
    }

    pub async fn create(&self, mut item: NewItem, image: Option<ImageUpload>) -> AppResult<Item> {
        // Reject before anything is written.
        item.validate()?;

        let uploaded = match image {
            Some(image) => Some(self.store_image(image).await?),
            None => None,
        };
        item.image = uploaded.clone();

        match self.store.insert(item).await {
            Ok(created) => {
                tracing::info!("Created item: id={}, name={}", created.id, created.name);
                Ok(created)
            }
            Err(e) => {
                if let Some(key) = uploaded {
                    self.release_image(&key).await;
                }
                Err(e)
            }
        }
    }

    /// A new image takes precedence over `remove_image`.
    pub async fn update(
        &self,
        id: Uuid,
        mut patch: ItemPatch,
        image: Option<ImageUpload>,
        remove_image: bool,
    ) -> AppResult<Item> {
        self.store.get(id).await?;
        patch.validate()?;

        let uploaded = match image {
            Some(image) => Some(self.store_image(image).await?),
            None => None,
        };
        patch.image = match (&uploaded, remove_image) {
            (Some(key), _) => ImageChange::Replace(key.clone()),
            (None, true) => ImageChange::Remove,
            (None, false) => ImageChange::Keep,
        };

        let updated = match self.store.update(id, patch).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Some(key) = uploaded {
                    self.release_image(&key).await;
                }
                return Err(e);
            }
        };

        if let Some(old) = &updated.released_image {
            self.release_image(old).await;
        }
        tracing::info!("Updated item: id={}", id);
        Ok(updated.item)
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<Item> {
        let deleted = self.store.delete(id).await?;
        if let Some(key) = &deleted.image {
            self.release_image(key).await;
        }
        tracing::info!("Deleted item: id={}, name={}", deleted.id, deleted.name);
        Ok(deleted)
    }

    /// Removes every record and every asset. There is no undo.
    pub async fn purge(&self) -> AppResult<PurgeSummary> {
        let items_removed = self.store.delete_all().await?;
        let assets_removed = self.assets.purge().await?;
        tracing::warn!(
            "Purged inventory: items_removed={}, assets_removed={}",
            items_removed,
            assets_removed
        );
        Ok(PurgeSummary {
            items_removed,
            assets_removed,
        })
    }

    pub async fn export(&self) -> AppResult<ExportedArchive> {
        archive::export_archive(self.store.as_ref(), self.assets.as_ref(), &self.staging_root)
            .await
    }

    pub async fn import(&self, data: Bytes) -> AppResult<ImportSummary> {
        if data.is_empty() {
            return Err(AppError::InvalidInput("No archive uploaded".to_string()));
        }
        if data.len() > self.max_archive_bytes {
            return Err(AppError::Archive(format!(
                "archive exceeds {} bytes",
                self.max_archive_bytes
            )));
        }
        archive::import_archive(
            self.store.as_ref(),
            self.assets.as_ref(),
            &self.staging_root,
            data,
            self.max_extracted_bytes,
        )
        .await
    }

    /// Reads an image for read-only serving.
    pub async fn open_image(&self, key: &str) -> AppResult<Vec<u8>> {
        if !is_valid_key(key) {
            return Err(AppError::InvalidInput(format!("invalid image key '{}'", key)));
        }
        self.assets.download(key).await
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }

    async fn store_image(&self, image: ImageUpload) -> AppResult<String> {
        if image.data.is_empty() {
            return Err(AppError::InvalidInput("image is empty".to_string()));
        }
        if image.data.len() > self.max_upload_bytes {
            return Err(AppError::InvalidInput(format!(
                "image exceeds {} bytes",
                self.max_upload_bytes
            )));
        }

        let key = generate_key(&image.filename);
        let content_type = image
            .content_type
            .as_deref()
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| content_type_for(&key));
        self.assets.upload(&key, &image.data, content_type).await?;
        tracing::debug!("Stored image {} ({} bytes)", key, image.data.len());
        Ok(key)
    }

    /// Asset deletion after a record change is best effort.
    async fn release_image(&self, key: &str) {
        if let Err(e) = self.assets.delete(key).await {
            tracing::warn!("Failed to delete image {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ItemFilter;
    use crate::storage::LocalBackend;
    use crate::store::MemoryItemStore;

    struct Fixture {
        _tmp: tempfile::TempDir,
        store: Arc<MemoryItemStore>,
        assets: Arc<LocalBackend>,
        inventory: Inventory,
    }

    async fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryItemStore::new());
        let assets = Arc::new(LocalBackend::new(tmp.path().join("uploads")).await.unwrap());
        let inventory = Inventory::new(store.clone(), assets.clone(), tmp.path().join("staging"))
            .with_limits(16, 1024);
        Fixture {
            _tmp: tmp,
            store,
            assets,
            inventory,
        }
    }

    fn png(data: &'static [u8]) -> Option<ImageUpload> {
        Some(ImageUpload {
            filename: "photo.png".to_string(),
            content_type: None,
            data: Bytes::from_static(data),
        })
    }

    #[tokio::test]
    async fn test_create_stores_image_under_generated_key() {
        let f = fixture().await;
        let item = f
            .inventory
            .create(NewItem::named("Twin Mill"), png(b"png"))
            .await
            .unwrap();
        let key = item.image.clone().unwrap();
        assert!(key.ends_with(".png"));
        assert_eq!(f.inventory.open_image(&key).await.unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_invalid_create_writes_nothing() {
        let f = fixture().await;
        let err = f
            .inventory
            .create(NewItem::named("  "), png(b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(f.assets.list_keys().await.unwrap().is_empty());

        let err = f
            .inventory
            .create(NewItem::named("Deora"), png(b"way more than sixteen bytes"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(f.store.count(&ItemFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_replaces_and_removes_images() {
        let f = fixture().await;
        let item = f
            .inventory
            .create(NewItem::named("Deora"), png(b"first"))
            .await
            .unwrap();
        let first = item.image.clone().unwrap();

        let replaced = f
            .inventory
            .update(item.id, ItemPatch::default(), png(b"second"), true)
            .await
            .unwrap();
        let second = replaced.image.clone().unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            f.assets.download(&first).await,
            Err(AppError::NotFound(_))
        ));

        let cleared = f
            .inventory
            .update(item.id, ItemPatch::default(), None, true)
            .await
            .unwrap();
        assert_eq!(cleared.image, None);
        assert!(f.assets.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_item_uploads_nothing() {
        let f = fixture().await;
        let err = f
            .inventory
            .update(Uuid::new_v4(), ItemPatch::default(), png(b"x"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(f.assets.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_image() {
        let f = fixture().await;
        let item = f
            .inventory
            .create(NewItem::named("Bone Shaker"), png(b"png"))
            .await
            .unwrap();
        f.inventory.delete(item.id).await.unwrap();
        assert!(f.assets.list_keys().await.unwrap().is_empty());
        assert!(matches!(
            f.inventory.get(item.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_clears_records_and_assets() {
        let f = fixture().await;
        for name in ["A", "B", "C"] {
            f.inventory
                .create(NewItem::named(name), png(b"img"))
                .await
                .unwrap();
        }
        let summary = f.inventory.purge().await.unwrap();
        assert_eq!(
            summary,
            PurgeSummary {
                items_removed: 3,
                assets_removed: 3
            }
        );
        assert_eq!(f.store.count(&ItemFilter::all()).await.unwrap(), 0);
        assert!(f.assets.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_reports_page_metadata() {
        let f = fixture().await;
        for i in 0..12 {
            f.inventory
                .create(NewItem::named(format!("Car {:02}", i)), None)
                .await
                .unwrap();
        }
        let page = f
            .inventory
            .list(&ItemQuery {
                page: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.total_count, 12);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].name, "Car 10");
    }

    #[tokio::test]
    async fn test_import_rejects_oversized_archives() {
        let f = fixture().await;
        let err = f
            .inventory
            .import(Bytes::from(vec![0u8; 2048]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Archive(_)));
    }

    #[tokio::test]
    async fn test_import_applies_extraction_limit() {
        use std::io::Write;

        let f = fixture().await;
        let inventory = f.inventory.clone().with_extraction_limit(64);
        // Zeros deflate well below the archive limit but expand past 64 bytes.
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file("items.json", options).unwrap();
        zip.write_all(br#"[{"name": "Deora"}]"#).unwrap();
        zip.start_file("uploads/zeros.png", options).unwrap();
        zip.write_all(&[0u8; 4096]).unwrap();
        let archive = Bytes::from(zip.finish().unwrap().into_inner());
        assert!(archive.len() < 1024);

        let err = inventory.import(archive).await.unwrap_err();
        assert!(matches!(err, AppError::Archive(_)));
        assert_eq!(f.store.count(&ItemFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_image_rejects_path_keys() {
        let f = fixture().await;
        assert!(matches!(
            f.inventory.open_image("../secret").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}

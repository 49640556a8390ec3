use std::fs;
use std::io::{self, Cursor, ErrorKind, Read};
use std::path::Path;

use bytes::Bytes;
use zip::ZipArchive;

use crate::error::{AppError, AppResult};
use crate::models::NewItem;
use crate::storage::{content_type_for, is_valid_key, StorageBackend};
use crate::store::ItemStore;

use super::{ArchivedItem, StagingDir, ASSETS_DIR, LEGACY_RECORDS_FILE, RECORDS_FILE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    /// Records whose name already existed in the store.
    pub skipped: usize,
    pub assets_copied: usize,
    pub assets_failed: usize,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Data imported successfully: {} inserted, {} skipped as duplicates, {} images copied",
            self.inserted, self.skipped, self.assets_copied
        );
        if self.assets_failed > 0 {
            message.push_str(&format!(", {} images failed", self.assets_failed));
        }
        message
    }
}

/// Merges an archive into the store.
///
/// The archive is fully extracted and every record validated before the
/// first insert, so a malformed archive writes nothing. Extraction stops with
/// an `Archive` error once the unpacked entries exceed `max_extracted_bytes`.
/// Records whose name already exists are skipped; new records get fresh ids.
/// Asset copy failures are logged and counted but do not fail the import.
pub async fn import_archive(
    store: &dyn ItemStore,
    assets: &dyn StorageBackend,
    staging_root: &Path,
    archive: Bytes,
    max_extracted_bytes: u64,
) -> AppResult<ImportSummary> {
    let staging = StagingDir::create(staging_root, "import").await?;

    // The task keeps its own handle so the directory outlives a dropped request.
    let task_staging = staging.clone();
    tokio::task::spawn_blocking(move || {
        extract(archive, task_staging.path(), max_extracted_bytes)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))??;

    let records = read_records(staging.path()).await?;
    let items = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            record
                .into_new_item()
                .map_err(|e| AppError::Archive(format!("record {}: {}", index + 1, e)))
        })
        .collect::<AppResult<Vec<NewItem>>>()?;

    let mut summary = ImportSummary::default();
    for item in items {
        if store.find_by_name(&item.name).await?.is_some() {
            tracing::debug!("Skipping duplicate item on import: {}", item.name);
            summary.skipped += 1;
            continue;
        }
        store.insert(item).await?;
        summary.inserted += 1;
    }

    copy_assets(assets, &staging.path().join(ASSETS_DIR), &mut summary).await?;

    tracing::info!(
        "Imported archive: inserted={}, skipped={}, assets_copied={}, assets_failed={}",
        summary.inserted,
        summary.skipped,
        summary.assets_copied,
        summary.assets_failed
    );
    Ok(summary)
}

fn unpack_failed(name: &str, e: io::Error) -> AppError {
    AppError::Archive(format!("cannot unpack entry '{}': {}", name, e))
}

/// Unpacks the archive into `dir`. Entries escaping `dir`, entries that
/// collide on disk, and archives expanding past `budget` bytes are rejected.
fn extract(archive: Bytes, dir: &Path, budget: u64) -> AppResult<()> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut remaining = budget;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| AppError::Archive(format!("unsafe entry path '{}'", name)))?;
        let target = dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| unpack_failed(&name, e))?;
            continue;
        }
        if entry.size() > remaining {
            return Err(too_large(budget));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| unpack_failed(&name, e))?;
        }
        let mut out = fs::File::create(&target).map_err(|e| unpack_failed(&name, e))?;
        // Declared sizes can lie; bound the actual bytes written.
        let written = io::copy(&mut (&mut entry).take(remaining + 1), &mut out)
            .map_err(|e| AppError::Archive(format!("corrupt entry '{}': {}", name, e)))?;
        if written > remaining {
            return Err(too_large(budget));
        }
        remaining -= written;
    }
    Ok(())
}

fn too_large(budget: u64) -> AppError {
    AppError::Archive(format!("archive expands beyond {} bytes", budget))
}

async fn read_records(dir: &Path) -> AppResult<Vec<ArchivedItem>> {
    for name in [RECORDS_FILE, LEGACY_RECORDS_FILE] {
        match tokio::fs::read(dir.join(name)).await {
            Ok(data) => {
                return serde_json::from_slice(&data)
                    .map_err(|e| AppError::Archive(format!("{} is not a valid record list: {}", name, e)));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Archive(format!("archive contains no {}", RECORDS_FILE)))
}

async fn copy_assets(
    assets: &dyn StorageBackend,
    dir: &Path,
    summary: &mut ImportSummary,
) -> AppResult<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Some(key) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!("Skipping asset with non UTF-8 name: {:?}", entry.file_name());
            summary.assets_failed += 1;
            continue;
        };
        if !is_valid_key(&key) {
            tracing::warn!("Skipping asset with invalid name: {:?}", key);
            summary.assets_failed += 1;
            continue;
        }

        let copied = match tokio::fs::read(entry.path()).await {
            Ok(data) => assets.upload(&key, &data, content_type_for(&key)).await,
            Err(e) => Err(e.into()),
        };
        match copied {
            Ok(_) => summary.assets_copied += 1,
            Err(e) => {
                tracing::warn!("Failed to copy asset {} on import: {}", key, e);
                summary.assets_failed += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ItemFilter;
    use crate::storage::LocalBackend;
    use crate::store::MemoryItemStore;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const BUDGET: u64 = 1 << 20;

    fn zip_of(entries: &[(&str, &[u8])]) -> Bytes {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        Bytes::from(zip.finish().unwrap().into_inner())
    }

    async fn fixture() -> (tempfile::TempDir, MemoryItemStore, LocalBackend) {
        let tmp = tempfile::tempdir().unwrap();
        let assets = LocalBackend::new(tmp.path().join("uploads")).await.unwrap();
        (tmp, MemoryItemStore::new(), assets)
    }

    #[tokio::test]
    async fn test_duplicate_names_inside_one_archive_keep_the_first() {
        let (tmp, store, assets) = fixture().await;
        let archive = zip_of(&[(
            "items.json",
            br#"[{"name": "Twin Mill", "color": "Purple"},
                 {"name": "Twin Mill", "color": "Red"}]"#,
        )]);

        let summary = import_archive(&store, &assets, tmp.path(), archive, BUDGET)
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
        let kept = store.find_by_name("Twin Mill").await.unwrap().unwrap();
        assert_eq!(kept.color.as_deref(), Some("Purple"));
        assert_eq!(store.count(&ItemFilter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_legacy_archive_imports_records_and_images() {
        let (tmp, store, assets) = fixture().await;
        let archive = zip_of(&[
            (
                "cars.json",
                br#"[{"_id": "abc", "name": "Deora", "image": "/uploads/1700-deora.png", "__v": 0}]"#,
            ),
            ("uploads/1700-deora.png", b"png-bytes"),
        ]);

        let summary = import_archive(&store, &assets, &tmp.path().join("staging"), archive, BUDGET)
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.assets_copied, 1);

        let deora = store.find_by_name("Deora").await.unwrap().unwrap();
        assert_eq!(deora.image.as_deref(), Some("1700-deora.png"));
        assert_eq!(assets.download("1700-deora.png").await.unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_malformed_archive_writes_nothing() {
        let (tmp, store, assets) = fixture().await;
        let staging_root = tmp.path().join("staging");

        let not_a_zip = Bytes::from_static(b"definitely not a zip");
        assert!(matches!(
            import_archive(&store, &assets, &staging_root, not_a_zip, BUDGET).await,
            Err(AppError::Archive(_))
        ));

        let no_records = zip_of(&[("uploads/a.png", b"x")]);
        assert!(matches!(
            import_archive(&store, &assets, &staging_root, no_records, BUDGET).await,
            Err(AppError::Archive(_))
        ));

        let one_bad_record = zip_of(&[(
            "items.json",
            br#"[{"name": "Good"}, {"name": "", "quantity": 1}]"#,
        )]);
        assert!(matches!(
            import_archive(&store, &assets, &staging_root, one_bad_record, BUDGET).await,
            Err(AppError::Archive(_))
        ));

        assert_eq!(store.count(&ItemFilter::all()).await.unwrap(), 0);
        assert!(assets.list_keys().await.unwrap().is_empty());
        assert_eq!(std::fs::read_dir(&staging_root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_record_with_missing_asset_is_still_inserted() {
        let (tmp, store, assets) = fixture().await;
        let archive = zip_of(&[(
            "items.json",
            br#"[{"name": "Bone Shaker", "image": "nowhere.png"}]"#,
        )]);
        let summary = import_archive(&store, &assets, tmp.path(), archive, BUDGET)
            .await
            .unwrap();
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.assets_copied, 0);
        let item = store.find_by_name("Bone Shaker").await.unwrap().unwrap();
        assert_eq!(item.image.as_deref(), Some("nowhere.png"));
    }

    fn staged_entries(root: &Path) -> usize {
        std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_archive_expanding_past_budget_is_rejected() {
        let (tmp, store, assets) = fixture().await;
        let staging_root = tmp.path().join("staging");
        let zeros = vec![0u8; 64 * 1024];
        let archive = zip_of(&[
            ("items.json", br#"[{"name": "Deora"}]"#),
            ("uploads/big.png", zeros.as_slice()),
        ]);

        let err = import_archive(&store, &assets, &staging_root, archive, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Archive(ref m) if m.contains("1024")));
        assert_eq!(store.count(&ItemFilter::all()).await.unwrap(), 0);
        assert_eq!(staged_entries(&staging_root), 0);
    }

    #[tokio::test]
    async fn test_conflicting_entries_are_an_archive_error() {
        let (tmp, store, assets) = fixture().await;
        let archive = zip_of(&[
            ("items.json", br#"[{"name": "Deora"}]"#),
            ("uploads", b"a file where a directory belongs"),
            ("uploads/a.png", b"x"),
        ]);

        let err = import_archive(&store, &assets, &tmp.path().join("staging"), archive, BUDGET)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Archive(ref m) if m.contains("uploads/a.png")));
        assert_eq!(store.count(&ItemFilter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_import_leaves_no_staging_behind() {
        let (tmp, store, assets) = fixture().await;
        let staging_root = tmp.path().join("staging");
        let payload = vec![7u8; 1024];
        let names: Vec<String> = (0..4000).map(|i| format!("uploads/{}.png", i)).collect();
        let mut entries: Vec<(&str, &[u8])> = Vec::new();
        entries.push(("items.json", b"[]".as_slice()));
        entries.extend(names.iter().map(|n| (n.as_str(), payload.as_slice())));
        let archive = zip_of(&entries);

        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            import_archive(&store, &assets, &staging_root, archive, BUDGET * 64),
        )
        .await;
        assert!(cancelled.is_err(), "import should still be extracting");

        // The extraction thread finishes on its own and then removes the directory.
        for _ in 0..200 {
            if staged_entries(&staging_root) == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert_eq!(staged_entries(&staging_root), 0);
        assert!(assets.list_keys().await.unwrap().is_empty());
    }

    #[test]
    fn test_summary_message() {
        let summary = ImportSummary {
            inserted: 2,
            skipped: 1,
            assets_copied: 2,
            assets_failed: 1,
        };
        assert_eq!(
            summary.message(),
            "Data imported successfully: 2 inserted, 1 skipped as duplicates, 2 images copied, 1 images failed"
        );
    }
}

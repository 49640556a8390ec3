use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use bytes::Bytes;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AppError, AppResult};
use crate::storage::{is_valid_key, StorageBackend};
use crate::store::ItemStore;

use super::{ArchivedItem, StagingDir, ASSETS_DIR, RECORDS_FILE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub items: usize,
    pub assets: usize,
    /// Referenced assets that could not be read and were left out.
    pub skipped_assets: usize,
}

#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub bytes: Bytes,
    pub summary: ExportSummary,
}

/// Snapshots every record and every referenced asset into a zip archive.
///
/// A missing or unreadable asset does not fail the export; it is logged and
/// left out of the archive.
pub async fn export_archive(
    store: &dyn ItemStore,
    assets: &dyn StorageBackend,
    staging_root: &Path,
) -> AppResult<ExportedArchive> {
    let staging = StagingDir::create(staging_root, "export").await?;

    let items = store.all().await?;
    let records: Vec<ArchivedItem> = items.iter().map(ArchivedItem::from).collect();
    let json = serde_json::to_vec_pretty(&records)
        .map_err(|e| AppError::Internal(format!("Failed to encode records: {}", e)))?;
    tokio::fs::write(staging.path().join(RECORDS_FILE), json).await?;

    let assets_dir = staging.path().join(ASSETS_DIR);
    tokio::fs::create_dir_all(&assets_dir).await?;

    let mut summary = ExportSummary {
        items: items.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();
    for key in items.iter().filter_map(|item| item.image.as_deref()) {
        if !seen.insert(key) {
            continue;
        }
        if !is_valid_key(key) {
            tracing::warn!("Skipping asset with invalid key in export: {:?}", key);
            summary.skipped_assets += 1;
            continue;
        }
        match assets.download(key).await {
            Ok(data) => {
                tokio::fs::write(assets_dir.join(key), data).await?;
                summary.assets += 1;
            }
            Err(e) => {
                tracing::warn!("Skipping asset {} in export: {}", key, e);
                summary.skipped_assets += 1;
            }
        }
    }

    let task_staging = staging.clone();
    let bytes = tokio::task::spawn_blocking(move || zip_staging_dir(task_staging.path()))
        .await
        .map_err(|e| AppError::Internal(format!("Archive task failed: {}", e)))??;

    tracing::info!(
        "Exported archive: items={}, assets={}, skipped_assets={}, size={}",
        summary.items,
        summary.assets,
        summary.skipped_assets,
        bytes.len()
    );

    Ok(ExportedArchive {
        bytes: Bytes::from(bytes),
        summary,
    })
}

fn write_failed(e: zip::result::ZipError) -> AppError {
    AppError::Internal(format!("Failed to write archive: {}", e))
}

/// Packs the record list and the staged asset directory.
fn zip_staging_dir(dir: &Path) -> AppResult<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(RECORDS_FILE, options).map_err(write_failed)?;
    io::copy(&mut fs::File::open(dir.join(RECORDS_FILE))?, &mut zip)?;

    zip.add_directory(format!("{}/", ASSETS_DIR), options)
        .map_err(write_failed)?;
    let mut names: Vec<String> = fs::read_dir(dir.join(ASSETS_DIR))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();

    for name in names {
        zip.start_file(format!("{}/{}", ASSETS_DIR, name), options)
            .map_err(write_failed)?;
        io::copy(&mut fs::File::open(dir.join(ASSETS_DIR).join(&name))?, &mut zip)?;
    }

    Ok(zip.finish().map_err(write_failed)?.into_inner())
}

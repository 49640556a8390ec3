//! Portable snapshots of the whole collection: a zip holding the record list
//! and the referenced image files.

pub mod export;
pub mod import;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::TempDir;

use crate::error::{AppError, AppResult};
use crate::models::{optional_text, Item, ItemType, NewItem, SubType, DEFAULT_BRAND};
use crate::storage::normalize_reference;

pub use export::{export_archive, ExportSummary, ExportedArchive};
pub use import::{import_archive, ImportSummary};

pub const RECORDS_FILE: &str = "items.json";
/// Record list name used by older archives.
pub const LEGACY_RECORDS_FILE: &str = "cars.json";
pub const ASSETS_DIR: &str = "uploads";

/// One record as serialised inside an archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedItem {
    /// Informational only. Imports always assign fresh ids.
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub collection_number: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quantity: i32,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub item_type: ItemType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sub_type: SubType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owned: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub missing: bool,
    #[serde(default = "default_brand", deserialize_with = "brand_or_default")]
    pub brand: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn default_brand() -> String {
    DEFAULT_BRAND.to_string()
}

fn brand_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(default_brand))
}

impl From<&Item> for ArchivedItem {
    fn from(item: &Item) -> Self {
        Self {
            id: Some(item.id.to_string()),
            name: item.name.clone(),
            collection_number: item.collection_number.clone(),
            year: item.year,
            color: item.color.clone(),
            series: item.series.clone(),
            number: item.number.clone(),
            quantity: item.quantity,
            item_type: item.item_type,
            sub_type: item.sub_type,
            owned: item.owned,
            missing: item.missing,
            brand: item.brand.clone(),
            image: item.image.clone(),
            created_at: Some(item.created_at),
            updated_at: Some(item.updated_at),
        }
    }
}

impl ArchivedItem {
    /// Converts to an insertable record, normalising legacy image paths to
    /// asset keys.
    pub fn into_new_item(self) -> AppResult<NewItem> {
        let item = NewItem {
            name: self.name,
            collection_number: self.collection_number.and_then(optional_text),
            year: self.year,
            color: self.color.and_then(optional_text),
            series: self.series.and_then(optional_text),
            number: self.number.and_then(optional_text),
            quantity: self.quantity,
            item_type: self.item_type,
            sub_type: self.sub_type,
            owned: self.owned,
            missing: self.missing,
            brand: self.brand,
            image: self.image.as_deref().and_then(normalize_reference),
        };
        item.validate()?;
        Ok(item)
    }
}

/// A uniquely named working directory under the staging root.
///
/// Clones share one directory; it is removed when the last clone drops, so a
/// blocking task holding a clone keeps it alive after the request future is
/// gone and cleans up once it finishes.
#[derive(Debug, Clone)]
pub struct StagingDir {
    dir: Arc<TempDir>,
}

impl StagingDir {
    pub async fn create(root: &Path, purpose: &str) -> AppResult<Self> {
        tokio::fs::create_dir_all(root).await?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", purpose))
            .tempdir_in(root)
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to create staging dir in {}: {}",
                    root.display(),
                    e
                ))
            })?;
        tracing::debug!("Created staging directory {:?}", dir.path());
        Ok(Self { dir: Arc::new(dir) })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

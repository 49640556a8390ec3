//! Persistent record collection with filtered, sorted and paginated reads.

pub mod memory;
pub mod postgres;

pub use memory::MemoryItemStore;
pub use postgres::PgItemStore;

use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Item, ItemPatch, NewItem};
use crate::query::{ItemFilter, PageWindow, Sort, SortField, SortOrder};

/// Result of an update: the stored record plus the image key it stopped
/// referencing, which the caller must delete from asset storage.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedItem {
    pub item: Item,
    pub released_image: Option<String>,
}

#[tonic::async_trait]
pub trait ItemStore: Send + Sync {
    async fn find(&self, filter: &ItemFilter, sort: &Sort, window: PageWindow)
        -> AppResult<Vec<Item>>;

    async fn count(&self, filter: &ItemFilter) -> AppResult<u64>;

    /// Fails with `NotFound` for unknown ids.
    async fn get(&self, id: Uuid) -> AppResult<Item>;

    /// First record (in insertion order) with exactly this name.
    async fn find_by_name(&self, name: &str) -> AppResult<Option<Item>>;

    /// Validates, assigns a fresh id and stores the record.
    async fn insert(&self, item: NewItem) -> AppResult<Item>;

    async fn update(&self, id: Uuid, patch: ItemPatch) -> AppResult<UpdatedItem>;

    /// Removes and returns the record.
    async fn delete(&self, id: Uuid) -> AppResult<Item>;

    /// Removes every record and returns how many were removed.
    async fn delete_all(&self) -> AppResult<u64>;

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    /// Every record, ordered by name.
    async fn all(&self) -> AppResult<Vec<Item>> {
        self.find(
            &ItemFilter::all(),
            &Sort::new(SortField::Name, SortOrder::Asc),
            PageWindow::unbounded(),
        )
        .await
    }
}

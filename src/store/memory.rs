use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Item, ItemPatch, NewItem};
use crate::query::{ItemFilter, PageWindow, Sort};

use super::{ItemStore, UpdatedItem};

/// Insertion-ordered store held in process memory. Used when no database is
/// configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    items: RwLock<Vec<Item>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Item not found: {}", id))
}

#[tonic::async_trait]
impl ItemStore for MemoryItemStore {
    async fn find(
        &self,
        filter: &ItemFilter,
        sort: &Sort,
        window: PageWindow,
    ) -> AppResult<Vec<Item>> {
        let items = self.items.read().await;
        let mut matching: Vec<&Item> = items.iter().filter(|i| filter.matches(i)).collect();
        // stable: ties keep insertion order
        matching.sort_by(|a, b| sort.compare(a, b));
        Ok(window.apply(matching.into_iter().cloned()))
    }

    async fn count(&self, filter: &ItemFilter) -> AppResult<u64> {
        let items = self.items.read().await;
        Ok(items.iter().filter(|i| filter.matches(i)).count() as u64)
    }

    async fn get(&self, id: Uuid) -> AppResult<Item> {
        let items = self.items.read().await;
        items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Item>> {
        let items = self.items.read().await;
        Ok(items.iter().find(|i| i.name == name).cloned())
    }

    async fn insert(&self, item: NewItem) -> AppResult<Item> {
        item.validate()?;
        let item = Item::from_new(item);
        self.items.write().await.push(item.clone());
        Ok(item)
    }

    async fn update(&self, id: Uuid, patch: ItemPatch) -> AppResult<UpdatedItem> {
        patch.validate()?;
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| not_found(id))?;
        let released_image = patch.apply(item);
        Ok(UpdatedItem {
            item: item.clone(),
            released_image,
        })
    }

    async fn delete(&self, id: Uuid) -> AppResult<Item> {
        let mut items = self.items.write().await;
        let index = items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| not_found(id))?;
        Ok(items.remove(index))
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let mut items = self.items.write().await;
        let removed = items.len() as u64;
        items.clear();
        Ok(removed)
    }
}
